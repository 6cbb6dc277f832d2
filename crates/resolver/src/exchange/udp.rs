use std::net::SocketAddr;

use anyhow::Context;
use async_trait::async_trait;
use nullroute_dns::{DnsMessage, HEADER_LEN, helpers};
use tokio::{
    net::UdpSocket,
    time::{Instant, timeout, timeout_at},
};

use super::{Exchange, TcpExchange, Timeouts};

/// Largest datagram accepted from an upstream.
const MAX_RECEIVE_SIZE: usize = 4096;

/// Plain DNS over UDP.
///
/// A truncated reply is completed by repeating the exchange over TCP against
/// the same upstream.
#[derive(Debug, Clone, Default)]
pub struct UdpExchange {
    timeouts: Timeouts,
    tcp: TcpExchange,
}

impl UdpExchange {
    pub fn new(timeouts: Timeouts) -> Self {
        Self {
            timeouts,
            tcp: TcpExchange::new(timeouts),
        }
    }

    async fn send_and_receive(&self, query: &[u8], upstream: SocketAddr) -> anyhow::Result<Vec<u8>> {
        let bind_addr = if upstream.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        // fresh socket per query for source port randomization
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(upstream).await?;

        timeout(self.timeouts.write, socket.send(query))
            .await
            .context("send timeout")??;

        let deadline = Instant::now() + self.timeouts.read;
        let mut buf = vec![0u8; MAX_RECEIVE_SIZE];

        loop {
            let n = timeout_at(deadline, socket.recv(&mut buf))
                .await
                .context("recv timeout")??;

            // ignore anything that is not a response
            if n >= HEADER_LEN && buf[2] & 0x80 != 0 {
                buf.truncate(n);
                return Ok(buf);
            }
        }
    }
}

#[async_trait]
impl Exchange for UdpExchange {
    async fn exchange(&self, query: &DnsMessage, upstream: SocketAddr) -> anyhow::Result<DnsMessage> {
        let raw = self
            .send_and_receive(&query.encode()?, upstream)
            .await
            .with_context(|| format!("udp exchange with {}", upstream))?;

        if helpers::is_truncated(&raw) {
            tracing::debug!(nameserver = %upstream, "truncated udp response, retrying over tcp");
            return self.tcp.exchange(query, upstream).await;
        }

        DnsMessage::decode(&raw).context("decoding upstream response")
    }
}
