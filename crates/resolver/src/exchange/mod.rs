use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, ensure};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use nullroute_dns::{DnsMessage, MAX_MESSAGE_LEN};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    time::timeout,
};

mod tcp;
mod tls;
mod udp;

pub use tcp::TcpExchange;
pub use tls::TlsExchange;
pub use udp::UdpExchange;

/// One request/response round trip with an upstream nameserver.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn exchange(&self, query: &DnsMessage, upstream: SocketAddr) -> anyhow::Result<DnsMessage>;
}

/// Per-step limits for an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// TCP connect plus TLS handshake
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(2),
            read: Duration::from_secs(2),
            write: Duration::from_secs(2),
        }
    }
}

/// Send one length-prefixed query over a stream and read the response.
pub(crate) async fn send_and_receive<S>(stream: &mut S, query: &[u8], timeouts: &Timeouts) -> anyhow::Result<Bytes>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    ensure!(query.len() <= MAX_MESSAGE_LEN, "query too large for a stream: {}", query.len());

    // one write so the prefix and body share a segment
    let mut frame = BytesMut::with_capacity(query.len() + 2);
    frame.put_u16(query.len() as u16);
    frame.extend_from_slice(query);

    timeout(timeouts.write, async {
        stream.write_all(&frame).await?;
        stream.flush().await
    })
    .await
    .context("write timeout")??;

    let mut len_buf = [0u8; 2];
    timeout(timeouts.read, stream.read_exact(&mut len_buf))
        .await
        .context("read len timeout")??;
    let len = u16::from_be_bytes(len_buf) as usize;

    let mut buf = BytesMut::zeroed(len);
    timeout(timeouts.read, stream.read_exact(&mut buf[..]))
        .await
        .context("read body timeout")??;

    Ok(buf.freeze())
}
