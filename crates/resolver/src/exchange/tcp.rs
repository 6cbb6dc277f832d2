use std::net::SocketAddr;

use anyhow::Context;
use async_trait::async_trait;
use nullroute_dns::DnsMessage;
use tokio::{net::TcpStream, time::timeout};

use super::{Exchange, Timeouts, send_and_receive};

/// Plain DNS over TCP, one connection per exchange.
#[derive(Debug, Clone, Default)]
pub struct TcpExchange {
    timeouts: Timeouts,
}

impl TcpExchange {
    pub fn new(timeouts: Timeouts) -> Self {
        Self { timeouts }
    }
}

#[async_trait]
impl Exchange for TcpExchange {
    async fn exchange(&self, query: &DnsMessage, upstream: SocketAddr) -> anyhow::Result<DnsMessage> {
        let mut stream = timeout(self.timeouts.connect, TcpStream::connect(upstream))
            .await
            .context("tcp connect timeout")??;
        stream.set_nodelay(true)?;

        let raw = send_and_receive(&mut stream, &query.encode()?, &self.timeouts)
            .await
            .with_context(|| format!("tcp exchange with {}", upstream))?;

        DnsMessage::decode(&raw).context("decoding upstream response")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{net::Ipv4Addr, time::Duration};

    use nullroute_dns::{
        ClassType, DnsMessageBuilder, DnsQuestion, DnsRecord, DnsRecordData, DnsResponseCode, DomainName, RecordType,
    };
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    pub(crate) fn query(id: u16) -> DnsMessage {
        DnsMessageBuilder::new()
            .with_id(id)
            .add_question(DnsQuestion::new(
                DomainName::from_ascii("example.com").unwrap(),
                RecordType::A,
                ClassType::IN,
            ))
            .build()
    }

    pub(crate) fn answer_for(query: &DnsMessage, addr: Ipv4Addr) -> DnsMessage {
        DnsMessageBuilder::reply_to(query)
            .add_answer(DnsRecord::new(
                query.questions()[0].qname.clone(),
                RecordType::A,
                ClassType::IN,
                300,
                DnsRecordData::Ipv4(addr),
            ))
            .with_response(DnsResponseCode::NoError)
            .build()
    }

    /// Answer every length-prefixed query on the first accepted connection.
    pub(crate) async fn serve_tcp_once(listener: TcpListener, addr: Ipv4Addr) {
        let (mut stream, _) = listener.accept().await.unwrap();
        loop {
            let mut len = [0u8; 2];
            if stream.read_exact(&mut len).await.is_err() {
                return;
            }
            let mut buf = vec![0u8; u16::from_be_bytes(len) as usize];
            stream.read_exact(&mut buf).await.unwrap();

            let query = DnsMessage::decode(&buf).unwrap();
            let resp = answer_for(&query, addr).encode().unwrap();
            stream.write_all(&(resp.len() as u16).to_be_bytes()).await.unwrap();
            stream.write_all(&resp).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_tcp_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream = listener.local_addr().unwrap();
        tokio::spawn(serve_tcp_once(listener, Ipv4Addr::new(192, 0, 2, 7)));

        let exchange = TcpExchange::new(Timeouts::default());
        let resp = exchange.exchange(&query(4321), upstream).await.unwrap();

        assert_eq!(resp.id, 4321);
        assert_eq!(resp.answers()[0].data, DnsRecordData::Ipv4(Ipv4Addr::new(192, 0, 2, 7)));
    }

    #[tokio::test]
    async fn test_tcp_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // accept and never answer
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let exchange = TcpExchange::new(Timeouts {
            read: Duration::from_millis(100),
            ..Timeouts::default()
        });
        let err = exchange.exchange(&query(1), upstream).await.unwrap_err();
        assert!(format!("{err:#}").contains("timeout"));
    }
}
