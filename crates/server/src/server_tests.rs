#[cfg(test)]
mod tests {
    use std::{net::Ipv4Addr, sync::Arc, time::Duration};

    use async_trait::async_trait;
    use nullroute_context::DnsRequestCtx;
    use nullroute_dns::{
        ClassType, DnsMessage, DnsMessageBuilder, DnsQuestion, DnsRecord, DnsRecordData, DnsResponseCode,
        DomainName, RecordType,
    };
    use nullroute_resolver::{DnsResolver, ResolveError};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream, UdpSocket},
        time::timeout,
    };

    use crate::{serve_tcp, serve_udp};

    /// Answers every query with `answers` A records, or refuses MX queries.
    struct StubResolver {
        answers: usize,
    }

    #[async_trait]
    impl DnsResolver for StubResolver {
        async fn resolve(&self, ctx: &DnsRequestCtx) -> Result<DnsMessage, ResolveError> {
            let query = ctx.message().map_err(|e| ResolveError::InvalidRequest(e.to_string()))?;
            let question = &query.questions()[0];
            if question.qtype == RecordType::MX {
                return Err(ResolveError::UnsupportedType(RecordType::MX));
            }

            let builder = (0..self.answers).fold(DnsMessageBuilder::reply_to(query), |b, i| {
                b.add_answer(DnsRecord::new(
                    question.qname.clone(),
                    RecordType::A,
                    ClassType::IN,
                    60,
                    DnsRecordData::Ipv4(Ipv4Addr::new(10, 0, (i / 256) as u8, (i % 256) as u8)),
                ))
            });
            Ok(builder.with_response(DnsResponseCode::NoError).build())
        }
    }

    fn query(id: u16, qtype: RecordType) -> DnsMessage {
        DnsMessageBuilder::new()
            .with_id(id)
            .add_question(DnsQuestion::new(
                DomainName::from_ascii("www.example.com").unwrap(),
                qtype,
                ClassType::IN,
            ))
            .build()
    }

    async fn udp_server(answers: usize) -> std::net::SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(serve_udp(socket, Arc::new(StubResolver { answers })));
        addr
    }

    async fn udp_roundtrip(server: std::net::SocketAddr, payload: &[u8]) -> Option<DnsMessage> {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(payload, server).await.unwrap();

        let mut buf = [0u8; 4096];
        let (n, _) = timeout(Duration::from_millis(300), client.recv_from(&mut buf)).await.ok()?.unwrap();
        Some(DnsMessage::decode(&buf[..n]).unwrap())
    }

    #[tokio::test]
    async fn test_udp_answer() {
        let server = udp_server(1).await;

        let resp = udp_roundtrip(server, &query(11, RecordType::A).encode().unwrap())
            .await
            .unwrap();

        assert_eq!(resp.id, 11);
        assert!(resp.flags.response);
        assert_eq!(resp.answers().len(), 1);
    }

    #[tokio::test]
    async fn test_udp_error_reply() {
        let server = udp_server(1).await;

        let resp = udp_roundtrip(server, &query(12, RecordType::MX).encode().unwrap())
            .await
            .unwrap();

        assert_eq!(resp.id, 12);
        assert_eq!(resp.response_code().unwrap(), DnsResponseCode::Refused);
        assert_eq!(resp.questions()[0].qtype, RecordType::MX);
    }

    #[tokio::test]
    async fn test_udp_large_response_is_truncated() {
        // 40 A records are well past 512 bytes
        let server = udp_server(40).await;

        let resp = udp_roundtrip(server, &query(13, RecordType::A).encode().unwrap())
            .await
            .unwrap();

        assert!(resp.flags.truncated);
        assert!(resp.answers().is_empty());
        assert_eq!(resp.questions().len(), 1);
    }

    #[tokio::test]
    async fn test_udp_garbage_is_dropped() {
        let server = udp_server(1).await;

        assert!(udp_roundtrip(server, &[0xFF, 0x00, 0x01]).await.is_none());

        // the listener keeps serving
        assert!(udp_roundtrip(server, &query(14, RecordType::A).encode().unwrap()).await.is_some());
    }

    #[tokio::test]
    async fn test_udp_cut_short_question_gets_format_error() {
        let server = udp_server(1).await;

        // header announces one question, the name stops mid label
        let raw = [0x12, 0x34, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0, 7, b'e', b'x', b'a'];
        let resp = udp_roundtrip(server, &raw).await.unwrap();

        assert_eq!(resp.id, 0x1234);
        assert!(resp.flags.response);
        assert!(resp.flags.recursion_desired);
        assert_eq!(resp.response_code().unwrap(), DnsResponseCode::FormatError);
    }

    #[tokio::test]
    async fn test_udp_non_ascii_label_gets_format_error() {
        let server = udp_server(1).await;

        let mut raw = vec![0x43, 0x21, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0, 63];
        raw.extend_from_slice(&[0xFF; 63]);
        raw.extend_from_slice(&[3, b'c', b'o', b'm', 0, 0, 1, 0, 1]);
        let resp = udp_roundtrip(server, &raw).await.unwrap();

        assert_eq!(resp.id, 0x4321);
        assert_eq!(resp.response_code().unwrap(), DnsResponseCode::FormatError);
        assert!(resp.questions().is_empty());
    }

    async fn tcp_send_raw(stream: &mut TcpStream, bytes: &[u8]) -> DnsMessage {
        stream.write_all(&(bytes.len() as u16).to_be_bytes()).await.unwrap();
        stream.write_all(bytes).await.unwrap();

        let mut len = [0u8; 2];
        stream.read_exact(&mut len).await.unwrap();
        let mut buf = vec![0u8; u16::from_be_bytes(len) as usize];
        stream.read_exact(&mut buf).await.unwrap();
        DnsMessage::decode(&buf).unwrap()
    }

    #[tokio::test]
    async fn test_tcp_malformed_query_keeps_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_tcp(
            listener,
            Arc::new(StubResolver { answers: 1 }),
            Duration::from_secs(5),
        ));

        let mut stream = TcpStream::connect(addr).await.unwrap();

        let raw = [0x00, 0x31, 0x00, 0x00, 0, 1, 0, 0, 0, 0, 0, 0, 0xC0];
        let formerr = tcp_send_raw(&mut stream, &raw).await;
        assert_eq!(formerr.id, 0x31);
        assert!(!formerr.flags.recursion_desired);
        assert_eq!(formerr.response_code().unwrap(), DnsResponseCode::FormatError);

        let next = tcp_exchange(&mut stream, &query(32, RecordType::A)).await;
        assert_eq!(next.id, 32);
        assert_eq!(next.answers().len(), 1);
    }

    async fn tcp_exchange(stream: &mut TcpStream, query: &DnsMessage) -> DnsMessage {
        tcp_send_raw(stream, &query.encode().unwrap()).await
    }

    #[tokio::test]
    async fn test_tcp_multiple_queries_per_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_tcp(
            listener,
            Arc::new(StubResolver { answers: 40 }),
            Duration::from_secs(5),
        ));

        let mut stream = TcpStream::connect(addr).await.unwrap();

        let first = tcp_exchange(&mut stream, &query(21, RecordType::A)).await;
        assert_eq!(first.id, 21);
        // no truncation over tcp
        assert_eq!(first.answers().len(), 40);

        let second = tcp_exchange(&mut stream, &query(22, RecordType::MX)).await;
        assert_eq!(second.id, 22);
        assert_eq!(second.response_code().unwrap(), DnsResponseCode::Refused);
    }

    #[tokio::test]
    async fn test_tcp_idle_connection_is_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_tcp(
            listener,
            Arc::new(StubResolver { answers: 1 }),
            Duration::from_millis(100),
        ));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 1];
        let n = timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(n, 0);
    }
}
