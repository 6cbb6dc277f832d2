use std::{net::SocketAddr, time::Duration};

use bytes::Bytes;
use nullroute_dns::{DnsMessage, DnsResponseCode, DomainName, RecordType};
use once_cell::sync::OnceCell;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::time::Instant;

/// The transport a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    /// UDP
    UDP,
    /// TCP
    TCP,
}

/// Per-request context.
///
/// Created when a datagram or frame is received and dropped once the response
/// has been written.
#[derive(Debug)]
pub struct DnsRequestCtx {
    request_type: RequestType,
    client: SocketAddr,
    raw: Bytes,
    message: OnceCell<DnsMessage>,
    local: RwLock<QueryState>,
}

impl DnsRequestCtx {
    pub fn new(request_type: RequestType, client: SocketAddr, raw: Bytes) -> Self {
        Self {
            request_type,
            client,
            raw,
            message: OnceCell::new(),
            local: RwLock::new(QueryState::new()),
        }
    }

    /// Request Type
    pub fn request_type(&self) -> RequestType {
        self.request_type
    }

    /// Address of the client that sent the query.
    pub fn client(&self) -> SocketAddr {
        self.client
    }

    /// Lazily decode and return the DNS message.
    pub fn message(&self) -> anyhow::Result<&DnsMessage> {
        self.message.get_or_try_init(|| DnsMessage::decode(&self.raw))
    }

    /// Raw request bytes
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// What happened to the query so far.
    pub fn local(&self) -> RwLockReadGuard<'_, QueryState> {
        self.local.read()
    }

    pub fn local_mut(&self) -> RwLockWriteGuard<'_, QueryState> {
        self.local.write()
    }
}

/// Facts collected while a query is handled, used for the summary log line.
#[derive(Debug, Clone)]
pub struct QueryState {
    pub request_id: Option<String>,
    pub qname: Option<DomainName>,
    pub qtype: Option<RecordType>,
    pub blocked: bool,
    pub upstream: Option<SocketAddr>,
    pub response_code: Option<DnsResponseCode>,
    time_started: Instant,
}

impl QueryState {
    pub fn new() -> Self {
        Self {
            request_id: None,
            qname: None,
            qtype: None,
            blocked: false,
            upstream: None,
            response_code: None,
            time_started: Instant::now(),
        }
    }

    pub fn time_elapsed(&self) -> Duration {
        self.time_started.elapsed()
    }
}

impl Default for QueryState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nullroute_dns::{ClassType, DnsMessageBuilder, DnsQuestion};

    fn client() -> SocketAddr {
        "127.0.0.1:5353".parse().unwrap()
    }

    #[test]
    fn test_message_is_decoded_lazily() {
        let query = DnsMessageBuilder::new()
            .with_id(77)
            .add_question(DnsQuestion::new(
                DomainName::from_ascii("example.com").unwrap(),
                RecordType::A,
                ClassType::IN,
            ))
            .build();

        let ctx = DnsRequestCtx::new(RequestType::UDP, client(), query.encode().unwrap());
        let first = ctx.message().unwrap();

        assert_eq!(first.id, 77);
        assert!(std::ptr::eq(first, ctx.message().unwrap()));
        assert_eq!(ctx.request_type(), RequestType::UDP);
        assert_eq!(ctx.client(), client());
    }

    #[test]
    fn test_undecodable_message() {
        let ctx = DnsRequestCtx::new(RequestType::TCP, client(), Bytes::from_static(&[0, 1, 2]));
        assert!(ctx.message().is_err());
    }

    #[tokio::test]
    async fn test_query_state() {
        let ctx = DnsRequestCtx::new(RequestType::UDP, client(), Bytes::new());
        {
            let mut state = ctx.local_mut();
            state.request_id = Some("abc".into());
            state.blocked = true;
        }

        tokio::time::sleep(Duration::from_millis(25)).await;

        let state = ctx.local();
        assert_eq!(state.request_id.as_deref(), Some("abc"));
        assert!(state.blocked);
        assert!(state.upstream.is_none());
        assert!(state.time_elapsed() >= Duration::from_millis(25));
    }
}
