use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use futures::{FutureExt, future::BoxFuture};
use nullroute_context::DnsRequestCtx;
use nullroute_dns::DnsMessage;
use nullroute_resolver::{DnsResolver, error_response, header_error_response};

mod tcp;
mod udp;

pub use tcp::{run_tcp, serve_tcp};
pub use udp::{run_udp, serve_udp};

/// Default time a TCP client may stay silent between queries.
pub const DEFAULT_TCP_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// DNS Server
pub struct DnsServer {
    ip: IpAddr,
    udp_port: Option<u16>,
    tcp_port: Option<u16>,
    tcp_idle_timeout: Duration,
    resolver: Arc<dyn DnsResolver>,
}

impl DnsServer {
    pub fn new(ip: IpAddr, resolver: Arc<dyn DnsResolver>) -> Self {
        Self {
            ip,
            udp_port: None,
            tcp_port: None,
            tcp_idle_timeout: DEFAULT_TCP_IDLE_TIMEOUT,
            resolver,
        }
    }

    pub fn with_udp_port(mut self, port: u16) -> Self {
        self.udp_port = Some(port);
        self
    }

    pub fn with_tcp_port(mut self, port: u16) -> Self {
        self.tcp_port = Some(port);
        self
    }

    pub fn with_tcp_idle_timeout(mut self, timeout: Duration) -> Self {
        self.tcp_idle_timeout = timeout;
        self
    }

    /// Run the configured listeners until one of them fails.
    pub async fn run(self) -> anyhow::Result<()> {
        let mut futures: Vec<BoxFuture<'static, anyhow::Result<()>>> = Vec::new();

        if let Some(port) = self.udp_port {
            futures.push(run_udp(SocketAddr::new(self.ip, port), self.resolver.clone()).boxed());
        }

        if let Some(port) = self.tcp_port {
            futures.push(
                run_tcp(SocketAddr::new(self.ip, port), self.resolver.clone(), self.tcp_idle_timeout).boxed(),
            );
        }

        anyhow::ensure!(!futures.is_empty(), "no udp or tcp port configured");

        futures::future::try_join_all(futures).await?;

        Ok(())
    }
}

/// Resolve one request into the message to send back.
///
/// A request whose body cannot be decoded is answered from its header alone.
/// Returns `None` only when the request is shorter than a header; there is
/// nothing to address a reply to.
pub(crate) async fn handle_request(resolver: &dyn DnsResolver, ctx: &DnsRequestCtx) -> Option<DnsMessage> {
    let response = match resolver.resolve(ctx).await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(client = %ctx.client(), error = %e, "replying with error");
            match ctx.message() {
                Ok(query) => error_response(query, &e),
                Err(_) => {
                    let Some(reply) = header_error_response(ctx.raw(), &e) else {
                        tracing::warn!(
                            client = %ctx.client(),
                            len = ctx.raw().len(),
                            "dropping request shorter than a header"
                        );
                        return None;
                    };
                    reply
                }
            }
        }
    };

    ctx.local_mut().response_code = response.response_code().ok();
    log_summary(ctx);

    Some(response)
}

fn log_summary(ctx: &DnsRequestCtx) {
    let state = ctx.local();
    tracing::info!(
        request.id = state.request_id.as_deref().unwrap_or("-"),
        remote_addr = %ctx.client(),
        transport = ?ctx.request_type(),
        query.fqdn = %state.qname.as_ref().map(|n| n.fqdn()).unwrap_or_default(),
        query.qtype = %state.qtype.map(|t| t.to_string()).unwrap_or_default(),
        blocked = state.blocked,
        nameserver = %state.upstream.map(|u| u.to_string()).unwrap_or_default(),
        rcode = %state.response_code.map(|c| c.to_string()).unwrap_or_default(),
        elapsed_ms = state.time_elapsed().as_millis() as u64,
        "query handled"
    );
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod server_tests;
