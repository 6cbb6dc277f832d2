use async_trait::async_trait;
use nullroute_context::DnsRequestCtx;
use nullroute_dns::DnsMessage;

mod dispatcher;
mod error;
pub mod exchange;
mod request_id;
mod round_robin;

pub use dispatcher::{BlockPolicy, QueryDispatcher, error_response, header_error_response};
pub use error::ResolveError;
pub use request_id::{OsRequestIds, RequestIds};
pub use round_robin::{RoundRobin, UpstreamChooser};

/// Turns a decoded client query into the response to send back.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn resolve(&self, ctx: &DnsRequestCtx) -> Result<DnsMessage, ResolveError>;
}
