use std::{
    net::{Ipv4Addr, Ipv6Addr},
    sync::Arc,
};

use async_trait::async_trait;
use nullroute_blocklist::Blocklist;
use nullroute_context::DnsRequestCtx;
use nullroute_dns::{
    ClassType, DnsFlags, DnsMessage, DnsMessageBuilder, DnsOpcode, DnsRecord, DnsRecordData, DnsResponseCode,
    HEADER_LEN, RecordType, helpers,
};
use tracing::Instrument;

use crate::{
    DnsResolver, OsRequestIds, RequestIds, ResolveError, UpstreamChooser, exchange::Exchange,
};

/// Decides whether a name gets the blocked answer.
pub trait BlockPolicy: Send + Sync {
    fn is_blocked(&self, fqdn: &str) -> bool;
}

impl BlockPolicy for Blocklist {
    fn is_blocked(&self, fqdn: &str) -> bool {
        self.contains(fqdn)
    }
}

/// Answers A/AAAA queries for blocked names with the unspecified address and
/// forwards everything else to the next upstream.
pub struct QueryDispatcher {
    blocklist: Arc<dyn BlockPolicy>,
    upstreams: Arc<dyn UpstreamChooser>,
    exchange: Arc<dyn Exchange>,
    request_ids: Arc<dyn RequestIds>,
}

impl QueryDispatcher {
    pub fn new(
        blocklist: Arc<dyn BlockPolicy>,
        upstreams: Arc<dyn UpstreamChooser>,
        exchange: Arc<dyn Exchange>,
    ) -> Self {
        Self {
            blocklist,
            upstreams,
            exchange,
            request_ids: Arc::new(OsRequestIds),
        }
    }

    /// Replace the source of request ids.
    pub fn with_request_ids(mut self, request_ids: Arc<dyn RequestIds>) -> Self {
        self.request_ids = request_ids;
        self
    }

    async fn dispatch(&self, ctx: &DnsRequestCtx) -> Result<DnsMessage, ResolveError> {
        let request_id = self.request_ids.generate().map_err(|e| {
            let error = format!("{e:#}");
            tracing::error!(%error, "failed to generate request id");
            ResolveError::RequestId(e)
        })?;
        tracing::Span::current().record("request_id", request_id.as_str());
        ctx.local_mut().request_id = Some(request_id);

        let query = ctx
            .message()
            .map_err(|e| ResolveError::InvalidRequest(format!("{e:#}")))?;

        // only the first question is answered
        let Some(question) = query.questions().first() else {
            tracing::warn!("refusing query without question");
            return Err(ResolveError::NoQuestion);
        };

        let fqdn = question.qname.fqdn();
        {
            let mut state = ctx.local_mut();
            state.qname = Some(question.qname.clone());
            state.qtype = Some(question.qtype);
        }

        if question.qclass != ClassType::IN {
            tracing::warn!(query.fqdn = %fqdn, query.qclass = %question.qclass, "refusing query class");
            return Err(ResolveError::UnsupportedClass(question.qclass));
        }

        let blocked_data = match question.qtype {
            RecordType::A => DnsRecordData::Ipv4(Ipv4Addr::UNSPECIFIED),
            RecordType::AAAA => DnsRecordData::Ipv6(Ipv6Addr::UNSPECIFIED),
            other => {
                tracing::warn!(query.fqdn = %fqdn, query.qtype = %other, "refusing query type");
                return Err(ResolveError::UnsupportedType(other));
            }
        };

        if self.blocklist.is_blocked(&question.qname.canonical_fqdn()) {
            ctx.local_mut().blocked = true;
            tracing::info!(query.fqdn = %fqdn, query.qtype = %question.qtype, "blocked");

            let answer = DnsRecord::new(question.qname.clone(), question.qtype, ClassType::IN, 0, blocked_data);
            return Ok(DnsMessageBuilder::reply_to(query)
                .add_answer(answer)
                .with_response(DnsResponseCode::NoError)
                .build());
        }

        let upstream = self.upstreams.next_upstream();
        ctx.local_mut().upstream = Some(upstream);

        let outbound = DnsMessageBuilder::new()
            .with_id(rand::random())
            .with_flags(DnsFlags {
                opcode: DnsOpcode::Query,
                recursion_desired: query.flags.recursion_desired,
                ..DnsFlags::default()
            })
            .add_question(question.clone())
            .build();

        let response = self.exchange.exchange(&outbound, upstream).await.map_err(|e| {
            let error = format!("{e:#}");
            tracing::warn!(
                query.fqdn = %fqdn,
                nameserver = %upstream,
                %error,
                "upstream exchange failed"
            );
            ResolveError::Exchange(e)
        })?;

        if response.id != outbound.id {
            tracing::warn!(
                query.fqdn = %fqdn,
                nameserver = %upstream,
                expected = outbound.id,
                got = response.id,
                "transaction id mismatch"
            );
            return Err(ResolveError::IdMismatch {
                expected: outbound.id,
                got: response.id,
            });
        }

        if response.answers().is_empty() {
            tracing::info!(query.fqdn = %fqdn, nameserver = %upstream, "upstream returned no answers");
            return Err(ResolveError::EmptyAnswer);
        }

        for answer in response.answers() {
            tracing::debug!(nameserver = %upstream, %answer, "answer");
        }
        tracing::info!(
            query.fqdn = %fqdn,
            nameserver = %upstream,
            answers = response.answers().len(),
            "relaying upstream answers"
        );

        let reply = response
            .answers()
            .iter()
            .cloned()
            .fold(DnsMessageBuilder::reply_to(query), DnsMessageBuilder::add_answer)
            .with_response(DnsResponseCode::NoError)
            .build();

        Ok(reply)
    }
}

#[async_trait]
impl DnsResolver for QueryDispatcher {
    async fn resolve(&self, ctx: &DnsRequestCtx) -> Result<DnsMessage, ResolveError> {
        let span = tracing::info_span!(
            "query",
            request_id = tracing::field::Empty,
            client = %ctx.client()
        );
        self.dispatch(ctx).instrument(span).await
    }
}

/// Reply to `query` carrying the response code for `error`.
pub fn error_response(query: &DnsMessage, error: &ResolveError) -> DnsMessage {
    DnsMessageBuilder::reply_to(query)
        .with_response(error.response_code())
        .build()
}

/// Reply to a request whose body could not be decoded, built from its header.
///
/// Mirrors the id, opcode and RD bit and carries no question. Returns `None`
/// when `raw` is shorter than a header.
pub fn header_error_response(raw: &[u8], error: &ResolveError) -> Option<DnsMessage> {
    if raw.len() < HEADER_LEN {
        return None;
    }
    let id = helpers::extract_transaction_id(raw)?;

    let flags = DnsFlags {
        response: true,
        opcode: helpers::extract_opcode(raw).unwrap_or_default(),
        recursion_desired: helpers::recursion_desired(raw),
        recursion_available: true,
        ..DnsFlags::default()
    };

    Some(
        DnsMessageBuilder::new()
            .with_id(id)
            .with_flags(flags)
            .with_response(error.response_code())
            .build(),
    )
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod dispatcher_tests;
