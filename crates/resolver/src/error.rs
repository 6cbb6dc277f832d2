use nullroute_dns::{ClassType, DnsResponseCode, RecordType};
use thiserror::Error;

/// Why a query could not be answered normally.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to generate request id: {0:#}")]
    RequestId(anyhow::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("query has no question")]
    NoQuestion,

    #[error("unsupported class {0}")]
    UnsupportedClass(ClassType),

    #[error("unsupported type {0}")]
    UnsupportedType(RecordType),

    #[error("upstream exchange failed: {0:#}")]
    Exchange(anyhow::Error),

    #[error("transaction id mismatch: expected {expected}, got {got}")]
    IdMismatch { expected: u16, got: u16 },

    #[error("upstream returned no answers")]
    EmptyAnswer,
}

impl ResolveError {
    /// Response code reported to the client.
    pub fn response_code(&self) -> DnsResponseCode {
        match self {
            Self::RequestId(_) | Self::Exchange(_) | Self::IdMismatch { .. } => DnsResponseCode::ServerFailure,
            Self::InvalidRequest(_) => DnsResponseCode::FormatError,
            Self::NoQuestion | Self::UnsupportedClass(_) | Self::UnsupportedType(_) => DnsResponseCode::Refused,
            Self::EmptyAnswer => DnsResponseCode::NxDomain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_codes() {
        assert_eq!(
            ResolveError::RequestId(anyhow::anyhow!("no entropy")).response_code(),
            DnsResponseCode::ServerFailure
        );
        assert_eq!(ResolveError::NoQuestion.response_code(), DnsResponseCode::Refused);
        assert_eq!(
            ResolveError::UnsupportedClass(ClassType::CH).response_code(),
            DnsResponseCode::Refused
        );
        assert_eq!(
            ResolveError::UnsupportedType(RecordType::MX).response_code(),
            DnsResponseCode::Refused
        );
        assert_eq!(
            ResolveError::Exchange(anyhow::anyhow!("timed out")).response_code(),
            DnsResponseCode::ServerFailure
        );
        assert_eq!(
            ResolveError::IdMismatch { expected: 1, got: 2 }.response_code(),
            DnsResponseCode::ServerFailure
        );
        assert_eq!(ResolveError::EmptyAnswer.response_code(), DnsResponseCode::NxDomain);
        assert_eq!(
            ResolveError::InvalidRequest("garbage".into()).response_code(),
            DnsResponseCode::FormatError
        );
    }

    #[test]
    fn test_exchange_error_keeps_context() {
        let err = anyhow::anyhow!("connection refused").context("udp exchange with 192.0.2.1:53");
        let msg = ResolveError::Exchange(err).to_string();
        assert_eq!(msg, "upstream exchange failed: udp exchange with 192.0.2.1:53: connection refused");
    }
}
