use thiserror::Error;

use crate::LoadStats;

#[derive(Debug, Error)]
pub enum BlocklistError {
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: &'static str },

    /// A malformed line, reported only when loading in strict mode.
    #[error("blocklist line {line} rejected")]
    Line {
        line: usize,
        #[source]
        source: Box<BlocklistError>,
    },

    /// Reading failed; `loaded` counts the lines handled before the failure.
    #[error("reading blocklist: {source}")]
    Io {
        #[source]
        source: std::io::Error,
        loaded: LoadStats,
    },
}

impl BlocklistError {
    pub(crate) fn invalid(pattern: &str, reason: &'static str) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_owned(),
            reason,
        }
    }
}
