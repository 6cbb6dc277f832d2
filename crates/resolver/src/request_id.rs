use std::fmt::Write;

use anyhow::Context;
use rand::{TryRngCore, rngs::OsRng};

/// Source of per-request identifiers used to correlate log lines.
pub trait RequestIds: Send + Sync {
    fn generate(&self) -> anyhow::Result<String>;
}

/// 16 bytes from the operating system's RNG, hex encoded.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRequestIds;

impl RequestIds for OsRequestIds {
    fn generate(&self) -> anyhow::Result<String> {
        let mut bytes = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut bytes)
            .context("reading from the OS random source")?;

        let mut id = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            write!(id, "{:02x}", b)?;
        }
        Ok(id)
    }
}
