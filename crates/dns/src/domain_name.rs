use std::fmt::{Display, Formatter};
use std::hash::Hash;
use std::ops::Deref;
use std::sync::Arc;

use anyhow::{bail, ensure};

/// Longest encoded name allowed on the wire (RFC 1035 2.3.4).
pub const MAX_NAME_LEN: usize = 255;

/// Longest label allowed on the wire (RFC 1035 2.3.4).
pub const MAX_LABEL_LEN: usize = 63;

/// A validated domain name, letter case kept as received.
///
/// Names are stored without the trailing root dot; the root itself is `"."`.
/// Equality is byte-wise; compare [`DomainName::canonical_fqdn`] for DNS
/// name matching.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct DomainName(Arc<str>);

/// Check one label as it appears on the wire.
///
/// Only printable ASCII other than `.` is accepted, so every label survives a
/// text round trip unchanged.
pub(crate) fn validate_label(label: &[u8]) -> anyhow::Result<()> {
    ensure!(!label.is_empty(), "empty label");
    ensure!(
        label.len() <= MAX_LABEL_LEN,
        "label too long ({} bytes)",
        label.len()
    );
    if let Some(&b) = label.iter().find(|&&b| b == b'.' || !b.is_ascii_graphic()) {
        bail!("label contains byte 0x{:02x}", b);
    }
    Ok(())
}

impl DomainName {
    /// The root name.
    pub fn root() -> Self {
        Self(Arc::from("."))
    }

    /// Parse a dotted ASCII name. A single trailing dot is accepted.
    ///
    /// Labels must be 1 to 63 bytes of printable ASCII and the encoded name
    /// must fit in 255 bytes.
    pub fn from_ascii(s: impl AsRef<str>) -> anyhow::Result<Self> {
        let input = s.as_ref();

        if input.is_empty() || input == "." {
            return Ok(Self::root());
        }

        let name = input.strip_suffix('.').unwrap_or(input);

        // one length byte per label plus the root terminator
        let mut encoded_len = 1;
        for label in name.split('.') {
            if let Err(e) = validate_label(label.as_bytes()) {
                bail!("invalid domain name {:?}: {}", input, e);
            }
            encoded_len += 1 + label.len();
        }
        ensure!(
            encoded_len <= MAX_NAME_LEN,
            "domain name too long ({} bytes): {}",
            encoded_len,
            input
        );

        Ok(Self(Arc::from(name)))
    }

    /// Whether this is the root name.
    pub fn is_root(&self) -> bool {
        &*self.0 == "."
    }

    /// Labels from left to right. The root has none.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        let name = if self.is_root() { "" } else { &*self.0 };
        name.split('.').filter(|l| !l.is_empty())
    }

    /// Fully-qualified form with the trailing root dot.
    pub fn fqdn(&self) -> String {
        if self.is_root() {
            return ".".into();
        }
        format!("{}.", self.0)
    }

    /// Lowercase fully-qualified form, the key for name lookups.
    pub fn canonical_fqdn(&self) -> String {
        self.fqdn().to_ascii_lowercase()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for DomainName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for DomainName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
