use std::borrow::Cow;

use crate::BlocklistError;

/// Label that matches exactly one arbitrary label.
pub const WILDCARD: &str = "*";

/// Reserved for the trie's terminal marker, never valid in a name.
pub const TERMINAL_MARKER: char = '!';

const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;

/// Check that `name` is a syntactically legal domain name.
///
/// Accepts an optional trailing dot and the root name `"."`. Labels must be
/// 1 to 63 bytes, the encoded form must fit in 255 bytes and neither control
/// characters nor whitespace may appear anywhere.
pub fn validate_name(name: &str) -> Result<(), BlocklistError> {
    if name.is_empty() {
        return Err(BlocklistError::invalid(name, "empty name"));
    }
    if name == "." {
        return Ok(());
    }
    if name.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(BlocklistError::invalid(name, "control character or whitespace"));
    }

    let mut encoded_len = 1;
    for label in labels(name) {
        if label.is_empty() {
            return Err(BlocklistError::invalid(name, "empty label"));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(BlocklistError::invalid(name, "label longer than 63 bytes"));
        }
        encoded_len += 1 + label.len();
    }

    if encoded_len > MAX_NAME_LEN {
        return Err(BlocklistError::invalid(name, "name longer than 255 bytes"));
    }
    Ok(())
}

/// Labels from left to right, ignoring a trailing dot.
pub fn labels(name: &str) -> impl DoubleEndedIterator<Item = &str> {
    let name = name.strip_suffix('.').unwrap_or(name);
    name.split('.').filter(move |_| !name.is_empty())
}

/// Lowercase fully-qualified form, e.g. `"Ads.Example.COM"` -> `"ads.example.com."`.
pub fn canonical_name(name: &str) -> Cow<'_, str> {
    let has_upper = name.bytes().any(|b| b.is_ascii_uppercase());
    let has_dot = name.ends_with('.');

    match (has_upper, has_dot) {
        (false, true) => Cow::Borrowed(name),
        (false, false) => Cow::Owned(format!("{}.", name)),
        (true, true) => Cow::Owned(name.to_ascii_lowercase()),
        (true, false) => Cow::Owned(format!("{}.", name.to_ascii_lowercase())),
    }
}
