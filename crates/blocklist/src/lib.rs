mod error;
mod exact_set;
mod glob_trie;
pub mod name;

use std::io::BufRead;

use idna::AsciiDenyList;

pub use error::BlocklistError;
pub use exact_set::ExactSet;
pub use glob_trie::GlobTrie;

/// A set of domain names that can answer membership queries.
pub trait NameSet {
    fn insert(&mut self, name: &str) -> Result<(), BlocklistError>;
    fn contains(&self, name: &str) -> bool;
}

/// How malformed lines are treated while loading.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum LoadMode {
    /// Skip and count them.
    #[default]
    Lenient,
    /// Fail on the first one.
    Strict,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Patterns accepted by the exact set or the trie.
    pub inserted: usize,
    /// Non-blank lines that were not inserted.
    pub skipped: usize,
}

/// Exact names plus wildcard patterns.
///
/// Built once at startup and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct Blocklist {
    exact: ExactSet,
    glob: GlobTrie,
}

impl Blocklist {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a blocklist, one pattern per line, skipping malformed lines.
    pub fn load<R: BufRead>(reader: R) -> Result<(Self, LoadStats), BlocklistError> {
        let mut blocklist = Self::empty();
        let stats = blocklist.extend_from_reader(reader, LoadMode::Lenient)?;
        Ok((blocklist, stats))
    }

    /// Add every pattern read from `reader`.
    ///
    /// On an I/O error the patterns read so far stay in place and the error
    /// carries their [`LoadStats`].
    pub fn extend_from_reader<R: BufRead>(
        &mut self,
        mut reader: R,
        mode: LoadMode,
    ) -> Result<LoadStats, BlocklistError> {
        let mut stats = LoadStats::default();
        let mut buf = Vec::new();
        let mut line_no = 0;

        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|source| BlocklistError::Io { source, loaded: stats })?;
            if read == 0 {
                break;
            }
            line_no += 1;

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match self.insert_line(line) {
                Ok(()) => stats.inserted += 1,
                Err(e) if mode == LoadMode::Strict => {
                    return Err(BlocklistError::Line {
                        line: line_no,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    tracing::debug!(line = line_no, error = %e, "skipping blocklist entry");
                    stats.skipped += 1;
                }
            }
        }

        Ok(stats)
    }

    fn insert_line(&mut self, line: &str) -> Result<(), BlocklistError> {
        if line.is_ascii() {
            return self.insert(line);
        }

        let ascii = idna::domain_to_ascii_cow(line.as_bytes(), AsciiDenyList::URL)
            .map_err(|_| BlocklistError::invalid(line, "invalid internationalized name"))?;
        self.insert(&ascii)
    }

    /// Insert one pattern, routing it to the trie when it contains `*`.
    pub fn insert(&mut self, pattern: &str) -> Result<(), BlocklistError> {
        name::validate_name(pattern)?;
        if pattern == "." {
            return Err(BlocklistError::invalid(pattern, "root name"));
        }

        let pattern = name::canonical_name(pattern);
        let set: &mut dyn NameSet = if pattern.contains('*') {
            &mut self.glob
        } else {
            &mut self.exact
        };
        set.insert(&pattern)
    }

    /// Whether `fqdn` is blocked, checking the exact set first.
    pub fn contains(&self, fqdn: &str) -> bool {
        self.exact.contains(fqdn) || self.glob.contains(fqdn)
    }

    /// Number of distinct patterns.
    pub fn len(&self) -> usize {
        self.exact.len() + self.glob.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.glob.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, BufReader, Read};

    use super::*;

    #[test]
    fn test_load_classifies_lines() {
        let source = "sub1.example.com.\n*.example.com.\nTracker.Example.net\n";
        let (blocklist, stats) = Blocklist::load(source.as_bytes()).unwrap();

        assert_eq!(stats, LoadStats { inserted: 3, skipped: 0 });
        assert_eq!(blocklist.len(), 3);

        assert!(blocklist.contains("sub1.example.com."));
        assert!(blocklist.contains("other.example.com"));
        assert!(blocklist.contains("tracker.example.net."));
        assert!(!blocklist.contains("example.com."));
        assert!(!blocklist.contains("www.tracker.example.net"));
    }

    #[test]
    fn test_load_skips_malformed_lines() {
        let source = format!(
            "good.example.com\n\n  padded.example.com  \nbad..example.com\n{}.com\ncom\n!x.example.com\n.\r\nlast.example.org",
            "a".repeat(64)
        );
        let (blocklist, stats) = Blocklist::load(source.as_bytes()).unwrap();

        // exact lines are not checked for a second level, so `com` is accepted
        assert_eq!(stats.inserted, 5);
        assert_eq!(stats.skipped, 3);
        assert!(blocklist.contains("padded.example.com"));
        assert!(blocklist.contains("last.example.org"));
        assert!(!blocklist.contains("bad.example.com"));
    }

    #[test]
    fn test_load_strict_reports_line() {
        let source = "good.example.com\nsub.*x.example.com\n";
        let err = Blocklist::empty()
            .extend_from_reader(source.as_bytes(), LoadMode::Strict)
            .unwrap_err();

        match err {
            BlocklistError::Line { line, source } => {
                assert_eq!(line, 2);
                assert!(matches!(*source, BlocklistError::InvalidPattern { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_idna_line() {
        let (blocklist, stats) = Blocklist::load("bücher.example\n".as_bytes()).unwrap();
        assert_eq!(stats.inserted, 1);
        assert!(blocklist.contains("xn--bcher-kva.example."));
    }

    #[test]
    fn test_duplicate_patterns() {
        let mut blocklist = Blocklist::empty();
        blocklist.insert("ads.example.com").unwrap();
        blocklist.insert("ads.example.com.").unwrap();
        blocklist.insert("*.example.org").unwrap();
        blocklist.insert("*.example.org").unwrap();

        assert_eq!(blocklist.len(), 2);
        assert!(blocklist.contains("ads.example.com"));
        assert!(blocklist.contains("x.example.org"));
    }

    struct FailingReader {
        data: io::Cursor<&'static [u8]>,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::other("disk went away")),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn test_io_error_keeps_loaded_patterns() {
        let reader = BufReader::new(FailingReader {
            data: io::Cursor::new(b"one.example.com\none.example.com\nbad..name\ntwo.example.com\n"),
        });

        let mut blocklist = Blocklist::empty();
        let err = blocklist.extend_from_reader(reader, LoadMode::Lenient).unwrap_err();

        let BlocklistError::Io { loaded, .. } = err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(loaded, LoadStats { inserted: 3, skipped: 1 });
        assert_eq!(blocklist.len(), 2);
        assert!(blocklist.contains("one.example.com"));
        assert!(blocklist.contains("two.example.com"));
    }
}
