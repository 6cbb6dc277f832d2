use std::{fs::File, io::BufReader};

use nullroute_blocklist::{Blocklist, BlocklistError, LoadMode, LoadStats};

use crate::config::BlocklistConfig;

/// Build the blocklist described by `config`.
///
/// A missing or unreadable file leaves the server running with whatever was
/// loaded; a malformed line in strict mode is fatal.
pub fn load_blocklist(config: &BlocklistConfig) -> anyhow::Result<(Blocklist, LoadStats)> {
    let mut blocklist = Blocklist::empty();
    let Some(path) = &config.path else {
        return Ok((blocklist, LoadStats::default()));
    };

    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to open blocklist");
            return Ok((blocklist, LoadStats::default()));
        }
    };

    let mode = if config.strict { LoadMode::Strict } else { LoadMode::Lenient };
    match blocklist.extend_from_reader(BufReader::new(file), mode) {
        Ok(stats) => Ok((blocklist, stats)),
        Err(BlocklistError::Io { source, loaded }) => {
            tracing::error!(path = %path.display(), error = %source, "failed to read blocklist");
            Ok((blocklist, loaded))
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!("loading blocklist {}", path.display()))),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_list(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_no_path_is_empty() {
        let (blocklist, stats) = load_blocklist(&BlocklistConfig::default()).unwrap();
        assert!(blocklist.is_empty());
        assert_eq!(stats, LoadStats::default());
    }

    #[test]
    fn test_missing_file_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = BlocklistConfig {
            path: Some(dir.path().join("missing.txt")),
            strict: false,
        };

        let (blocklist, _) = load_blocklist(&config).unwrap();
        assert!(blocklist.is_empty());
    }

    #[test]
    fn test_read_error_is_not_fatal() {
        // opening a directory succeeds, reading it fails
        let dir = tempfile::tempdir().unwrap();
        let config = BlocklistConfig {
            path: Some(dir.path().to_path_buf()),
            strict: true,
        };

        let (blocklist, stats) = load_blocklist(&config).unwrap();
        assert!(blocklist.is_empty());
        assert_eq!(stats, LoadStats::default());
    }

    #[test]
    fn test_loads_patterns() {
        let file = write_list("ads.example.com\n*.tracker.net\n\nbad..name\n");
        let config = BlocklistConfig {
            path: Some(file.path().to_path_buf()),
            strict: false,
        };

        let (blocklist, stats) = load_blocklist(&config).unwrap();
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.skipped, 1);
        assert!(blocklist.contains("ads.example.com."));
        assert!(blocklist.contains("cdn.tracker.net."));
        assert!(!blocklist.contains("example.com."));
    }

    #[test]
    fn test_strict_mode_rejects_bad_line() {
        let file = write_list("ads.example.com\nbad..name\n");
        let config = BlocklistConfig {
            path: Some(file.path().to_path_buf()),
            strict: true,
        };

        assert!(load_blocklist(&config).is_err());
    }
}
