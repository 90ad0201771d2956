// src/storage/paths.rs
//! Local-store location markers
//!
//! Registry locations are either `local://<path>` for files still on this
//! host or a remote URL once committed.

use std::path::{Path, PathBuf};

/// Marker prefix for locally stored files
pub const LOCAL_PREFIX: &str = "local://";

/// Turn a filesystem path into a registry location
pub fn add_local_store_prefix(path: &Path) -> String {
    let normalized = path.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
    format!("{}{}", LOCAL_PREFIX, normalized)
}

/// Remove the local-store marker, if present
pub fn strip_prefix(location: &str) -> &str {
    location.strip_prefix(LOCAL_PREFIX).unwrap_or(location)
}

/// Filesystem path for a local location, `None` for remote URLs
pub fn local_path(location: &str) -> Option<PathBuf> {
    let stripped = strip_prefix(location);
    if stripped.is_empty() || stripped.contains("://") {
        return None;
    }
    Some(PathBuf::from(stripped))
}

/// Final path component of a location
pub fn file_name(location: &str) -> String {
    let stripped = strip_prefix(location);
    stripped
        .rsplit('/')
        .next()
        .unwrap_or(stripped)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_roundtrip() {
        let location = add_local_store_prefix(Path::new("/tmp/warcs/rec-1.warc.gz"));
        assert_eq!(location, "local:///tmp/warcs/rec-1.warc.gz");
        assert_eq!(strip_prefix(&location), "/tmp/warcs/rec-1.warc.gz");
        assert_eq!(
            local_path(&location).unwrap(),
            PathBuf::from("/tmp/warcs/rec-1.warc.gz")
        );
    }

    #[test]
    fn test_remote_locations() {
        assert!(local_path("s3://bucket/warcs/rec-1.warc.gz").is_none());
        assert!(local_path("file:///srv/storage/rec-1.warc.gz").is_none());
        assert!(local_path("local://").is_none());
        assert_eq!(
            local_path("/tmp/bare/path.warc").unwrap(),
            PathBuf::from("/tmp/bare/path.warc")
        );
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("local:///tmp/index-1-ABC.cdxj"), "index-1-ABC.cdxj");
        assert_eq!(file_name("https://host/a/b.warc"), "b.warc");
        assert_eq!(file_name("plain.warc"), "plain.warc");
    }
}
