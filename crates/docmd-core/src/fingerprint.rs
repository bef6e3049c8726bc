//! Content fingerprints for local change detection.
//!
//! A fingerprint is the SHA-256 of a file's bytes. It never looks at mtime or
//! path, so touching a file without changing it does not count as an edit.

use std::fmt::{self, Display, Formatter};
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of a byte sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint raw bytes.
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Read a file and fingerprint its current contents.
    pub fn of_file(path: &Path) -> io::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self::of(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap a stored digest string. Empty strings mean "no fingerprint".
    pub(crate) fn from_stored(value: String) -> Option<Self> {
        if value.is_empty() { None } else { Some(Self(value)) }
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_deterministic() {
        assert_eq!(Fingerprint::of(b"hello world"), Fingerprint::of(b"hello world"));
    }

    #[test]
    fn test_different_content_different_fingerprint() {
        assert_ne!(Fingerprint::of(b"hello"), Fingerprint::of(b"world"));
        // A single trailing newline is an edit.
        assert_ne!(Fingerprint::of(b"# Notes"), Fingerprint::of(b"# Notes\n"));
    }

    #[test]
    fn test_fingerprint_is_sha256_hex() {
        let fp = Fingerprint::of(b"");
        assert_eq!(
            fp.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_file_fingerprint_ignores_path_and_mtime() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.md");
        let b = dir.path().join("nested-b.md");
        std::fs::write(&a, "same content").unwrap();
        std::fs::write(&b, "same content").unwrap();

        assert_eq!(
            Fingerprint::of_file(&a).unwrap(),
            Fingerprint::of_file(&b).unwrap()
        );
        assert_eq!(Fingerprint::of_file(&a).unwrap(), Fingerprint::of(b"same content"));
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let err = Fingerprint::of_file(&dir.path().join("missing.md")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_empty_stored_value_is_none() {
        assert!(Fingerprint::from_stored(String::new()).is_none());
        assert_eq!(
            Fingerprint::from_stored("abc".into()).map(|f| f.to_string()),
            Some("abc".to_string())
        );
    }
}
