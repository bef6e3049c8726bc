//! Link data model: the persisted binding between a local file and a remote document.
//!
//! The on-disk layout matches what earlier releases of docmd wrote, so existing
//! `config.json` files keep working:
//!
//! ```json
//! {
//!   "version": 1,
//!   "default_folder_id": "optional",
//!   "links": {
//!     "/home/me/notes.md": {
//!       "doc_id": "...",
//!       "doc_url": "...",
//!       "title": "notes",
//!       "created_at": "2025-01-01T10:00:00Z",
//!       "last_sync": "2025-01-01T10:00:00Z",
//!       "last_revision_id": "...",
//!       "local_hash_at_sync": "..."
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::fingerprint::Fingerprint;

/// Schema version written by this release.
pub const CURRENT_VERSION: u32 = 1;

/// One remote-document binding for one local file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Remote document identifier
    #[serde(rename = "doc_id")]
    pub document_id: String,
    /// Browser URL of the remote document
    #[serde(rename = "doc_url")]
    pub document_url: String,
    /// Remote document title
    pub title: String,
    /// When the binding was created
    pub created_at: DateTime<Utc>,
    /// Last successful push. `None` means the file has never been synced.
    #[serde(default, with = "sync_time")]
    pub last_sync: Option<DateTime<Utc>>,
    /// Opaque remote revision marker recorded at the last push
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub last_revision_id: Option<String>,
    /// Fingerprint of the local file as of `last_sync`
    #[serde(
        rename = "local_hash_at_sync",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "fingerprint_or_none"
    )]
    pub local_fingerprint_at_sync: Option<Fingerprint>,
}

impl Link {
    /// Create a binding for a freshly created remote document.
    ///
    /// `last_sync` starts at the creation time; no fingerprint is recorded
    /// until the first push.
    pub fn new(
        document_id: impl Into<String>,
        document_url: impl Into<String>,
        title: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            document_url: document_url.into(),
            title: title.into(),
            created_at,
            last_sync: Some(created_at),
            last_revision_id: None,
            local_fingerprint_at_sync: None,
        }
    }
}

/// Mapping from canonical absolute file path to its link.
///
/// Keys must already be normalized with [`canonical_key`]; [`crate::LinkStore`]
/// does this for every lookup and mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkTable {
    pub version: u32,
    #[serde(
        rename = "default_folder_id",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub default_folder: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub links: BTreeMap<PathBuf, Link>,
}

impl LinkTable {
    /// Create an empty table at the current schema version.
    pub fn new() -> Self {
        Self {
            version: CURRENT_VERSION,
            default_folder: None,
            links: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &Path) -> Option<&Link> {
        self.links.get(key)
    }

    pub fn get_mut(&mut self, key: &Path) -> Option<&mut Link> {
        self.links.get_mut(key)
    }

    pub fn insert(&mut self, key: PathBuf, link: Link) -> Option<Link> {
        self.links.insert(key, link)
    }

    pub fn remove(&mut self, key: &Path) -> Option<Link> {
        self.links.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &Link)> {
        self.links.iter()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

impl Default for LinkTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize a path into the form used as a [`LinkTable`] key.
///
/// The path is made absolute against the current directory and `.`/`..`
/// components are resolved lexically. Symlinks are not followed.
pub fn canonical_key(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut key = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                key.pop();
            }
            other => key.push(other.as_os_str()),
        }
    }
    Ok(key)
}

/// Serde adapter for `last_sync`.
///
/// Unset is written as the zero time (`0001-01-01T00:00:00Z`) and any time in
/// year 1 or earlier reads back as unset.
mod sync_time {
    use chrono::{DateTime, Datelike, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    const UNSET: &str = "0001-01-01T00:00:00Z";

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(time) => {
                serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            None => serializer.serialize_str(UNSET),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        let Some(raw) = raw.filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        let time = DateTime::parse_from_rfc3339(&raw)
            .map_err(de::Error::custom)?
            .with_timezone(&Utc);
        Ok((time.year() > 1).then_some(time))
    }
}

fn empty_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()))
}

fn fingerprint_or_none<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Fingerprint>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(Fingerprint::from_stored))
}

fn null_as_empty<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<PathBuf, Link>, D::Error> {
    let raw: Option<BTreeMap<PathBuf, Link>> = Option::deserialize(deserializer)?;
    Ok(raw.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn test_new_link_starts_at_creation_time() {
        let link = Link::new("doc-1", "https://docs/doc-1", "notes", sample_time());
        assert_eq!(link.last_sync, Some(sample_time()));
        assert!(link.local_fingerprint_at_sync.is_none());
        assert!(link.last_revision_id.is_none());
    }

    #[test]
    fn test_serialized_field_names() {
        let mut link = Link::new("doc-1", "https://docs/doc-1", "notes", sample_time());
        link.local_fingerprint_at_sync = Some(Fingerprint::of(b"x"));
        let json = serde_json::to_value(&link).unwrap();

        assert_eq!(json["doc_id"], "doc-1");
        assert_eq!(json["doc_url"], "https://docs/doc-1");
        assert_eq!(json["last_sync"], "2025-03-14T09:26:53Z");
        assert_eq!(json["local_hash_at_sync"], Fingerprint::of(b"x").as_str());
        assert!(json.get("last_revision_id").is_none());
    }

    #[test]
    fn test_unset_sync_time_uses_zero_time() {
        let mut link = Link::new("doc-1", "u", "t", sample_time());
        link.last_sync = None;
        let json = serde_json::to_string(&link).unwrap();
        assert!(json.contains("\"last_sync\":\"0001-01-01T00:00:00Z\""));

        let back: Link = serde_json::from_str(&json).unwrap();
        assert_eq!(back.last_sync, None);
    }

    #[test]
    fn test_reads_legacy_document() {
        let raw = r#"{
            "version": 1,
            "links": {
                "/home/me/notes.md": {
                    "doc_id": "abc",
                    "doc_url": "https://docs.google.com/document/d/abc/edit",
                    "title": "notes",
                    "created_at": "2024-05-01T08:00:00.123456789-04:00",
                    "last_sync": "0001-01-01T00:00:00Z",
                    "last_revision_id": "",
                    "local_hash_at_sync": ""
                }
            }
        }"#;
        let table: LinkTable = serde_json::from_str(raw).unwrap();
        let link = table.get(Path::new("/home/me/notes.md")).unwrap();

        assert_eq!(link.document_id, "abc");
        assert_eq!(link.last_sync, None);
        assert_eq!(link.last_revision_id, None);
        assert_eq!(link.local_fingerprint_at_sync, None);
        assert_eq!(
            link.created_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
                + chrono::Duration::nanoseconds(123_456_789)
        );
        assert_eq!(table.default_folder, None);
    }

    #[test]
    fn test_null_links_reads_as_empty() {
        let table: LinkTable = serde_json::from_str(r#"{"version":1,"links":null}"#).unwrap();
        assert!(table.is_empty());

        let table: LinkTable = serde_json::from_str(r#"{"version":1}"#).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_table_roundtrip_keeps_subsecond_precision() {
        let mut table = LinkTable::new();
        table.default_folder = Some("folder-9".into());
        let created = sample_time() + chrono::Duration::nanoseconds(42);
        let mut link = Link::new("doc-1", "u", "t", created);
        link.last_revision_id = Some("rev-3".into());
        table.insert(PathBuf::from("/tmp/a.md"), link);

        let json = serde_json::to_string_pretty(&table).unwrap();
        let back: LinkTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_canonical_key_is_absolute_and_lexically_clean() {
        let key = canonical_key(Path::new("docs/./drafts/../notes.md")).unwrap();
        assert!(key.is_absolute());
        assert!(key.ends_with("docs/notes.md"));
        assert_eq!(key, canonical_key(Path::new("docs/notes.md")).unwrap());

        let abs = canonical_key(Path::new("/var/notes/../notes.md")).unwrap();
        assert_eq!(abs, PathBuf::from("/var/notes.md"));
    }
}
