//! Persistence for the link table.
//!
//! The table lives in a single JSON document (`~/.docmd/config.json` for the
//! CLI). Every mutation is load-modify-save under one mutex: a working copy is
//! changed and written, and only a successful write replaces the in-memory
//! table. Writes go through a temp file + rename so readers never see a
//! partially written document.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rand::Rng;
use thiserror::Error;
use tracing::debug;

use crate::fingerprint::Fingerprint;
use crate::link::{Link, LinkTable, canonical_key};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read link table {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse link table {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to encode link table: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write link table {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("cannot resolve path {}: {source}", path.display())]
    InvalidPath { path: PathBuf, source: io::Error },

    #[error("file is not linked: {}", .0.display())]
    NotLinked(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    ReadFile { path: PathBuf, source: io::Error },
}

/// Outcome of the best-effort fingerprint refresh in [`LinkStore::update_sync_state`].
#[derive(Debug)]
pub enum FingerprintRefresh {
    /// The file still holds the pushed bytes; their fingerprint was recorded.
    Refreshed(Fingerprint),
    /// The file was saved again after it was read for the push. The pushed
    /// fingerprint was recorded, so the newer content shows up as a local change.
    Superseded { pushed: Fingerprint, current: Fingerprint },
    /// The file could not be read; sync time and revision were still recorded.
    Skipped(io::Error),
}

/// Mutex-guarded link table backed by a JSON file.
pub struct LinkStore {
    /// Path to the persisted table.
    path: PathBuf,
    /// In-memory copy, always equal to the last successful write.
    table: Mutex<LinkTable>,
}

impl LinkStore {
    /// Open the store at `path`, loading existing state if present.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let table = Self::load(&path)?;
        debug!("Loaded {} link(s) from {}", table.len(), path.display());
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    /// Read a persisted table. A missing file yields a fresh empty table.
    pub fn load(path: &Path) -> Result<LinkTable, StoreError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LinkTable::new()),
            Err(source) => {
                return Err(StoreError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        serde_json::from_str(&contents).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write a whole table to `path`, replacing any previous contents.
    ///
    /// The file is owner read/write only; its directory is created owner-only
    /// if missing.
    pub fn save_table(path: &Path, table: &LinkTable) -> Result<(), StoreError> {
        let contents = serde_json::to_vec_pretty(table)?;
        write_private_file(path, &contents).map_err(|source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Persist the current in-memory table.
    pub fn save(&self) -> Result<(), StoreError> {
        let table = self.lock();
        Self::save_table(&self.path, &table)
    }

    /// Path of the persisted table.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current table.
    pub fn snapshot(&self) -> LinkTable {
        self.lock().clone()
    }

    /// Remote folder used for new documents when none is given, as loaded
    /// from the table.
    pub fn default_folder(&self) -> Option<String> {
        self.lock().default_folder.clone()
    }

    /// Normalize `path` into its table key.
    pub fn key(path: &Path) -> Result<PathBuf, StoreError> {
        canonical_key(path).map_err(|source| StoreError::InvalidPath {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn get_link(&self, path: &Path) -> Result<Option<Link>, StoreError> {
        let key = Self::key(path)?;
        Ok(self.lock().get(&key).cloned())
    }

    /// Insert or replace the link for `path` and persist. Returns the table key.
    pub fn add_link(&self, path: &Path, link: Link) -> Result<PathBuf, StoreError> {
        let key = Self::key(path)?;
        self.mutate(|table| {
            table.insert(key.clone(), link);
            Ok(())
        })?;
        Ok(key)
    }

    /// Remove the link for `path` and persist. Returns the removed link, if any.
    pub fn remove_link(&self, path: &Path) -> Result<Option<Link>, StoreError> {
        let key = Self::key(path)?;
        self.mutate(|table| Ok(table.remove(&key)))
    }

    /// Record a successful push of the bytes fingerprinted as `pushed`.
    ///
    /// Sets `last_sync` to now and records `revision`, then re-reads the file.
    /// The recorded fingerprint is always the one of the content that reached
    /// the remote, never of bytes saved after the push read the file. If the
    /// file cannot be read the refresh is skipped and reported; time and
    /// revision are still saved.
    pub fn update_sync_state(
        &self,
        path: &Path,
        revision: Option<String>,
        pushed: &Fingerprint,
    ) -> Result<FingerprintRefresh, StoreError> {
        let key = Self::key(path)?;
        let refresh = match Fingerprint::of_file(&key) {
            Ok(current) if current == *pushed => FingerprintRefresh::Refreshed(current),
            Ok(current) => FingerprintRefresh::Superseded {
                pushed: pushed.clone(),
                current,
            },
            Err(e) => FingerprintRefresh::Skipped(e),
        };
        let now = Utc::now();

        self.mutate(|table| {
            let link = table
                .get_mut(&key)
                .ok_or_else(|| StoreError::NotLinked(key.clone()))?;
            link.last_sync = Some(now);
            link.last_revision_id = revision;
            match &refresh {
                FingerprintRefresh::Refreshed(fingerprint)
                | FingerprintRefresh::Superseded {
                    pushed: fingerprint,
                    ..
                } => link.local_fingerprint_at_sync = Some(fingerprint.clone()),
                FingerprintRefresh::Skipped(_) => {}
            }
            Ok(())
        })?;

        Ok(refresh)
    }

    /// Whether the file differs from what was last pushed.
    ///
    /// Without a recorded fingerprint this is always `true`.
    pub fn has_local_changes(&self, path: &Path) -> Result<bool, StoreError> {
        let key = Self::key(path)?;
        let recorded = {
            let table = self.lock();
            let link = table
                .get(&key)
                .ok_or_else(|| StoreError::NotLinked(key.clone()))?;
            link.local_fingerprint_at_sync.clone()
        };

        let Some(recorded) = recorded else {
            return Ok(true);
        };
        let current = Fingerprint::of_file(&key).map_err(|source| StoreError::ReadFile {
            path: key.clone(),
            source,
        })?;
        Ok(current != recorded)
    }

    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut LinkTable) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut table = self.lock();
        let mut working = table.clone();
        let out = apply(&mut working)?;
        Self::save_table(&self.path, &working)?;
        *table = working;
        Ok(out)
    }

    fn lock(&self) -> MutexGuard<'_, LinkTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Generate a random hex string for temp file names.
fn random_hex() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    hex::encode(bytes)
}

/// Replace `path` with `contents`, owner read/write only.
///
/// The write goes through a temp file + rename, so the file is 0600 even if
/// it existed before with wider permissions. A missing parent directory is
/// created owner-only.
pub fn write_private_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_private_dir(parent)?;
    }
    write_atomic(path, contents)
}

fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let temp_path = path.with_extension(format!("{}.tmp", random_hex()));

    let result = open_private(&temp_path)
        .and_then(|mut file| {
            file.write_all(contents)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&temp_path, path));

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

#[cfg(unix)]
fn open_private(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new().write(true).create_new(true).open(path)
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}
