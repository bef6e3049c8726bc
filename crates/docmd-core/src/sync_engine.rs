//! Push sequencing: the part of docmd that ties the link table, conflict
//! detection, rendering and the remote store together.
//!
//! A push runs: link lookup → (optional) local change check → conflict check
//! and resolution → render → remote update → sync state update. Anything that
//! fails before the remote update leaves the remote untouched. Bookkeeping
//! failures after the remote update are warnings: the content already reached
//! the remote, and the next push compares fresh state.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::conflict::{ConflictReport, Prompt, Resolution, has_remote_conflict, resolve_conflict};
use crate::error::{SyncError, SyncWarning};
use crate::fingerprint::Fingerprint;
use crate::link::Link;
use crate::remote::{Authenticator, DocInfo, RemoteError, RemoteStore, Renderer};
use crate::store::{FingerprintRefresh, LinkStore};

/// Options for [`SyncEngine::link`].
#[derive(Debug, Clone, Default)]
pub struct LinkOptions {
    /// Remote title; defaults to the file stem
    pub title: Option<String>,
    /// Remote folder; defaults to the table's default folder
    pub folder: Option<String>,
}

/// Options for [`SyncEngine::push`] and [`SyncEngine::push_all`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PushOptions {
    /// Skip conflict detection entirely
    pub force: bool,
    /// Do nothing when the fingerprint shows no local edit (watch mode)
    pub only_if_changed: bool,
}

/// Options for [`SyncEngine::unlink`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UnlinkOptions {
    /// Also delete the remote document
    pub delete_remote: bool,
    /// Skip the confirmation prompt
    pub assume_yes: bool,
}

#[derive(Debug)]
pub enum LinkOutcome {
    Created { key: PathBuf, link: Link },
    AlreadyLinked { key: PathBuf, link: Link },
}

#[derive(Debug)]
pub enum PushOutcome {
    /// Remote updated. `link` is the state after bookkeeping.
    Pushed {
        key: PathBuf,
        link: Link,
        warnings: Vec<SyncWarning>,
    },
    /// The user chose to keep the remote version.
    Skipped { key: PathBuf },
    /// No local change since the last push.
    Unchanged { key: PathBuf },
}

/// Result of pushing every linked file.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub pushed: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, SyncError)>,
    pub warnings: Vec<(PathBuf, SyncWarning)>,
    /// The batch stopped early on an abort
    pub aborted: bool,
}

/// Sync state of one linked file, as shown by `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    LocalMissing,
    RemoteMissing,
    LocalChanges,
    InSync,
    /// The check itself failed
    Unknown(String),
}

#[derive(Debug, Clone)]
pub struct FileStatus {
    pub path: PathBuf,
    pub link: Link,
    pub state: FileState,
}

#[derive(Debug)]
pub enum UnlinkOutcome {
    NotLinked,
    Cancelled,
    Unlinked {
        key: PathBuf,
        link: Link,
        remote_deleted: bool,
        /// A failed remote delete does not keep the link
        delete_error: Option<RemoteError>,
    },
}

/// Sync orchestrator over the link store and the external collaborators.
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<LinkStore>,
    remote: Arc<dyn RemoteStore>,
    renderer: Arc<dyn Renderer>,
    auth: Arc<dyn Authenticator>,
    prompt: Arc<dyn Prompt>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<LinkStore>,
        remote: Arc<dyn RemoteStore>,
        renderer: Arc<dyn Renderer>,
        auth: Arc<dyn Authenticator>,
        prompt: Arc<dyn Prompt>,
    ) -> Self {
        Self {
            store,
            remote,
            renderer,
            auth,
            prompt,
        }
    }

    pub fn store(&self) -> &Arc<LinkStore> {
        &self.store
    }

    /// Create a remote document from `path` and link it.
    pub async fn link(&self, path: &Path, options: LinkOptions) -> Result<LinkOutcome, SyncError> {
        self.ensure_authenticated()?;
        let key = LinkStore::key(path)?;
        if let Some(link) = self.store.get_link(&key)? {
            return Ok(LinkOutcome::AlreadyLinked { key, link });
        }

        let source = read_source(&key)?;
        let title = options
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| default_title(&key));
        let folder = options.folder.or_else(|| self.store.default_folder());

        let content = self.renderer.render(&source)?;
        let info = self
            .remote
            .create(&title, &content, folder.as_deref())
            .await?;
        info!("Created remote document {} for {}", info.id, key.display());

        let link = Link::new(info.id, info.url, info.title, Utc::now());
        self.store.add_link(&key, link.clone())?;
        Ok(LinkOutcome::Created { key, link })
    }

    /// Push one linked file.
    pub async fn push(&self, path: &Path, options: PushOptions) -> Result<PushOutcome, SyncError> {
        self.ensure_authenticated()?;
        let key = self.linked_key(path)?;
        let link = self
            .store
            .get_link(&key)?
            .ok_or_else(|| SyncError::NotLinked(key.clone()))?;

        let metadata = match fs::metadata(&key) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SyncError::FileMissing(key));
            }
            Err(source) => return Err(SyncError::Read { path: key, source }),
        };

        if options.only_if_changed && !self.store.has_local_changes(&key)? {
            debug!("No local changes in {}, skipping push", key.display());
            return Ok(PushOutcome::Unchanged { key });
        }

        let mut warnings = Vec::new();
        if !options.force {
            match self.check_conflict(&link).await {
                Ok(None) => {}
                Ok(Some(remote)) => {
                    let local_modified = metadata.modified().ok().map(DateTime::<Utc>::from);
                    let report = ConflictReport::new(
                        &link,
                        local_modified,
                        remote.modified_time,
                        remote.modified_by,
                    );
                    match resolve_conflict(&report, self.prompt.as_ref()).await {
                        Resolution::OverwriteRemote => {
                            info!("Overwriting remote changes for {}", key.display());
                        }
                        Resolution::KeepRemote => {
                            info!("Keeping remote version of {}", key.display());
                            return Ok(PushOutcome::Skipped { key });
                        }
                        Resolution::Abort => return Err(SyncError::Aborted),
                    }
                }
                Err(e) => {
                    warn!("Could not check {} for conflicts: {}", key.display(), e);
                    warnings.push(SyncWarning::ConflictCheckFailed(e));
                }
            }
        }

        let source = read_source(&key)?;
        let pushed = Fingerprint::of(&source);
        let content = self.renderer.render(&source)?;
        let info = self.remote.update(&link.document_id, &content).await?;
        debug!("Updated remote document {} from {}", info.id, key.display());

        match self
            .store
            .update_sync_state(&key, Some(info.revision_marker()), &pushed)
        {
            Ok(FingerprintRefresh::Refreshed(_)) => {}
            Ok(FingerprintRefresh::Superseded { .. }) => {
                info!("{} changed during the push; it is pending again", key.display());
            }
            Ok(FingerprintRefresh::Skipped(e)) => {
                warnings.push(SyncWarning::FingerprintNotRefreshed(e));
            }
            Err(e) => warnings.push(SyncWarning::BookkeepingFailed(e)),
        }

        let link = self.store.get_link(&key).ok().flatten().unwrap_or(link);
        Ok(PushOutcome::Pushed {
            key,
            link,
            warnings,
        })
    }

    /// Push every linked file, continuing past individual failures.
    ///
    /// An abort from the conflict prompt stops the batch.
    pub async fn push_all(&self, options: PushOptions) -> Result<BatchReport, SyncError> {
        self.ensure_authenticated()?;
        let paths: Vec<PathBuf> = self.store.snapshot().links.into_keys().collect();
        let mut report = BatchReport::default();

        for path in paths {
            match self.push(&path, options).await {
                Ok(PushOutcome::Pushed { warnings, .. }) => {
                    report
                        .warnings
                        .extend(warnings.into_iter().map(|w| (path.clone(), w)));
                    report.pushed.push(path);
                }
                Ok(PushOutcome::Skipped { .. } | PushOutcome::Unchanged { .. }) => {
                    report.skipped.push(path);
                }
                Err(e) if e.is_batch_fatal() => {
                    info!("Batch aborted at {}", path.display());
                    report.aborted = true;
                    break;
                }
                Err(e) => {
                    warn!("Failed to push {}: {}", path.display(), e);
                    report.failed.push((path, e));
                }
            }
        }

        Ok(report)
    }

    /// Sync state of every linked file.
    pub async fn status(&self) -> Result<Vec<FileStatus>, SyncError> {
        self.ensure_authenticated()?;
        let table = self.store.snapshot();
        let mut statuses = Vec::with_capacity(table.len());
        for (path, link) in table.links {
            let state = self.file_state(&path, &link).await;
            statuses.push(FileStatus { path, link, state });
        }
        Ok(statuses)
    }

    /// Remove the link for `path`, optionally deleting the remote document.
    pub async fn unlink(
        &self,
        path: &Path,
        options: UnlinkOptions,
    ) -> Result<UnlinkOutcome, SyncError> {
        self.ensure_authenticated()?;
        let key = LinkStore::key(path)?;
        let Some(link) = self.store.get_link(&key)? else {
            return Ok(UnlinkOutcome::NotLinked);
        };

        if !options.assume_yes && !self.confirm_unlink(&key, options.delete_remote).await {
            return Ok(UnlinkOutcome::Cancelled);
        }

        let mut remote_deleted = false;
        let mut delete_error = None;
        if options.delete_remote {
            match self.remote.delete(&link.document_id).await {
                Ok(()) => remote_deleted = true,
                Err(e) => {
                    warn!("Failed to delete remote document {}: {}", link.document_id, e);
                    delete_error = Some(e);
                }
            }
        }

        self.store.remove_link(&key)?;
        Ok(UnlinkOutcome::Unlinked {
            key,
            link,
            remote_deleted,
            delete_error,
        })
    }

    /// Table key for `path`, which must be linked.
    pub fn linked_key(&self, path: &Path) -> Result<PathBuf, SyncError> {
        let key = LinkStore::key(path)?;
        match self.store.get_link(&key)? {
            Some(_) => Ok(key),
            None => Err(SyncError::NotLinked(key)),
        }
    }

    /// Linked files that currently exist on disk.
    pub fn existing_linked_paths(&self) -> Vec<PathBuf> {
        self.store
            .snapshot()
            .links
            .into_keys()
            .filter(|path| path.is_file())
            .collect()
    }

    /// `Some(remote)` when the remote changed after the last sync.
    async fn check_conflict(&self, link: &Link) -> Result<Option<DocInfo>, RemoteError> {
        if link.last_sync.is_none() {
            return Ok(None);
        }
        let remote = self.remote.get_info(&link.document_id).await?;
        Ok(has_remote_conflict(link, remote.modified_time).then_some(remote))
    }

    async fn file_state(&self, path: &Path, link: &Link) -> FileState {
        if !path.exists() {
            return FileState::LocalMissing;
        }
        match self.remote.exists(&link.document_id).await {
            Ok(true) => {}
            Ok(false) => return FileState::RemoteMissing,
            Err(e) => return FileState::Unknown(e.to_string()),
        }
        match self.store.has_local_changes(path) {
            Ok(true) => FileState::LocalChanges,
            Ok(false) => FileState::InSync,
            Err(e) => FileState::Unknown(e.to_string()),
        }
    }

    async fn confirm_unlink(&self, key: &Path, delete_remote: bool) -> bool {
        let name = key
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| key.display().to_string());
        let warning = if delete_remote {
            "WARN: The remote document WILL be deleted!"
        } else {
            "The remote document will NOT be deleted."
        };
        let message = format!("Unlink {name}?\n{warning}\n\n[Y/n]: ");

        match self.prompt.ask(&message).await {
            Ok(answer) => matches!(answer.trim().to_lowercase().as_str(), "" | "y" | "yes"),
            Err(e) => {
                debug!("Unlink prompt failed: {}", e);
                false
            }
        }
    }

    /// Fail with [`SyncError::NotAuthenticated`] unless a token is present.
    pub fn ensure_authenticated(&self) -> Result<(), SyncError> {
        if self.auth.token_exists() {
            Ok(())
        } else {
            Err(SyncError::NotAuthenticated)
        }
    }
}

fn read_source(path: &Path) -> Result<Vec<u8>, SyncError> {
    fs::read(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            SyncError::FileMissing(path.to_path_buf())
        } else {
            SyncError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

/// File name without its extension.
fn default_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string())
}
