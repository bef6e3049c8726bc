use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::remote::{RemoteError, RenderError};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("file is not linked: {}", .0.display())]
    NotLinked(PathBuf),

    #[error("file not found: {}", .0.display())]
    FileMissing(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to render document: {0}")]
    Render(#[from] RenderError),

    #[error("remote store error: {0}")]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Store(StoreError),

    #[error("aborted")]
    Aborted,
}

impl SyncError {
    /// Errors that must stop a multi-file batch instead of moving on.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, SyncError::Aborted)
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotLinked(path) => SyncError::NotLinked(path),
            other => SyncError::Store(other),
        }
    }
}

/// Degraded-but-successful conditions reported alongside a push.
#[derive(Debug, Error)]
pub enum SyncWarning {
    #[error("could not check for conflicts: {0}")]
    ConflictCheckFailed(RemoteError),

    #[error("pushed, but could not refresh the local fingerprint: {0}")]
    FingerprintNotRefreshed(io::Error),

    #[error("pushed, but failed to update sync state: {0}")]
    BookkeepingFailed(StoreError),
}
