//! Collaborator seams: authentication gate, renderer, and remote document store.
//!
//! Implementations:
//! - `InMemoryRemote`, `StaticAuth` - For testing
//! - `DriveClient`, `TokenFile`, `MarkdownRenderer` (in docmd) - Google Drive v3

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("remote store returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("authorization failed: {0}")]
    Auth(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
#[error("render failed: {0}")]
pub struct RenderError(pub String);

/// Metadata describing a remote document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocInfo {
    pub id: String,
    pub url: String,
    pub title: String,
    /// Authoritative remote clock, used for conflict detection
    pub modified_time: DateTime<Utc>,
    /// Email of the last modifier, when the store reports it
    pub modified_by: Option<String>,
    /// Opaque revision marker, when the store has one
    pub revision_id: Option<String>,
}

impl DocInfo {
    /// Marker recorded as `last_revision_id` after a push.
    ///
    /// Falls back to the RFC3339 modified time when the store has no revision id.
    pub fn revision_marker(&self) -> String {
        self.revision_id
            .clone()
            .unwrap_or_else(|| self.modified_time.to_rfc3339())
    }
}

/// Precondition gate checked before every sync operation.
pub trait Authenticator: Send + Sync {
    fn token_exists(&self) -> bool;
}

/// Converts local file bytes to the remote document format.
pub trait Renderer: Send + Sync {
    fn render(&self, source: &[u8]) -> Result<String, RenderError>;
}

/// Remote document store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create a document, optionally inside `folder`.
    async fn create(
        &self,
        title: &str,
        content: &str,
        folder: Option<&str>,
    ) -> Result<DocInfo, RemoteError>;

    /// Replace a document's whole content.
    async fn update(&self, id: &str, content: &str) -> Result<DocInfo, RemoteError>;

    async fn get_info(&self, id: &str) -> Result<DocInfo, RemoteError>;

    async fn delete(&self, id: &str) -> Result<(), RemoteError>;

    async fn exists(&self, id: &str) -> Result<bool, RemoteError>;
}

/// Fixed answer for the authentication gate.
pub struct StaticAuth(pub bool);

impl Authenticator for StaticAuth {
    fn token_exists(&self) -> bool {
        self.0
    }
}

/// Renderer that passes bytes through as UTF-8 text.
pub struct PlainRenderer;

impl Renderer for PlainRenderer {
    fn render(&self, source: &[u8]) -> Result<String, RenderError> {
        String::from_utf8(source.to_vec()).map_err(|e| RenderError(e.to_string()))
    }
}

/// A stored in-memory document.
#[derive(Debug, Clone)]
pub struct StoredDoc {
    pub title: String,
    pub content: String,
    pub folder: Option<String>,
    pub modified_time: DateTime<Utc>,
    pub modified_by: Option<String>,
    /// Number of content writes (create counts as the first)
    pub revision: u64,
}

#[derive(Default)]
struct RemoteState {
    docs: HashMap<String, StoredDoc>,
    next_id: u64,
    /// Remaining injected failures for `get_info`
    fail_info: usize,
    /// Remaining injected failures for `update`
    fail_update: usize,
    /// Call counts for assertions
    info_calls: usize,
    update_calls: usize,
}

/// In-memory remote store for testing
#[derive(Default)]
pub struct InMemoryRemote {
    state: Mutex<RemoteState>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current copy of a document.
    pub fn document(&self, id: &str) -> Option<StoredDoc> {
        self.lock().docs.get(id).cloned()
    }

    /// Simulate an out-of-band edit made by someone else at `at`.
    pub fn edit_out_of_band(&self, id: &str, content: &str, at: DateTime<Utc>, by: &str) {
        if let Some(doc) = self.lock().docs.get_mut(id) {
            doc.content = content.to_string();
            doc.modified_time = at;
            doc.modified_by = Some(by.to_string());
            doc.revision += 1;
        }
    }

    /// Make the next `count` `get_info` calls fail with a transport error.
    pub fn fail_next_info(&self, count: usize) {
        self.lock().fail_info = count;
    }

    /// Make the next `count` `update` calls fail with a transport error.
    pub fn fail_next_update(&self, count: usize) {
        self.lock().fail_update = count;
    }

    pub fn info_calls(&self) -> usize {
        self.lock().info_calls
    }

    pub fn update_calls(&self) -> usize {
        self.lock().update_calls
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn info(id: &str, doc: &StoredDoc) -> DocInfo {
        DocInfo {
            id: id.to_string(),
            url: format!("memory://docs/{id}"),
            title: doc.title.clone(),
            modified_time: doc.modified_time,
            modified_by: doc.modified_by.clone(),
            revision_id: Some(doc.revision.to_string()),
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn create(
        &self,
        title: &str,
        content: &str,
        folder: Option<&str>,
    ) -> Result<DocInfo, RemoteError> {
        let mut state = self.lock();
        state.next_id += 1;
        let id = format!("doc-{}", state.next_id);
        let doc = StoredDoc {
            title: title.to_string(),
            content: content.to_string(),
            folder: folder.map(str::to_string),
            modified_time: Utc::now(),
            modified_by: None,
            revision: 1,
        };
        let info = Self::info(&id, &doc);
        state.docs.insert(id, doc);
        Ok(info)
    }

    async fn update(&self, id: &str, content: &str) -> Result<DocInfo, RemoteError> {
        let mut state = self.lock();
        state.update_calls += 1;
        if state.fail_update > 0 {
            state.fail_update -= 1;
            return Err(RemoteError::Transport("injected update failure".into()));
        }
        let doc = state
            .docs
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        doc.content = content.to_string();
        doc.modified_time = Utc::now();
        doc.modified_by = None;
        doc.revision += 1;
        Ok(Self::info(id, doc))
    }

    async fn get_info(&self, id: &str) -> Result<DocInfo, RemoteError> {
        let mut state = self.lock();
        state.info_calls += 1;
        if state.fail_info > 0 {
            state.fail_info -= 1;
            return Err(RemoteError::Transport("injected info failure".into()));
        }
        state
            .docs
            .get(id)
            .map(|doc| Self::info(id, doc))
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        self.lock()
            .docs
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn exists(&self, id: &str) -> Result<bool, RemoteError> {
        Ok(self.lock().docs.contains_key(id))
    }
}
