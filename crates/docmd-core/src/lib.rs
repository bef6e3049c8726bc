//! docmd-core: Sync engine for keeping local markdown files pushed to remote documents.
//!
//! This crate provides:
//! - The persisted link table and its mutex-guarded store
//! - Content fingerprints for local change detection
//! - Timestamp conflict detection and the three-way resolution policy
//! - Push sequencing over the authenticator, renderer and remote store seams

pub mod conflict;
pub mod error;
pub mod fingerprint;
pub mod link;
pub mod remote;
pub mod store;
pub mod sync_engine;

pub use conflict::{ConflictReport, Prompt, Resolution, ScriptedPrompt, has_remote_conflict, resolve_conflict};
pub use error::{SyncError, SyncWarning};
pub use fingerprint::Fingerprint;
pub use link::{CURRENT_VERSION, Link, LinkTable, canonical_key};
pub use remote::{
    Authenticator, DocInfo, InMemoryRemote, PlainRenderer, RemoteError, RemoteStore, RenderError,
    Renderer, StaticAuth,
};
pub use store::{FingerprintRefresh, LinkStore, StoreError, write_private_file};
pub use sync_engine::{
    BatchReport, FileState, FileStatus, LinkOptions, LinkOutcome, PushOptions, PushOutcome,
    SyncEngine, UnlinkOptions, UnlinkOutcome,
};
