//! docmd: keep local markdown files pushed to Google Docs.
//!
//! Library layer over the CLI so integration tests can reach the watcher
//! and the concrete collaborators.

pub mod auth;
pub mod commands;
pub mod config;
pub mod drive;
pub mod output;
pub mod prompt;
pub mod render;
pub mod watcher;

pub use auth::TokenFile;
pub use config::{Config, ConfigError};
pub use drive::DriveClient;
pub use prompt::StdinPrompt;
pub use render::MarkdownRenderer;
pub use watcher::{ChangeHandler, ChangeWatcher, Debouncer, WatchError, WatchSession, watch};
