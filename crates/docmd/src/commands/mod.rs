//! One module per CLI subcommand. Each takes its parsed arguments as an
//! explicit value and runs against a shared [`SyncEngine`].

pub mod link;
pub mod push;
pub mod status;
pub mod unlink;
pub mod watch;

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use clap::Subcommand;
use docmd_core::SyncEngine;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Link a markdown file to a new Google Doc
    Link(link::LinkArgs),
    /// Push local changes to Google Docs
    Push(push::PushArgs),
    /// Show sync status of linked files
    Status,
    /// Remove the link between a file and its Google Doc
    Unlink(unlink::UnlinkArgs),
    /// Watch linked files and push on change
    Watch(watch::WatchArgs),
}

impl Command {
    pub fn is_watch(&self) -> bool {
        matches!(self, Command::Watch(_))
    }

    pub async fn run(self, engine: &SyncEngine) -> Result<()> {
        match self {
            Command::Link(args) => link::run(engine, args).await,
            Command::Push(args) => push::run(engine, args).await,
            Command::Status => status::run(engine).await,
            Command::Unlink(args) => unlink::run(engine, args).await,
            Command::Watch(args) => watch::run(engine, args).await,
        }
    }
}

/// Final path component, for short messages.
pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// `./relative` for paths under `cwd`, otherwise the absolute path.
pub(crate) fn display_path(path: &Path, cwd: Option<&Path>) -> String {
    match cwd.and_then(|cwd| path.strip_prefix(cwd).ok()) {
        Some(rel) if !rel.as_os_str().is_empty() => format!("./{}", rel.display()),
        _ => path.display().to_string(),
    }
}

pub(crate) fn local_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}
