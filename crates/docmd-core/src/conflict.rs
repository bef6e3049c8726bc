//! Remote conflict detection and the user-facing resolution policy.
//!
//! Detection is a clock comparison: a conflict exists when the remote
//! document's modified time is strictly after the link's last sync. There is
//! no skew tolerance, so a remote clock running ahead of the local one shows up
//! as a conflict.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::io;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use tracing::debug;

use crate::link::Link;

/// Whether the remote changed after the last recorded sync.
///
/// Never-synced links cannot conflict.
pub fn has_remote_conflict(link: &Link, remote_modified: DateTime<Utc>) -> bool {
    match link.last_sync {
        Some(last_sync) => remote_modified > last_sync,
        None => false,
    }
}

/// Decision returned by [`resolve_conflict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Push anyway, replacing the remote content.
    OverwriteRemote,
    /// Skip this push; leave the file and link untouched.
    KeepRemote,
    /// Stop, including any remaining files in a batch.
    Abort,
}

impl Resolution {
    /// Parse a prompt answer. Anything but an explicit `L` or `R` aborts.
    pub fn from_choice(input: &str) -> Self {
        match input.trim().to_ascii_uppercase().as_str() {
            "L" => Resolution::OverwriteRemote,
            "R" => Resolution::KeepRemote,
            _ => Resolution::Abort,
        }
    }
}

/// What the user sees when a conflict is detected.
#[derive(Debug, Clone)]
pub struct ConflictReport {
    pub title: String,
    pub local_modified: Option<DateTime<Utc>>,
    pub remote_modified: DateTime<Utc>,
    pub remote_modified_by: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
}

impl ConflictReport {
    pub fn new(
        link: &Link,
        local_modified: Option<DateTime<Utc>>,
        remote_modified: DateTime<Utc>,
        remote_modified_by: Option<String>,
    ) -> Self {
        Self {
            title: link.title.clone(),
            local_modified,
            remote_modified,
            remote_modified_by,
            last_sync: link.last_sync,
        }
    }

    /// Render the conflict summary and the three-way question.
    pub fn message(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "WARN: Conflict detected in \"{}\"!", self.title);
        let _ = writeln!(out, "  The remote document has been modified since your last sync.");
        let _ = writeln!(out);
        let _ = writeln!(out, "  Local file:  modified {}", format_time(self.local_modified));
        let _ = write!(out, "  Remote doc:  modified {}", format_time(Some(self.remote_modified)));
        if let Some(by) = &self.remote_modified_by {
            let _ = write!(out, " (by {by})");
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "  Last sync:   {}", format_time(self.last_sync));
        let _ = writeln!(out);
        let _ = writeln!(out, "What would you like to do?");
        let _ = writeln!(out, "  [L] Push local (overwrite remote document)");
        let _ = writeln!(out, "  [R] Keep remote (skip this push)");
        let _ = writeln!(out, "  [A] Abort");
        let _ = writeln!(out);
        let _ = write!(out, "Choice [L/R/A]: ");
        out
    }
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    match time {
        Some(time) => time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "unknown".to_string(),
    }
}

/// Source of interactive answers.
///
/// Asking is async: waiting for a human must not hold a runtime thread. The
/// binary reads stdin; tests script the answers.
#[async_trait]
pub trait Prompt: Send + Sync {
    /// Show `message` and return the user's raw answer.
    async fn ask(&self, message: &str) -> io::Result<String>;
}

/// Ask how to resolve a conflict. Prompt failures resolve to [`Resolution::Abort`].
pub async fn resolve_conflict(report: &ConflictReport, prompt: &dyn Prompt) -> Resolution {
    let resolution = match prompt.ask(&report.message()).await {
        Ok(answer) => Resolution::from_choice(&answer),
        Err(e) => {
            debug!("Conflict prompt failed: {}", e);
            Resolution::Abort
        }
    };
    debug!("Conflict on \"{}\" resolved as {:?}", report.title, resolution);
    resolution
}

/// Prompt that replays pre-supplied answers, then reports end of input.
#[derive(Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Messages shown so far.
    pub fn asked(&self) -> Vec<String> {
        self.asked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Prompt for ScriptedPrompt {
    async fn ask(&self, message: &str) -> io::Result<String> {
        self.asked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
        self.answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted answer left"))
    }
}
