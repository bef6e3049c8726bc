use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use docmd_core::{PushOptions, PushOutcome, SyncEngine};
use futures::FutureExt;
use tracing::info;

use super::file_name;
use crate::output::{self, timestamp};
use crate::watcher::{ChangeHandler, ChangeWatcher};

/// Changes are debounced per file so rapid saves produce a single push.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Linked markdown file to watch
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub file: Option<PathBuf>,

    /// Watch all linked files that exist now
    #[arg(short, long)]
    pub all: bool,

    /// Debounce delay in milliseconds
    #[arg(short, long, default_value_t = 500)]
    pub debounce: u64,

    /// Skip the conflict check on every push
    #[arg(short, long)]
    pub force: bool,
}

pub async fn run(engine: &SyncEngine, args: WatchArgs) -> Result<()> {
    engine.ensure_authenticated()?;

    let files = if args.all {
        let files = engine.existing_linked_paths();
        if files.is_empty() {
            output::warning("No linked files found to watch.");
            println!("Use 'docmd link <file.md>' to link a file first.");
            return Ok(());
        }
        files
    } else {
        let Some(file) = args.file.as_deref() else {
            anyhow::bail!("no file specified; pass a file or --all");
        };
        vec![engine.linked_key(file)?]
    };

    if let [only] = files.as_slice() {
        println!("Watching {} for changes...", file_name(only));
    } else {
        println!("Watching {} files for changes...", files.len());
        for file in &files {
            println!("  - {}", file_name(file));
        }
    }
    println!("Press Ctrl+C to stop.");
    println!();

    let options = PushOptions {
        force: args.force,
        only_if_changed: true,
    };
    let session = ChangeWatcher::new(&files, Duration::from_millis(args.debounce))?
        .start(sync_handler(engine.clone(), options))?;

    tokio::select! {
        result = session.run() => result.context("watch stopped"),
        _ = shutdown_signal() => {
            println!();
            println!("Stopping watch...");
            info!("Shutdown signal received");
            Ok(())
        }
    }
}

fn sync_handler(engine: SyncEngine, options: PushOptions) -> ChangeHandler {
    Arc::new(move |path: PathBuf| {
        let engine = engine.clone();
        async move { sync_file(&engine, &path, options).await }.boxed()
    })
}

async fn sync_file(engine: &SyncEngine, path: &Path, options: PushOptions) -> Result<()> {
    let name = file_name(path);
    println!("[{}] Change detected in {}", timestamp(), name);

    match engine.push(path, options).await? {
        PushOutcome::Pushed { warnings, .. } => {
            for warning in &warnings {
                println!("[{}] WARN: {}", timestamp(), warning);
            }
            println!("[{}] Synced {} successfully", timestamp(), name);
        }
        PushOutcome::Skipped { .. } => {
            println!("[{}] Kept remote version of {}, skipped push", timestamp(), name);
        }
        PushOutcome::Unchanged { .. } => {
            println!("[{}] No content changes in {}", timestamp(), name);
        }
    }
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
