use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use docmd_core::{BatchReport, PushOptions, PushOutcome, SyncEngine, SyncError};

use super::{file_name, local_time};
use crate::output;

#[derive(Args, Debug)]
pub struct PushArgs {
    /// Linked markdown file to push
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub file: Option<PathBuf>,

    /// Skip the conflict check and overwrite
    #[arg(short, long)]
    pub force: bool,

    /// Push all linked files
    #[arg(short, long)]
    pub all: bool,
}

pub async fn run(engine: &SyncEngine, args: PushArgs) -> Result<()> {
    let options = PushOptions {
        force: args.force,
        only_if_changed: false,
    };

    if args.all {
        engine.ensure_authenticated()?;
        if engine.store().snapshot().is_empty() {
            output::warning("No linked files found.");
            println!("Use 'docmd link <file.md>' to link a file first.");
            return Ok(());
        }
        let report = engine.push_all(options).await?;
        print_report(&report);
        return Ok(());
    }

    let Some(file) = args.file else {
        anyhow::bail!("no file specified; pass a file or --all");
    };

    println!("Syncing {} -> Google Docs...", file_name(&file));
    match engine.push(&file, options).await {
        Ok(PushOutcome::Pushed { link, warnings, .. }) => {
            for warning in &warnings {
                output::warning(&warning.to_string());
            }
            output::success("Pushed successfully!");
            if let Some(last_sync) = link.last_sync {
                println!("  Last synced: {}", local_time(last_sync));
            }
        }
        Ok(PushOutcome::Skipped { .. }) => println!("Skipping push."),
        Ok(PushOutcome::Unchanged { .. }) => println!("No local changes."),
        Err(SyncError::Aborted) => println!("Aborted."),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn print_report(report: &BatchReport) {
    for (path, warning) in &report.warnings {
        output::warning(&format!("{}: {}", file_name(path), warning));
    }
    for (path, error) in &report.failed {
        output::error(&format!("Failed to push {}: {}", file_name(path), error));
    }
    for path in &report.skipped {
        println!("Skipped {}", file_name(path));
    }
    if report.aborted {
        println!("Aborted.");
    }
    if !report.pushed.is_empty() {
        output::success(&format!("Pushed {} file(s)", report.pushed.len()));
    }
}
