use anyhow::Result;
use docmd_core::{FileState, SyncEngine};

use super::{display_path, local_time};
use crate::output;

pub async fn run(engine: &SyncEngine) -> Result<()> {
    let statuses = engine.status().await?;
    if statuses.is_empty() {
        output::warning("No linked files.");
        println!("Use 'docmd link <file.md>' to link a file to Google Docs.");
        return Ok(());
    }

    let cwd = std::env::current_dir().ok();
    println!("Linked files:");
    println!();
    for status in &statuses {
        println!("  {}", display_path(&status.path, cwd.as_deref()));
        println!("    -> {}", status.link.document_url);
        println!("    Status: {}", describe(&status.state));
        if let Some(last_sync) = status.link.last_sync {
            println!("    Last push: {}", local_time(last_sync));
        }
        println!();
    }
    println!("Total: {} file(s) linked", statuses.len());
    Ok(())
}

fn describe(state: &FileState) -> &'static str {
    match state {
        FileState::LocalMissing => "Local file missing",
        FileState::RemoteMissing => "Google Doc not found",
        FileState::LocalChanges => "Local changes pending",
        FileState::InSync => "In sync",
        FileState::Unknown(_) => "Unknown (could not check)",
    }
}
