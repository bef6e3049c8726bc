use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use docmd_core::{SyncEngine, UnlinkOptions, UnlinkOutcome};

use super::file_name;
use crate::output;

/// By default the Google Doc is kept; pass --delete to remove it too.
#[derive(Args, Debug)]
pub struct UnlinkArgs {
    /// Linked markdown file
    pub file: PathBuf,

    /// Also delete the Google Doc
    #[arg(short, long)]
    pub delete: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

pub async fn run(engine: &SyncEngine, args: UnlinkArgs) -> Result<()> {
    let options = UnlinkOptions {
        delete_remote: args.delete,
        assume_yes: args.yes,
    };

    match engine.unlink(&args.file, options).await? {
        UnlinkOutcome::NotLinked => output::warning("File is not linked."),
        UnlinkOutcome::Cancelled => println!("Cancelled."),
        UnlinkOutcome::Unlinked {
            remote_deleted,
            delete_error,
            ..
        } => {
            if remote_deleted {
                output::success("Google Doc deleted.");
            }
            if let Some(e) = delete_error {
                output::warning(&format!("Failed to delete Google Doc: {e}"));
                println!("The link was still removed.");
            }
            output::success(&format!("Unlinked {}", file_name(&args.file)));
        }
    }
    Ok(())
}
