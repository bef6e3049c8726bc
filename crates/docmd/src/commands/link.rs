use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use docmd_core::{LinkOptions, LinkOutcome, SyncEngine};

use crate::output;

#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Markdown file to link
    pub file: PathBuf,

    /// Custom title for the Google Doc (default: file name)
    #[arg(short, long)]
    pub title: Option<String>,

    /// Google Drive folder ID to create the doc in
    #[arg(short, long)]
    pub folder: Option<String>,
}

pub async fn run(engine: &SyncEngine, args: LinkArgs) -> Result<()> {
    println!("Creating Google Doc from {}...", args.file.display());
    let options = LinkOptions {
        title: args.title,
        folder: args.folder,
    };

    match engine.link(&args.file, options).await? {
        LinkOutcome::AlreadyLinked { link, .. } => {
            output::warning("File is already linked!");
            println!("  Doc URL: {}", link.document_url);
            println!();
            println!("Use 'docmd push' to sync changes, or 'docmd unlink' first to create a new doc.");
        }
        LinkOutcome::Created { link, .. } => {
            println!();
            output::success(&format!("Created: \"{}\"", link.title));
            println!("  URL: {}", link.document_url);
            println!();
            println!("File linked! Use 'docmd push' to sync future changes.");
        }
    }
    Ok(())
}
