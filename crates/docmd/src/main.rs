//! docmd: sync markdown files to Google Docs.
//!
//! Write in your favorite editor, push to Google Docs for sharing.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use docmd_core::{LinkStore, SyncEngine, SyncError};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use docmd::commands::Command;
use docmd::{Config, DriveClient, MarkdownRenderer, StdinPrompt, TokenFile, output};

#[derive(Parser, Debug)]
#[command(name = "docmd")]
#[command(version, about = "Sync markdown files to Google Docs")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,
}

fn init_logging(verbose: bool, watch: bool) {
    // Respects RUST_LOG; one-shot commands stay quiet unless something degrades
    let default_filter = if verbose {
        "debug"
    } else if watch {
        "info"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_engine(config: &Config) -> Result<SyncEngine> {
    let store = LinkStore::open(config.links_path()).context("failed to load config")?;
    let tokens = Arc::new(TokenFile::new(config.token_path()));
    Ok(SyncEngine::new(
        Arc::new(store),
        Arc::new(DriveClient::new(Arc::clone(&tokens))),
        Arc::new(MarkdownRenderer),
        tokens,
        Arc::new(StdinPrompt::new()),
    ))
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env()?;
    debug!("Using config directory {}", config.home().display());
    let engine = build_engine(&config)?;
    cli.command.run(&engine).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.command.is_watch());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(SyncError::NotAuthenticated) = e.downcast_ref::<SyncError>() {
                output::error("Not authenticated!");
                println!("Authorize docmd with Google and store the token in the docmd config directory.");
            } else {
                output::error(&format!("{e:#}"));
            }
            ExitCode::FAILURE
        }
    }
}
