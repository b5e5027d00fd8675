//! Newswatch CLI — article deduplication and relevance filtering.
//!
//! Ingests candidate articles from upstream sources, keeps only novel and
//! important ones, and prepares the backlog for human triage.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
