//! Jupytutor CLI: inspect a notebook the way the tutoring assistant sees it.
//!
//! Resolves per-cell assistant config, lists and expands reference links,
//! and runs context retrieval from the terminal.

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
