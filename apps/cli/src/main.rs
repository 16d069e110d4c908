//! Water of Life CLI: ingest spirit listings into a searchable local catalog.
//!
//! Crawls the remote listing per category, normalizes records into canonical
//! entries, stores them in libSQL and serves full-text search over them.

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
