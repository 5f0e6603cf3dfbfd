//! ScrapeDesk CLI — two-phase product scraping from the terminal.
//!
//! Discovers product URLs from category pages via a remote scraping
//! service, then extracts product details and exports both to `.xlsx`.

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
