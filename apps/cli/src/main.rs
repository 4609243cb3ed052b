//! citeflow CLI: ask a chat backend a question and print the finished,
//! citation-linked answer.
//!
//! Streams the answer live while it is generated, then replaces it with the
//! post-processed document once the backend sends its source list.

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
