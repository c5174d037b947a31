//! Presswork CLI: bilingual publishing pipelines over a local work-item store.
//!
//! Turns news, keywords and search questions into validated EN/ZH Markdown
//! documents through an external text generator.

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
