//! Stagecraft CLI entry point.

use anyhow::Result;
use clap::Parser;

use stagecraft::cli::{Cli, Commands};
use stagecraft::infrastructure::config::ConfigLoader;
use stagecraft::infrastructure::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _guard = logging::init(&config.logging)?;

    match cli.command {
        Commands::Run(args) => stagecraft::cli::run(args, config, cli.json).await,
    }
}
