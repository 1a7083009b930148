use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gleaner::app::AppContext;
use gleaner::cli::{commands, Cli, Commands};
use gleaner::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let ctx = AppContext::new(cli.db, config)?;

    match cli.command {
        Commands::Collect {
            url,
            target,
            out,
            headed,
        } => {
            commands::collect(&ctx, &url, target, out, headed).await?;
        }
        Commands::Export { partial, out } => {
            commands::export(&ctx, partial, out)?;
        }
        Commands::Status { limit } => {
            commands::status(&ctx, limit)?;
        }
    }

    Ok(())
}
