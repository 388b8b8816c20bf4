mod cli;
mod commands;
mod config;
mod mock_data;
mod output;
mod state;
mod storage;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{cli::Cli, config::Config, state::AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON output on stdout stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "routebook=info,routebook_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env().with_page_size(cli.page_size);
    tracing::debug!(?config, "Loaded configuration");

    let state = AppState::new(&config).await?;

    let output = commands::execute(cli.command, &state.client, cli.format).await?;
    println!("{output}");

    Ok(())
}
