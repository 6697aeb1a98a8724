//! dockform - declarative container engine reconciler.

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod records;
mod session;
mod state;
mod values;

use commands::{Cli, Commands};
use config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        anyhow::ensure!(path.exists(), "config file {} not found", path.display());
    }
    let mut config = AppConfig::load(cli.config.as_deref()).context("invalid configuration")?;
    if let Some(host) = cli.host.clone() {
        config.engine.host = host;
    }
    if let Some(state) = cli.state.clone() {
        config.state_file = state;
    }
    if let Some(values) = cli.values.clone() {
        config.values_file = Some(values);
    }

    let filter = config.log_filter(cli.debug);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Ctrl-C aborts the operation in flight; state written so far is kept.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            on_signal.cancel();
        }
    });

    match cli.command {
        Commands::Apply(args) => commands::apply::execute(args, &config, cli.format, &cancel).await,
        Commands::Observe(args) => {
            commands::observe::execute(args, &config, cli.format, &cancel).await
        }
        Commands::Delete(args) => {
            commands::delete::execute(args, &config, cli.format, &cancel).await
        }
        Commands::Ping => commands::ping::execute(&config, &cancel).await,
    }
}
