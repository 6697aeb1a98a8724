//! `dockform ping`.

use crate::config::AppConfig;
use anyhow::{Context, Result};
use dockform_engine::{HttpEngine, SystemOps};
use tokio_util::sync::CancellationToken;

/// Checks the engine answers and prints its version.
///
/// # Errors
///
/// Returns an error if the engine is unreachable or the run is cancelled.
pub async fn execute(config: &AppConfig, cancel: &CancellationToken) -> Result<()> {
    let engine = HttpEngine::new(&config.engine).context("invalid engine configuration")?;

    let version = tokio::select! {
        () = cancel.cancelled() => anyhow::bail!("cancelled"),
        result = async {
            engine.ping().await?;
            engine.version().await
        } => result.with_context(|| format!("engine at {} did not answer", config.engine.host))?,
    };

    println!("Engine: {}", config.engine.host);
    println!("Version: {}", version.version);
    println!("API version: {}", version.api_version);
    println!("OS/Arch: {}/{}", version.os, version.arch);
    Ok(())
}
