//! CLI command implementations.
//!
//! - `apply`: create or update every record in a records file
//! - `observe`: refresh and print what the engine holds for each record
//! - `delete`: remove every record's engine objects, newest kinds first
//! - `ping`: check the engine answers

use clap::{Args, Parser, Subcommand, ValueEnum};
use dockform_reconcile::Outcome;
use serde::Serialize;
use std::path::PathBuf;

pub mod apply;
pub mod delete;
pub mod observe;
pub mod ping;

/// dockform - declarative containers, volumes, networks and compose stacks
#[derive(Parser)]
#[command(name = "dockform")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file
    #[arg(long, global = true, env = "DOCKFORM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Engine address, e.g. unix:///var/run/docker.sock or tcp://host:2375
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// State file
    #[arg(long, global = true)]
    pub state: Option<PathBuf>,

    /// Values file for config map and secret references
    #[arg(long, global = true)]
    pub values: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "table")]
    pub format: OutputFormat,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Create or update records
    Apply(RecordsArgs),

    /// Observe records without changing anything
    Observe(RecordsArgs),

    /// Remove records' engine objects
    Delete(RecordsArgs),

    /// Check the engine is reachable
    Ping,
}

/// Which records to work on.
#[derive(Args, Debug, Clone)]
pub struct RecordsArgs {
    /// Records file (multi-document YAML)
    #[arg(short, long)]
    pub file: PathBuf,

    /// Only these record names
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,
}

/// Result of one record operation.
#[derive(Debug, Serialize)]
pub struct RecordResult {
    /// Record kind.
    pub kind: &'static str,
    /// Record name.
    pub name: String,
    /// What happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<&'static str>,
    /// Why it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Lowercase word for an outcome.
#[must_use]
pub const fn outcome_label(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Created => "created",
        Outcome::Updated => "updated",
        Outcome::UpToDate => "unchanged",
        Outcome::Deleted => "deleted",
        Outcome::Absent => "absent",
    }
}

/// Prints per-record results.
///
/// # Errors
///
/// Returns an error if JSON encoding fails.
pub fn print_results(format: OutputFormat, results: &[RecordResult]) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(results)?),
        OutputFormat::Table => {
            for result in results {
                let status = match (&result.error, result.outcome) {
                    (Some(error), _) => format!("failed: {error}"),
                    (None, Some(outcome)) => outcome.to_string(),
                    (None, None) => "-".to_string(),
                };
                println!("{}/{}: {status}", result.kind, result.name);
            }
        }
    }
    Ok(())
}

/// Turns a failure count into the command's result.
///
/// # Errors
///
/// Returns an error naming how many records failed.
pub fn summarize(failed: usize, total: usize) -> anyhow::Result<()> {
    if failed > 0 {
        anyhow::bail!("{failed} of {total} records failed");
    }
    Ok(())
}
