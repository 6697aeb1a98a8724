//! `dockform apply`.

use super::{OutputFormat, RecordResult, RecordsArgs, outcome_label, print_results, summarize};
use crate::config::AppConfig;
use crate::session::Session;
use anyhow::{Result, bail};
use dockform_reconcile::ReconcileError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Creates or updates every selected record.
///
/// # Errors
///
/// Returns an error if the session cannot be opened, the run is cancelled,
/// or any record fails.
pub async fn execute(
    args: RecordsArgs,
    config: &AppConfig,
    format: OutputFormat,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut session = Session::open(config, &args.file, &args.only)?;
    let results = apply_all(&mut session, cancel).await?;
    print_results(format, &results)?;
    let failed = results.iter().filter(|r| r.error.is_some()).count();
    summarize(failed, results.len())
}

/// Applies records in creation order, saving state after each one.
///
/// A failing record does not stop the run.
///
/// # Errors
///
/// Returns an error on cancellation or when the state file cannot be written.
pub async fn apply_all(
    session: &mut Session,
    cancel: &CancellationToken,
) -> Result<Vec<RecordResult>> {
    let mut results = Vec::with_capacity(session.records.len());

    for record in &mut session.records {
        let result = session.controllers.apply(record, cancel).await;
        session.state.capture(record);
        session.state.save()?;

        let (outcome, error) = match result {
            Ok(outcome) => {
                info!(record = %record.key(), outcome = outcome_label(outcome), "applied");
                (Some(outcome_label(outcome)), None)
            }
            Err(ReconcileError::Cancelled) => bail!("cancelled while applying {}", record.key()),
            Err(e) => {
                warn!(record = %record.key(), error = %e, "apply failed");
                (None, Some(e.to_string()))
            }
        };
        results.push(RecordResult {
            kind: record.kind(),
            name: record.name().to_string(),
            outcome,
            error,
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockform_engine::FakeEngine;
    use dockform_reconcile::MapValueSource;
    use std::path::Path;
    use std::sync::Arc;

    const RECORDS: &str = r"
kind: Network
metadata: {name: backend}
spec: {forProvider: {}}
---
kind: Container
metadata: {name: web}
spec:
  forProvider:
    image: nginx
    networks: [{name: backend}]
";

    fn session(engine: &Arc<FakeEngine>, dir: &Path) -> Session {
        let file = dir.join("records.yaml");
        std::fs::write(&file, RECORDS).unwrap();
        Session::with_engine(
            engine.clone(),
            Arc::new(MapValueSource::new()),
            &dir.join("state.json"),
            &file,
            &[],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_apply_twice() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine::new());

        let mut first = session(&engine, dir.path());
        let results = apply_all(&mut first, &CancellationToken::new()).await.unwrap();
        let outcomes: Vec<_> = results.iter().map(|r| r.outcome).collect();
        assert_eq!(outcomes, vec![Some("created"), Some("created")]);
        assert_eq!(engine.network_names(), vec!["backend"]);

        let mut second = session(&engine, dir.path());
        let results = apply_all(&mut second, &CancellationToken::new()).await.unwrap();
        assert!(results.iter().all(|r| r.outcome == Some("unchanged")));
        assert_eq!(engine.calls_to("create_container").len(), 1);
    }

    #[tokio::test]
    async fn test_failure_continues() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine::new());
        engine.fail_on("create_network");

        let mut session = session(&engine, dir.path());
        let results = apply_all(&mut session, &CancellationToken::new()).await.unwrap();
        assert!(results[0].error.is_some());
        assert_eq!(results[1].outcome, Some("created"));
        assert_eq!(session.state.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut session = session(&engine, dir.path());
        let err = apply_all(&mut session, &cancel).await.unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        assert!(engine.calls().is_empty());
    }
}
