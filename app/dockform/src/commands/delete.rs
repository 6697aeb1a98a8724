//! `dockform delete`.

use super::{OutputFormat, RecordResult, RecordsArgs, outcome_label, print_results, summarize};
use crate::config::AppConfig;
use crate::session::Session;
use anyhow::{Result, bail};
use dockform_reconcile::ReconcileError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Removes every selected record's engine objects.
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
    let results = delete_all(&mut session, cancel).await?;
    print_results(format, &results)?;
    let failed = results.iter().filter(|r| r.error.is_some()).count();
    summarize(failed, results.len())
}

/// Removes records in reverse creation order, saving state after each one.
///
/// # Errors
///
/// Returns an error on cancellation or when the state file cannot be written.
pub async fn delete_all(
    session: &mut Session,
    cancel: &CancellationToken,
) -> Result<Vec<RecordResult>> {
    let mut results = Vec::with_capacity(session.records.len());

    for record in session.records.iter_mut().rev() {
        let result = session.controllers.remove(record, cancel).await;
        session.state.capture(record);
        session.state.save()?;

        let (outcome, error) = match result {
            Ok(outcome) => {
                info!(record = %record.key(), outcome = outcome_label(outcome), "deleted");
                (Some(outcome_label(outcome)), None)
            }
            Err(ReconcileError::Cancelled) => bail!("cancelled while deleting {}", record.key()),
            Err(e) => {
                warn!(record = %record.key(), error = %e, "delete failed");
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
    use crate::commands::apply::apply_all;
    use dockform_engine::FakeEngine;
    use dockform_reconcile::MapValueSource;
    use std::path::Path;
    use std::sync::Arc;

    const RECORDS: &str = r"
kind: Volume
metadata: {name: cache}
spec: {forProvider: {}}
---
kind: Container
metadata: {name: worker}
spec:
  forProvider:
    image: busybox
    command: [sleep, infinity]
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
    async fn test_delete_reverse_order() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine::new());
        let cancel = CancellationToken::new();
        apply_all(&mut session(&engine, dir.path()), &cancel).await.unwrap();

        let mut current = session(&engine, dir.path());
        let results = delete_all(&mut current, &cancel).await.unwrap();
        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["worker", "cache"]);
        assert!(results.iter().all(|r| r.outcome == Some("deleted")));
        assert!(current.state.len() == 0);
        assert!(engine.container_names().is_empty());
        assert!(engine.volume_names().is_empty());

        // Nothing left to remove.
        let results = delete_all(&mut session(&engine, dir.path()), &cancel)
            .await
            .unwrap();
        assert!(results.iter().all(|r| r.outcome == Some("absent")));
    }
}
