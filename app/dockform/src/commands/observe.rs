//! `dockform observe`.

use super::{OutputFormat, RecordsArgs, summarize};
use crate::config::AppConfig;
use crate::records::Record;
use crate::session::Session;
use anyhow::{Result, bail};
use dockform_reconcile::{ExternalObservation, ReconcileError};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// One observed record.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedRecord {
    /// The record with refreshed status.
    pub record: Record,
    /// The engine object exists.
    pub exists: bool,
    /// Its configuration matches the record.
    pub up_to_date: bool,
    /// Why it does not match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift: Option<String>,
    /// Why observing failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Observes every selected record and prints what the engine holds.
///
/// # Errors
///
/// Returns an error if the session cannot be opened, the run is cancelled,
/// or any record cannot be observed.
pub async fn execute(
    args: RecordsArgs,
    config: &AppConfig,
    format: OutputFormat,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut session = Session::open(config, &args.file, &args.only)?;
    let observed = observe_all(&mut session, cancel).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&observed)?),
        OutputFormat::Table => print_table(&observed),
    }
    let failed = observed.iter().filter(|o| o.error.is_some()).count();
    summarize(failed, observed.len())
}

/// Observes records, keeping stack children current in the state file.
///
/// # Errors
///
/// Returns an error on cancellation or when the state file cannot be written.
pub async fn observe_all(
    session: &mut Session,
    cancel: &CancellationToken,
) -> Result<Vec<ObservedRecord>> {
    let mut observed = Vec::with_capacity(session.records.len());

    for mut record in std::mem::take(&mut session.records) {
        let (observation, error) = match session.controllers.observe(&mut record, cancel).await {
            Ok(observation) => (observation, None),
            Err(ReconcileError::Cancelled) => bail!("cancelled while observing {}", record.key()),
            Err(e) => {
                warn!(record = %record.key(), error = %e, "observe failed");
                (ExternalObservation::absent(), Some(e.to_string()))
            }
        };
        if error.is_none() {
            session.state.capture(&record);
        }
        observed.push(ObservedRecord {
            exists: observation.resource_exists,
            up_to_date: observation.resource_up_to_date,
            drift: observation.drift,
            error,
            record,
        });
    }
    session.state.save()?;
    Ok(observed)
}

fn print_table(observed: &[ObservedRecord]) {
    println!(
        "{:<14} {:<24} {:<8} {:<10} {:<12} DETAIL",
        "KIND", "NAME", "EXISTS", "UP-TO-DATE", "READY"
    );
    for o in observed {
        let ready = o
            .record
            .ready()
            .map_or_else(|| "-".to_string(), |c| c.reason.to_string());
        let detail = o
            .error
            .as_deref()
            .or(o.drift.as_deref())
            .or_else(|| o.record.ready().and_then(|c| c.message.as_deref()))
            .unwrap_or("");
        println!(
            "{:<14} {:<24} {:<8} {:<10} {:<12} {detail}",
            o.record.kind(),
            o.record.name(),
            yes_no(o.exists),
            yes_no(o.up_to_date),
            ready,
        );
    }
}

const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::apply::apply_all;
    use dockform_engine::FakeEngine;
    use dockform_reconcile::MapValueSource;
    use dockform_resource::Reason;
    use std::path::Path;
    use std::sync::Arc;

    const RECORDS: &str = r"
kind: Container
metadata: {name: web}
spec:
  forProvider:
    name: web
    image: nginx
---
kind: ComposeStack
metadata: {name: shop}
spec:
  forProvider:
    compose: |
      services:
        api: {image: shop/api}
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
    async fn test_observe_before_and_after_apply() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine::new());
        let cancel = CancellationToken::new();

        let observed = observe_all(&mut session(&engine, dir.path()), &cancel)
            .await
            .unwrap();
        assert!(observed.iter().all(|o| !o.exists));

        apply_all(&mut session(&engine, dir.path()), &cancel).await.unwrap();
        engine.set_status("web", "exited");

        let observed = observe_all(&mut session(&engine, dir.path()), &cancel)
            .await
            .unwrap();
        let web = &observed[0];
        assert!(web.exists);
        assert_eq!(web.record.ready().unwrap().reason, Reason::Unavailable);

        let shop = &observed[1];
        assert!(shop.exists && shop.up_to_date);
        let Record::Stack(stack) = &shop.record else {
            panic!("expected a stack");
        };
        let services = &stack.status.at_provider.as_ref().unwrap().services;
        assert_eq!(services["api"].state, "running");
    }
}
