//! The observe / create / update / delete state machine.
//!
//! Every kind implements [`ExternalClient`]; the driver functions here decide
//! which of its operations to call and keep the record's conditions and
//! external-name marker in step. Each call runs to completion on the calling
//! task and aborts with [`ReconcileError::Cancelled`] as soon as the token
//! fires.

use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use dockform_resource::{Condition, Resource};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What Observe found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalObservation {
    /// The engine object exists.
    pub resource_exists: bool,
    /// Its configuration matches the record.
    pub resource_up_to_date: bool,
    /// Why it does not match.
    pub drift: Option<String>,
}

impl ExternalObservation {
    /// Nothing exists on the engine side.
    #[must_use]
    pub const fn absent() -> Self {
        Self {
            resource_exists: false,
            resource_up_to_date: false,
            drift: None,
        }
    }

    /// Exists, with the given diff verdict.
    #[must_use]
    pub fn exists(verdict: &crate::diff::Verdict) -> Self {
        Self {
            resource_exists: true,
            resource_up_to_date: verdict.is_up_to_date(),
            drift: verdict.reason().map(str::to_string),
        }
    }
}

/// Per-kind lifecycle operations.
#[async_trait]
pub trait ExternalClient: Send + Sync {
    /// Desired parameters.
    type Params: Send + Sync;
    /// Observed state.
    type Observation: Send + Sync;

    /// Kind name used in logs and errors.
    const KIND: &'static str;

    /// Inspects the engine object named by the record's marker, refreshing
    /// the record's observation and readiness.
    async fn observe(
        &self,
        record: &mut Resource<Self::Params, Self::Observation>,
    ) -> Result<ExternalObservation>;

    /// Creates the engine object and stores its identity on the record.
    async fn create(&self, record: &mut Resource<Self::Params, Self::Observation>) -> Result<()>;

    /// Brings a drifted object back in line.
    async fn update(&self, record: &mut Resource<Self::Params, Self::Observation>) -> Result<()>;

    /// Removes the engine object. A missing object is success.
    async fn delete(&self, record: &mut Resource<Self::Params, Self::Observation>) -> Result<()>;
}

/// What [`apply`] or [`remove`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Object was created.
    Created,
    /// Object was drifted and updated.
    Updated,
    /// Nothing to do.
    UpToDate,
    /// Object was removed.
    Deleted,
    /// Record had never been created; nothing to remove.
    Absent,
}

/// Runs `fut` unless `cancel` fires first.
///
/// # Errors
///
/// Returns [`ReconcileError::Cancelled`] if the token fires, otherwise the
/// future's own result.
pub async fn with_cancel<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ReconcileError::Cancelled),
        result = fut => result,
    }
}

/// Observes a record without changing anything on the engine side.
///
/// # Errors
///
/// Returns any non-not-found engine error, or [`ReconcileError::Cancelled`].
pub async fn observe<C: ExternalClient>(
    client: &C,
    record: &mut Resource<C::Params, C::Observation>,
    cancel: &CancellationToken,
) -> Result<ExternalObservation> {
    with_cancel(cancel, client.observe(record)).await
}

/// Converges a record: create it if missing, update it if drifted.
///
/// The `Synced` condition reflects the result.
///
/// # Errors
///
/// Returns the first failing operation's error. For kinds that cannot
/// update in place this is [`ReconcileError::UpdateNotSupported`].
pub async fn apply<C: ExternalClient>(
    client: &C,
    record: &mut Resource<C::Params, C::Observation>,
    cancel: &CancellationToken,
) -> Result<Outcome> {
    let result = with_cancel(cancel, converge(client, record)).await;
    set_synced(record, result.as_ref().err());
    result
}

async fn converge<C: ExternalClient>(
    client: &C,
    record: &mut Resource<C::Params, C::Observation>,
) -> Result<Outcome> {
    let observation = client.observe(record).await?;

    if !observation.resource_exists {
        debug!(kind = C::KIND, name = %record.name(), "not found, creating");
        record.status.set_condition(Condition::creating());
        client.create(record).await?;
        info!(
            kind = C::KIND,
            name = %record.name(),
            external_name = record.external_name().unwrap_or_default(),
            "created"
        );
        return Ok(Outcome::Created);
    }

    if observation.resource_up_to_date {
        return Ok(Outcome::UpToDate);
    }

    info!(
        kind = C::KIND,
        name = %record.name(),
        drift = observation.drift.as_deref().unwrap_or_default(),
        "drift detected, updating"
    );
    client.update(record).await?;
    Ok(Outcome::Updated)
}

/// Removes a record's engine object and clears its marker.
///
/// # Errors
///
/// Returns the delete error, or [`ReconcileError::Cancelled`]. The marker
/// is kept on failure so a retry addresses the same object.
pub async fn remove<C: ExternalClient>(
    client: &C,
    record: &mut Resource<C::Params, C::Observation>,
    cancel: &CancellationToken,
) -> Result<Outcome> {
    if record.external_name().is_none() {
        debug!(kind = C::KIND, name = %record.name(), "never created, nothing to delete");
        return Ok(Outcome::Absent);
    }

    record.status.set_condition(Condition::deleting());
    let result = with_cancel(cancel, client.delete(record)).await;
    set_synced(record, result.as_ref().err());
    result?;

    info!(kind = C::KIND, name = %record.name(), "deleted");
    record.metadata.clear_external_name();
    record.status.at_provider = None;
    Ok(Outcome::Deleted)
}

fn set_synced<P, O>(record: &mut Resource<P, O>, error: Option<&ReconcileError>) {
    let condition = match error {
        None => Condition::reconcile_success(),
        Some(err) => Condition::reconcile_error(err.to_string()),
    };
    record.status.set_condition(condition);
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockform_resource::{ConditionType, ObjectMeta, Reason};
    use std::sync::Mutex;

    /// Records calls and behaves according to its flags.
    #[derive(Default)]
    struct Scripted {
        exists: bool,
        up_to_date: bool,
        fail_update: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl Scripted {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExternalClient for Scripted {
        type Params = ();
        type Observation = ();
        const KIND: &'static str = "Thing";

        async fn observe(&self, _record: &mut Resource<(), ()>) -> Result<ExternalObservation> {
            self.calls.lock().unwrap().push("observe");
            Ok(ExternalObservation {
                resource_exists: self.exists,
                resource_up_to_date: self.up_to_date,
                drift: None,
            })
        }

        async fn create(&self, record: &mut Resource<(), ()>) -> Result<()> {
            self.calls.lock().unwrap().push("create");
            record.metadata.set_external_name("thing-1");
            Ok(())
        }

        async fn update(&self, _record: &mut Resource<(), ()>) -> Result<()> {
            self.calls.lock().unwrap().push("update");
            if self.fail_update {
                return Err(ReconcileError::UpdateNotSupported("thing"));
            }
            Ok(())
        }

        async fn delete(&self, _record: &mut Resource<(), ()>) -> Result<()> {
            self.calls.lock().unwrap().push("delete");
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn record() -> Resource<(), ()> {
        Resource::new(ObjectMeta::named("thing"), ())
    }

    #[tokio::test]
    async fn test_apply_creates_when_absent() {
        let client = Scripted::default();
        let mut record = record();
        let outcome = apply(&client, &mut record, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Created);
        assert_eq!(client.calls(), vec!["observe", "create"]);
        assert_eq!(record.external_name(), Some("thing-1"));
        assert!(record.status.condition(ConditionType::Synced).unwrap().is_true());
    }

    #[tokio::test]
    async fn test_apply_noop_when_up_to_date() {
        let client = Scripted {
            exists: true,
            up_to_date: true,
            ..Default::default()
        };
        let outcome = apply(&client, &mut record(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::UpToDate);
        assert_eq!(client.calls(), vec!["observe"]);
    }

    #[tokio::test]
    async fn test_apply_update_failure_sets_synced_false() {
        let client = Scripted {
            exists: true,
            fail_update: true,
            ..Default::default()
        };
        let mut record = record();
        let err = apply(&client, &mut record, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_update_not_supported());
        let synced = record.status.condition(ConditionType::Synced).unwrap();
        assert_eq!(synced.reason, Reason::ReconcileError);
        assert!(synced.message.as_deref().unwrap().contains("not implemented"));
    }

    #[tokio::test]
    async fn test_remove_without_marker_is_absent() {
        let client = Scripted::default();
        let outcome = remove(&client, &mut record(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Absent);
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_delete() {
        let client = Scripted::default();
        let mut record = record();
        record.metadata.set_external_name("thing-1");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = remove(&client, &mut record, &cancel).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Cancelled));
        assert_eq!(record.external_name(), Some("thing-1"));
    }
}
