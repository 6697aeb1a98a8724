//! Everything one command run needs: records, state and controllers.

use crate::config::AppConfig;
use crate::records::{self, Record};
use crate::state::State;
use crate::values;
use anyhow::{Context, Result};
use dockform_compose::StackController;
use dockform_engine::{Engine, HttpEngine};
use dockform_reconcile::{
    ContainerController, ExternalObservation, NetworkController, Outcome, ValueSource,
    VolumeController, lifecycle,
};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One controller per kind.
pub struct Controllers {
    containers: ContainerController,
    volumes: VolumeController,
    networks: NetworkController,
    stacks: StackController,
}

impl Controllers {
    /// Creates controllers sharing one engine and value source.
    #[must_use]
    pub fn new<E: Engine + 'static>(engine: Arc<E>, values: Arc<dyn ValueSource>) -> Self {
        Self {
            containers: ContainerController::new(engine.clone(), values.clone()),
            volumes: VolumeController::new(engine.clone()),
            networks: NetworkController::new(engine.clone()),
            stacks: StackController::new(engine, values),
        }
    }

    /// Converges a record.
    ///
    /// # Errors
    ///
    /// Returns the failing operation's error.
    pub async fn apply(
        &self,
        record: &mut Record,
        cancel: &CancellationToken,
    ) -> dockform_reconcile::Result<Outcome> {
        match record {
            Record::Container(r) => lifecycle::apply(&self.containers, r, cancel).await,
            Record::Volume(r) => lifecycle::apply(&self.volumes, r, cancel).await,
            Record::Network(r) => lifecycle::apply(&self.networks, r, cancel).await,
            Record::Stack(r) => lifecycle::apply(&self.stacks, r, cancel).await,
        }
    }

    /// Observes a record without changing the engine.
    ///
    /// # Errors
    ///
    /// Returns any engine error other than not-found.
    pub async fn observe(
        &self,
        record: &mut Record,
        cancel: &CancellationToken,
    ) -> dockform_reconcile::Result<ExternalObservation> {
        match record {
            Record::Container(r) => lifecycle::observe(&self.containers, r, cancel).await,
            Record::Volume(r) => lifecycle::observe(&self.volumes, r, cancel).await,
            Record::Network(r) => lifecycle::observe(&self.networks, r, cancel).await,
            Record::Stack(r) => lifecycle::observe(&self.stacks, r, cancel).await,
        }
    }

    /// Removes a record's engine objects.
    ///
    /// # Errors
    ///
    /// Returns the failing operation's error.
    pub async fn remove(
        &self,
        record: &mut Record,
        cancel: &CancellationToken,
    ) -> dockform_reconcile::Result<Outcome> {
        match record {
            Record::Container(r) => lifecycle::remove(&self.containers, r, cancel).await,
            Record::Volume(r) => lifecycle::remove(&self.volumes, r, cancel).await,
            Record::Network(r) => lifecycle::remove(&self.networks, r, cancel).await,
            Record::Stack(r) => lifecycle::remove(&self.stacks, r, cancel).await,
        }
    }
}

/// A loaded records file with its state restored.
pub struct Session {
    /// Records in creation order, narrowed by `--only`.
    pub records: Vec<Record>,
    /// Persisted state.
    pub state: State,
    /// Controllers.
    pub controllers: Controllers,
}

impl Session {
    /// Opens a session against the configured engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the records, state or values file is unreadable,
    /// or the engine address is invalid.
    pub fn open(config: &AppConfig, file: &Path, only: &[String]) -> Result<Self> {
        let engine = HttpEngine::new(&config.engine).context("invalid engine configuration")?;
        let values = values::load(config.values_file.as_deref())?;
        Self::with_engine(Arc::new(engine), Arc::new(values), &config.state_file, file, only)
    }

    /// Opens a session against an explicit engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the records or state file is unreadable.
    pub fn with_engine<E: Engine + 'static>(
        engine: Arc<E>,
        values: Arc<dyn ValueSource>,
        state_file: &Path,
        file: &Path,
        only: &[String],
    ) -> Result<Self> {
        let mut records = records::load(file)?;
        if !only.is_empty() {
            records.retain(|r| only.iter().any(|name| name == r.name()));
        }
        let state = State::load(state_file)?;
        for record in &mut records {
            state.restore(record);
        }
        debug!(records = records.len(), tracked = state.len(), "session opened");
        Ok(Self {
            records,
            state,
            controllers: Controllers::new(engine, values),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockform_engine::FakeEngine;
    use dockform_reconcile::MapValueSource;

    const RECORDS: &str = r"
kind: Container
metadata: {name: api}
spec:
  forProvider:
    image: shop/api:2
    environment:
      - name: DB_PASSWORD
        valueFrom:
          secretKeyRef: {name: db, key: password}
    volumes:
      - name: data
        mountPath: /data
        source:
          volume: {volumeName: data}
---
kind: Volume
metadata: {name: data}
spec: {forProvider: {}}
---
kind: ComposeStack
metadata: {name: shop}
spec:
  forProvider:
    compose: |
      services:
        cache: {image: redis:7}
";

    fn open(engine: &Arc<FakeEngine>, dir: &Path) -> Session {
        let file = dir.join("records.yaml");
        std::fs::write(&file, RECORDS).unwrap();
        let values = MapValueSource::new().with_secret("default", "db", [("password", "hunter2")]);
        Session::with_engine(
            engine.clone(),
            Arc::new(values),
            &dir.join("state.json"),
            &file,
            &[],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_apply_persist_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine::new());
        let cancel = CancellationToken::new();

        let mut session = open(&engine, dir.path());
        for record in &mut session.records {
            let outcome = session.controllers.apply(record, &cancel).await.unwrap();
            assert_eq!(outcome, Outcome::Created);
            session.state.capture(record);
        }
        session.state.save().unwrap();

        // Without forProvider.name the engine picks the name; the marker holds the ID.
        let record = session.records.iter().find(|r| r.name() == "api").unwrap();
        let api = engine.container(record.metadata().external_name().unwrap()).unwrap();
        assert!(api.state.running);
        assert!(api.config.env.unwrap().contains(&"DB_PASSWORD=hunter2".to_string()));
        assert!(engine.volume_names().contains(&"data".to_string()));
        assert!(engine.container("shop_cache_1").is_some());

        // A second run picks the markers up from the state file.
        let mut session = open(&engine, dir.path());
        assert_eq!(session.state.len(), 3);
        for record in &mut session.records {
            let observation = session.controllers.observe(record, &cancel).await.unwrap();
            assert!(observation.resource_exists, "{}", record.key());
        }

        for record in session.records.iter_mut().rev() {
            let outcome = session.controllers.remove(record, &cancel).await.unwrap();
            assert_eq!(outcome, Outcome::Deleted);
            session.state.capture(record);
        }
        assert!(session.state.len() == 0);
        assert!(engine.container_names().is_empty());
        assert!(engine.volume_names().is_empty());
    }

    #[tokio::test]
    async fn test_only_filters_records() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("records.yaml");
        std::fs::write(&file, RECORDS).unwrap();
        let session = Session::with_engine(
            Arc::new(FakeEngine::new()),
            Arc::new(MapValueSource::new()),
            &dir.path().join("state.json"),
            &file,
            &["data".to_string()],
        )
        .unwrap();
        assert_eq!(session.records.len(), 1);
        assert_eq!(session.records[0].key(), "Volume/default/data");
    }
}
