//! Volume lifecycle.

use crate::diff::volume_verdict;
use crate::error::{EngineResultExt, ReconcileError, Result};
use crate::lifecycle::{ExternalClient, ExternalObservation};
use crate::observe::volume_observation;
use async_trait::async_trait;
use dockform_engine::{VolumeCreateRequest, VolumeOps};
use dockform_resource::Condition;
use dockform_resource::volume::{VOLUME_KIND, Volume, VolumeObservation, VolumeParameters};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Reconciles volume records.
///
/// The marker is the volume name. Volumes have no mutable settings, so
/// drift is reported but update does nothing.
#[derive(Clone)]
pub struct VolumeController {
    engine: Arc<dyn VolumeOps>,
}

impl VolumeController {
    /// Creates a controller.
    #[must_use]
    pub fn new(engine: Arc<dyn VolumeOps>) -> Self {
        Self { engine }
    }
}

/// Builds the engine create request for a volume called `name`.
#[must_use]
pub fn volume_request(name: &str, params: &VolumeParameters) -> VolumeCreateRequest {
    VolumeCreateRequest {
        name: Some(name.to_string()),
        driver: Some(params.driver_or_default().to_string()),
        driver_opts: non_empty(&params.driver_opts),
        labels: non_empty(&params.labels),
    }
}

pub(crate) fn non_empty(map: &BTreeMap<String, String>) -> Option<HashMap<String, String>> {
    (!map.is_empty()).then(|| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

#[async_trait]
impl ExternalClient for VolumeController {
    type Params = VolumeParameters;
    type Observation = VolumeObservation;

    const KIND: &'static str = VOLUME_KIND;

    async fn observe(&self, record: &mut Volume) -> Result<ExternalObservation> {
        let Some(name) = record.external_name().map(str::to_string) else {
            return Ok(ExternalObservation::absent());
        };

        let volume = match self.engine.inspect_volume(&name).await {
            Ok(volume) => volume,
            Err(e) if e.is_not_found() => {
                debug!(volume = %name, "volume not found");
                record.status.at_provider = None;
                return Ok(ExternalObservation::absent());
            }
            Err(e) => return Err(ReconcileError::engine("inspect volume", &name, e)),
        };

        record.status.at_provider = Some(volume_observation(&volume));
        record.status.set_condition(Condition::available());
        Ok(ExternalObservation::exists(&volume_verdict(
            record.params(),
            &volume,
        )))
    }

    async fn create(&self, record: &mut Volume) -> Result<()> {
        let name = record
            .params()
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| record.name().to_string());
        let request = volume_request(&name, record.params());

        let volume = self
            .engine
            .create_volume(&request)
            .await
            .during("create volume", &name)?;
        record.metadata.set_external_name(&volume.name);
        info!(volume = %volume.name, driver = %volume.driver, "volume created");
        Ok(())
    }

    async fn update(&self, record: &mut Volume) -> Result<()> {
        debug!(name = %record.name(), "volumes cannot be updated in place, ignoring drift");
        Ok(())
    }

    async fn delete(&self, record: &mut Volume) -> Result<()> {
        let Some(name) = record.external_name().map(str::to_string) else {
            return Ok(());
        };
        match self.engine.remove_volume(&name, true).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(ReconcileError::engine("remove volume", &name, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockform_engine::FakeEngine;
    use dockform_resource::ObjectMeta;

    #[test]
    fn test_volume_request_defaults() {
        let request = volume_request("data", &VolumeParameters::default());
        assert_eq!(request.name.as_deref(), Some("data"));
        assert_eq!(request.driver.as_deref(), Some("local"));
        assert!(request.labels.is_none());
        assert!(request.driver_opts.is_none());
    }

    #[tokio::test]
    async fn test_create_uses_record_name_when_unnamed() {
        let engine = Arc::new(FakeEngine::new());
        let controller = VolumeController::new(engine.clone());
        let mut record = Volume::new(ObjectMeta::named("pgdata"), VolumeParameters::default());

        controller.create(&mut record).await.unwrap();
        assert_eq!(record.external_name(), Some("pgdata"));
        assert_eq!(engine.volume_names(), vec!["pgdata"]);
    }

    #[tokio::test]
    async fn test_delete_missing_volume_succeeds() {
        let engine = Arc::new(FakeEngine::new());
        let controller = VolumeController::new(engine.clone());
        let mut record = Volume::new(ObjectMeta::named("gone"), VolumeParameters::default());
        record.metadata.set_external_name("gone");

        controller.delete(&mut record).await.unwrap();
        assert_eq!(engine.calls_to("remove_volume"), vec!["gone"]);
    }
}
