//! Container lifecycle.

use crate::builder::build_create_request;
use crate::diff::container_verdict;
use crate::error::{EngineResultExt, ReconcileError, Result};
use crate::lifecycle::{ExternalClient, ExternalObservation};
use crate::observe::{container_observation, readiness};
use crate::resolve::{ValueSource, resolve_env};
use async_trait::async_trait;
use dockform_engine::{
    ContainerCreateRequest, ContainerInspectResponse, ContainerOps, RemoveContainerOptions,
};
use dockform_resource::container::{
    CONTAINER_KIND, Container, ContainerObservation, ContainerParameters,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Grace period for a container to stop before it is killed on delete.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Reconciles container records.
///
/// Containers are immutable once created: drift is reported by Observe but
/// [`ExternalClient::update`] refuses with
/// [`ReconcileError::UpdateNotSupported`].
#[derive(Clone)]
pub struct ContainerController {
    engine: Arc<dyn ContainerOps>,
    values: Arc<dyn ValueSource>,
}

impl ContainerController {
    /// Creates a controller.
    #[must_use]
    pub fn new(engine: Arc<dyn ContainerOps>, values: Arc<dyn ValueSource>) -> Self {
        Self { engine, values }
    }

    /// Resolves referenced environment values and builds the create request.
    ///
    /// # Errors
    ///
    /// Returns a resolve or build error; nothing is sent to the engine.
    pub async fn prepare(
        &self,
        params: &ContainerParameters,
        namespace: &str,
    ) -> Result<ContainerCreateRequest> {
        let environment = resolve_env(&params.environment, namespace, self.values.as_ref()).await?;
        let resolved = ContainerParameters {
            environment,
            ..params.clone()
        };
        Ok(build_create_request(&resolved)?)
    }

    /// Creates a container without starting it, returning its ID.
    ///
    /// # Errors
    ///
    /// Returns a resolve, build or engine error.
    pub async fn create_container(
        &self,
        name: Option<&str>,
        params: &ContainerParameters,
        namespace: &str,
    ) -> Result<String> {
        let request = self.prepare(params, namespace).await?;
        let subject = name.unwrap_or(&params.image);
        debug!(name = subject, image = %params.image, "creating container");
        let response = self
            .engine
            .create_container(name, &request)
            .await
            .during("create container", subject)?;
        for warning in response.warnings.iter().flatten() {
            warn!(container_id = %response.id, "engine warning: {}", warning);
        }
        Ok(response.id)
    }

    /// Starts a container.
    ///
    /// # Errors
    ///
    /// Returns the engine error.
    pub async fn start_container(&self, id: &str) -> Result<()> {
        debug!(container_id = %id, "starting container");
        self.engine
            .start_container(id)
            .await
            .during("start container", id)
    }

    /// Inspects a container, mapping not-found to `None`.
    ///
    /// # Errors
    ///
    /// Returns any other engine error.
    pub async fn inspect_container(&self, id: &str) -> Result<Option<ContainerInspectResponse>> {
        match self.engine.inspect_container(id).await {
            Ok(inspect) => Ok(Some(inspect)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(ReconcileError::engine("inspect container", id, e)),
        }
    }

    /// Stops a container gracefully, then force-removes it.
    ///
    /// A container that is already gone counts as removed.
    ///
    /// # Errors
    ///
    /// Returns a stop or removal error other than not-found.
    pub async fn destroy_container(&self, id: &str) -> Result<()> {
        debug!(container_id = %id, timeout = ?STOP_TIMEOUT, "stopping container");
        match self.engine.stop_container(id, Some(STOP_TIMEOUT)).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(container_id = %id, "container already gone");
                return Ok(());
            }
            Err(e) => return Err(ReconcileError::engine("stop container", id, e)),
        }

        let options = RemoveContainerOptions {
            force: true,
            volumes: false,
        };
        match self.engine.remove_container(id, options).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(ReconcileError::engine("remove container", id, e)),
        }
    }
}

#[async_trait]
impl ExternalClient for ContainerController {
    type Params = ContainerParameters;
    type Observation = ContainerObservation;

    const KIND: &'static str = CONTAINER_KIND;

    async fn observe(&self, record: &mut Container) -> Result<ExternalObservation> {
        let Some(id) = record.external_name().map(str::to_string) else {
            return Ok(ExternalObservation::absent());
        };

        let Some(inspect) = self.inspect_container(&id).await? else {
            debug!(container_id = %id, "container not found");
            record.status.at_provider = None;
            return Ok(ExternalObservation::absent());
        };

        record.status.at_provider = Some(container_observation(&inspect));
        record.status.set_condition(readiness(&inspect.state));

        let verdict = container_verdict(record.params(), &inspect);
        debug!(container_id = %id, %verdict, "observed container");
        Ok(ExternalObservation::exists(&verdict))
    }

    async fn create(&self, record: &mut Container) -> Result<()> {
        let params = record.params().clone();
        let namespace = record.metadata.namespace_or_default().to_string();

        let id = self.create_container(params.name.as_deref(), &params, &namespace).await?;
        record.metadata.set_external_name(&id);
        info!(container_id = %id, name = %record.name(), "container created");

        if params.starts_on_create() {
            self.start_container(&id).await?;
        }
        Ok(())
    }

    async fn update(&self, _record: &mut Container) -> Result<()> {
        Err(ReconcileError::UpdateNotSupported("container"))
    }

    async fn delete(&self, record: &mut Container) -> Result<()> {
        let Some(id) = record.external_name().map(str::to_string) else {
            return Ok(());
        };
        self.destroy_container(&id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::MapValueSource;
    use dockform_engine::FakeEngine;
    use dockform_resource::ObjectMeta;

    fn controller(engine: &Arc<FakeEngine>) -> ContainerController {
        ContainerController::new(engine.clone(), Arc::new(MapValueSource::new()))
    }

    #[tokio::test]
    async fn test_create_stores_marker_and_starts() {
        let engine = Arc::new(FakeEngine::new());
        let controller = controller(&engine);
        let mut record = Container::new(
            ObjectMeta::named("web"),
            ContainerParameters::for_image("nginx:latest"),
        );

        ExternalClient::create(&controller, &mut record).await.unwrap();
        let id = record.external_name().unwrap().to_string();
        assert!(engine.container(&id).unwrap().state.running);
    }

    #[tokio::test]
    async fn test_start_on_create_false_leaves_created() {
        let engine = Arc::new(FakeEngine::new());
        let controller = controller(&engine);
        let mut params = ContainerParameters::for_image("nginx:latest");
        params.start_on_create = Some(false);
        let mut record = Container::new(ObjectMeta::named("web"), params);

        ExternalClient::create(&controller, &mut record).await.unwrap();
        let id = record.external_name().unwrap();
        assert_eq!(engine.container(id).unwrap().state.status, "created");
        assert!(engine.calls_to("start_container").is_empty());
    }

    #[tokio::test]
    async fn test_destroy_missing_container_succeeds() {
        let engine = Arc::new(FakeEngine::new());
        controller(&engine).destroy_container("gone").await.unwrap();
        assert!(engine.calls_to("remove_container").is_empty());
    }
}
