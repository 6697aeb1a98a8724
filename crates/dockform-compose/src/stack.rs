//! Stack lifecycle.

use crate::decompose::{PROJECT_LABEL, StackPlan, decompose, project_filter};
use crate::error::{ComposeError, Result as ComposeResult};
use crate::interpolate::parse_env_file;
use crate::model::ComposeFile;
use crate::overrides::{apply_overrides, inject_environment};
use async_trait::async_trait;
use chrono::Utc;
use dockform_engine::{ContainerOps, Engine, ListContainersOptions, NetworkOps, VolumeOps};
use dockform_reconcile::network::network_request;
use dockform_reconcile::observe::{container_observation, parse_timestamp};
use dockform_reconcile::resolve::{resolve_document, resolve_env};
use dockform_reconcile::volume::volume_request;
use dockform_reconcile::{
    ContainerController, ExternalClient, ExternalObservation, ReconcileError, Result, ValueSource,
    Verdict,
};
use dockform_resource::Condition;
use dockform_resource::container::{EnvVar, PortSpec};
use dockform_resource::stack::{
    COMPOSE_STACK_KIND, ComposeStack, ComposeStackObservation, ComposeStackParameters,
    ServiceStatus, StackChildren, StackNetworkStatus, StackVolumeStatus,
};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Service state reported for a container that does not exist.
pub const PENDING: &str = "pending";

/// Reconciles compose stack records.
///
/// The marker is the project name. Containers are created one service at a
/// time in dependency order, after the project's networks and volumes. A
/// failure stops creation where it is; everything created so far stays
/// tracked under `status.atProvider.children` so a later delete removes it.
#[derive(Clone)]
pub struct StackController {
    containers: ContainerController,
    container_ops: Arc<dyn ContainerOps>,
    networks: Arc<dyn NetworkOps>,
    volumes: Arc<dyn VolumeOps>,
    values: Arc<dyn ValueSource>,
}

impl StackController {
    /// Creates a controller over a full engine.
    #[must_use]
    pub fn new<E: Engine + 'static>(engine: Arc<E>, values: Arc<dyn ValueSource>) -> Self {
        Self::from_parts(engine.clone(), engine.clone(), engine, values)
    }

    /// Creates a controller from per-kind capabilities.
    #[must_use]
    pub fn from_parts(
        containers: Arc<dyn ContainerOps>,
        networks: Arc<dyn NetworkOps>,
        volumes: Arc<dyn VolumeOps>,
        values: Arc<dyn ValueSource>,
    ) -> Self {
        Self {
            containers: ContainerController::new(containers.clone(), values.clone()),
            container_ops: containers,
            networks,
            volumes,
            values,
        }
    }

    /// Resolves, parses and decomposes a stack record's document.
    ///
    /// Env files are read first and only feed interpolation. The record's
    /// `environment` feeds interpolation too, overriding env files, and is
    /// added to every service. Service overrides are applied last.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError::Resolve`] when the document, an env file or
    /// an environment reference cannot be resolved, and a parse, validation
    /// or cycle error for a bad document.
    pub async fn plan(&self, record: &ComposeStack) -> ComposeResult<StackPlan> {
        let params = record.params();
        let namespace = record.metadata.namespace_or_default();
        let project = params.project_name_or(record.name());

        let document = self.document(params, namespace).await?;

        let mut variables = BTreeMap::new();
        for reference in &params.env_files {
            let contents = resolve_document(reference, namespace, self.values.as_ref()).await?;
            variables.extend(parse_env_file(&contents));
        }
        let environment = resolve_env(&params.environment, namespace, self.values.as_ref()).await?;
        variables.extend(literal_variables(&environment));

        let file = ComposeFile::parse(&document, &variables)?;
        let mut plan = decompose(project, &file, params.working_dir.as_deref().map(Path::new))?;
        inject_environment(&mut plan, &environment);
        apply_overrides(&mut plan, &params.service_overrides)?;
        debug!(
            project,
            services = plan.services.len(),
            networks = plan.networks.len(),
            volumes = plan.volumes.len(),
            "planned stack"
        );
        Ok(plan)
    }

    async fn document(
        &self,
        params: &ComposeStackParameters,
        namespace: &str,
    ) -> ComposeResult<String> {
        if let Some(inline) = params.compose.as_deref().filter(|c| !c.trim().is_empty()) {
            return Ok(inline.to_string());
        }
        let reference = params
            .compose_ref
            .as_ref()
            .ok_or_else(|| ComposeError::validation("neither compose nor composeRef is set"))?;
        Ok(resolve_document(reference, namespace, self.values.as_ref()).await?)
    }

    async fn observe_networks(
        &self,
        plan: &StackPlan,
        children: &mut StackChildren,
    ) -> Result<Vec<StackNetworkStatus>> {
        let mut statuses = Vec::new();
        for network in &plan.networks {
            match self.networks.inspect_network(&network.name).await {
                Ok(observed) => {
                    if !network.external && has_project(observed.labels.as_ref(), &plan.project) {
                        children.track_network(&network.name);
                    }
                    statuses.push(StackNetworkStatus {
                        name: network.name.clone(),
                        id: Some(observed.id),
                        driver: Some(observed.driver),
                        created_at: parse_timestamp(&observed.created),
                    });
                }
                Err(e) if e.is_not_found() => {
                    debug!(network = %network.name, "project network not found");
                }
                Err(e) => return Err(ReconcileError::engine("inspect network", &network.name, e)),
            }
        }
        Ok(statuses)
    }

    async fn observe_volumes(
        &self,
        plan: &StackPlan,
        children: &mut StackChildren,
    ) -> Result<Vec<StackVolumeStatus>> {
        let mut statuses = Vec::new();
        for volume in &plan.volumes {
            match self.volumes.inspect_volume(&volume.name).await {
                Ok(observed) => {
                    if !volume.external && has_project(observed.labels.as_ref(), &plan.project) {
                        children.track_volume(&volume.name);
                    }
                    statuses.push(StackVolumeStatus {
                        name: volume.name.clone(),
                        driver: Some(observed.driver),
                        mountpoint: Some(observed.mountpoint).filter(|m| !m.is_empty()),
                        created_at: parse_timestamp(&observed.created_at),
                    });
                }
                Err(e) if e.is_not_found() => {
                    debug!(volume = %volume.name, "project volume not found");
                }
                Err(e) => return Err(ReconcileError::engine("inspect volume", &volume.name, e)),
            }
        }
        Ok(statuses)
    }

    async fn create_children(
        &self,
        plan: &StackPlan,
        namespace: &str,
        children: &mut StackChildren,
    ) -> Result<()> {
        for network in plan.networks.iter().filter(|n| !n.external) {
            match self.networks.inspect_network(&network.name).await {
                Ok(_) => debug!(network = %network.name, "network exists, skipping"),
                Err(e) if e.is_not_found() => {
                    let request = network_request(&network.name, &network.params);
                    let response = self
                        .networks
                        .create_network(&request)
                        .await
                        .map_err(|e| ReconcileError::engine("create network", &network.name, e))?;
                    if let Some(warning) = response.warning.filter(|w| !w.is_empty()) {
                        warn!(network = %network.name, "engine warning: {}", warning);
                    }
                    children.track_network(&network.name);
                    info!(network = %network.name, "network created");
                }
                Err(e) => return Err(ReconcileError::engine("inspect network", &network.name, e)),
            }
        }

        for volume in plan.volumes.iter().filter(|v| !v.external) {
            match self.volumes.inspect_volume(&volume.name).await {
                Ok(_) => debug!(volume = %volume.name, "volume exists, skipping"),
                Err(e) if e.is_not_found() => {
                    let request = volume_request(&volume.name, &volume.params);
                    self.volumes
                        .create_volume(&request)
                        .await
                        .map_err(|e| ReconcileError::engine("create volume", &volume.name, e))?;
                    children.track_volume(&volume.name);
                    info!(volume = %volume.name, "volume created");
                }
                Err(e) => return Err(ReconcileError::engine("inspect volume", &volume.name, e)),
            }
        }

        for service in &plan.services {
            let existing = self
                .containers
                .inspect_container(&service.container_name)
                .await?;
            if let Some(existing) = existing {
                debug!(
                    service = %service.name,
                    container_id = %existing.id,
                    "container exists, skipping"
                );
                children.track_container(existing.id);
                continue;
            }
            let id = self
                .containers
                .create_container(Some(&service.container_name), &service.params, namespace)
                .await?;
            children.track_container(&id);
            if service.params.starts_on_create() {
                self.containers.start_container(&id).await?;
            }
            info!(service = %service.name, container_id = %id, "service container created");
        }
        Ok(())
    }

    async fn delete_tracked(&self, children: &mut StackChildren) -> Result<()> {
        while let Some(id) = children.containers.last().cloned() {
            self.containers.destroy_container(&id).await?;
            children.containers.pop();
        }
        while let Some(name) = children.networks.last().cloned() {
            match self.networks.remove_network(&name).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => debug!(network = %name, "network already gone"),
                Err(e) => return Err(ReconcileError::engine("remove network", &name, e)),
            }
            children.networks.pop();
        }
        while let Some(name) = children.volumes.last().cloned() {
            match self.volumes.remove_volume(&name, true).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => debug!(volume = %name, "volume already gone"),
                Err(e) => return Err(ReconcileError::engine("remove volume", &name, e)),
            }
            children.volumes.pop();
        }
        Ok(())
    }

    async fn delete_labelled(&self, project: &str) -> Result<()> {
        let filter = project_filter(project);

        let containers = self
            .container_ops
            .list_containers(&ListContainersOptions::with_label(PROJECT_LABEL, project))
            .await
            .map_err(|e| ReconcileError::engine("list containers", project, e))?;
        for container in containers {
            self.containers.destroy_container(&container.id).await?;
        }

        let networks = self
            .networks
            .list_networks(std::slice::from_ref(&filter))
            .await
            .map_err(|e| ReconcileError::engine("list networks", project, e))?;
        for network in networks {
            match self.networks.remove_network(&network.id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(ReconcileError::engine("remove network", &network.name, e)),
            }
        }

        let volumes = self
            .volumes
            .list_volumes(std::slice::from_ref(&filter))
            .await
            .map_err(|e| ReconcileError::engine("list volumes", project, e))?;
        for volume in volumes {
            match self.volumes.remove_volume(&volume.name, true).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(ReconcileError::engine("remove volume", &volume.name, e)),
            }
        }
        Ok(())
    }
}

fn has_project(labels: Option<&HashMap<String, String>>, project: &str) -> bool {
    labels
        .and_then(|l| l.get(PROJECT_LABEL))
        .is_some_and(|p| p == project)
}

fn children_of(record: &ComposeStack) -> StackChildren {
    record
        .status
        .at_provider
        .as_ref()
        .map(|o| o.children.clone())
        .unwrap_or_default()
}

fn store_children(record: &mut ComposeStack, project: &str, children: StackChildren) {
    let observation = record.status.at_provider.get_or_insert_with(Default::default);
    observation.project_name = project.to_string();
    observation.children = children;
}

#[async_trait]
impl ExternalClient for StackController {
    type Params = ComposeStackParameters;
    type Observation = ComposeStackObservation;

    const KIND: &'static str = COMPOSE_STACK_KIND;

    async fn observe(&self, record: &mut ComposeStack) -> Result<ExternalObservation> {
        if record.external_name().is_none() {
            return Ok(ExternalObservation::absent());
        }
        let plan = self.plan(record).await?;
        let mut children = children_of(record);

        let mut services = BTreeMap::new();
        let mut missing = Vec::new();
        let mut stopped = Vec::new();
        for service in &plan.services {
            let status = match self.containers.inspect_container(&service.container_name).await? {
                Some(inspect) => {
                    if has_project(inspect.config.labels.as_ref(), &plan.project) {
                        children.track_container(&inspect.id);
                    }
                    if !inspect.state.running {
                        stopped.push(service.name.clone());
                    }
                    let observed = container_observation(&inspect);
                    ServiceStatus {
                        name: service.name.clone(),
                        container_id: Some(observed.id),
                        state: observed.state.status,
                        image: Some(observed.image.name),
                        ports: observed
                            .ports
                            .into_iter()
                            .map(|p| PortSpec {
                                container_port: p.private_port,
                                host_port: p.public_port,
                                host_ip: p.ip,
                                protocol: Some(p.protocol.to_uppercase()),
                            })
                            .collect(),
                        health: observed.state.health,
                        created_at: observed.created,
                        started_at: observed.started,
                    }
                }
                None => {
                    missing.push(service.name.clone());
                    ServiceStatus {
                        name: service.name.clone(),
                        state: PENDING.to_string(),
                        ..Default::default()
                    }
                }
            };
            services.insert(service.name.clone(), status);
        }

        let networks = self.observe_networks(&plan, &mut children).await?;
        let volumes = self.observe_volumes(&plan, &mut children).await?;

        record.status.at_provider = Some(ComposeStackObservation {
            project_name: plan.project.clone(),
            services,
            networks,
            volumes,
            parsed_at: Some(Utc::now()),
            compose_version: plan.compose_version.clone(),
            children,
        });

        if !missing.is_empty() {
            debug!(project = %plan.project, missing = ?missing, "stack incomplete");
            record.status.set_condition(
                Condition::unavailable()
                    .with_message(format!("services missing: {}", missing.join(", "))),
            );
            return Ok(ExternalObservation::absent());
        }
        if !stopped.is_empty() {
            record.status.set_condition(
                Condition::creating()
                    .with_message(format!("services not running: {}", stopped.join(", "))),
            );
            return Ok(ExternalObservation::exists(&Verdict::Drifted(format!(
                "services not running: {}",
                stopped.join(", ")
            ))));
        }
        record.status.set_condition(Condition::available());
        Ok(ExternalObservation::exists(&Verdict::UpToDate))
    }

    async fn create(&self, record: &mut ComposeStack) -> Result<()> {
        let plan = self.plan(record).await?;
        let namespace = record.metadata.namespace_or_default().to_string();
        record.metadata.set_external_name(&plan.project);

        let mut children = children_of(record);
        let result = self.create_children(&plan, &namespace, &mut children).await;
        store_children(record, &plan.project, children);
        if result.is_ok() {
            info!(project = %plan.project, services = plan.services.len(), "stack created");
        }
        result
    }

    async fn update(&self, record: &mut ComposeStack) -> Result<()> {
        debug!(name = %record.name(), "stack update waits for services to start");
        record.status.set_condition(Condition::creating());
        Ok(())
    }

    async fn delete(&self, record: &mut ComposeStack) -> Result<()> {
        let Some(project) = record.external_name().map(str::to_string) else {
            return Ok(());
        };
        let mut children = children_of(record);
        if children.is_empty() {
            debug!(%project, "no tracked children, deleting by project label");
            return self.delete_labelled(&project).await;
        }
        let result = self.delete_tracked(&mut children).await;
        store_children(record, &project, children);
        result
    }
}

/// Stack-level environment entries with a value, in resolution order.
#[must_use]
pub fn literal_variables(env: &[EnvVar]) -> BTreeMap<String, String> {
    env.iter()
        .filter_map(|var| Some((var.name.clone(), var.value.clone()?)))
        .collect()
}
