//! In-memory engine for tests.
//!
//! Mimics the engine behaviors the reconciler depends on: name conflicts,
//! not-found errors, running containers refusing non-forced removal, and
//! idempotent start/stop. Any operation can be made to fail on demand.

use crate::client::{
    ContainerOps, ListContainersOptions, NetworkOps, RemoveContainerOptions, SystemOps, VolumeOps,
};
use crate::error::{EngineError, ObjectKind, Result};
use crate::types::{
    ContainerConfig, ContainerCreateRequest, ContainerCreateResponse, ContainerInspectResponse,
    ContainerState, ContainerSummary, EndpointSettings, Health, HealthcheckResult, Ipam, Network,
    NetworkConnectRequest, NetworkContainer, NetworkCreateRequest, NetworkCreateResponse,
    NetworkDisconnectRequest, NetworkSettings, VersionResponse, Volume, VolumeCreateRequest,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

const FAKE_TIMESTAMP: &str = "2024-01-01T00:00:00Z";

#[derive(Default)]
struct State {
    containers: HashMap<String, ContainerInspectResponse>,
    volumes: HashMap<String, Volume>,
    networks: HashMap<String, Network>,
    failing: HashSet<&'static str>,
    calls: Vec<String>,
    next_ip: u8,
}

impl State {
    fn record(&mut self, op: &'static str, subject: &str) -> Result<()> {
        self.calls.push(format!("{op} {subject}"));
        if self.failing.contains(op) {
            return Err(EngineError::Api {
                status: 500,
                message: format!("injected failure: {op}"),
            });
        }
        Ok(())
    }

    fn container_id(&self, id_or_name: &str) -> Option<String> {
        if self.containers.contains_key(id_or_name) {
            return Some(id_or_name.to_string());
        }
        let wanted = format!("/{}", id_or_name.trim_start_matches('/'));
        self.containers
            .values()
            .find(|c| c.name == wanted)
            .map(|c| c.id.clone())
    }

    fn container_mut(&mut self, id_or_name: &str) -> Result<&mut ContainerInspectResponse> {
        let id = self
            .container_id(id_or_name)
            .ok_or_else(|| EngineError::not_found(ObjectKind::Container, id_or_name))?;
        self.containers
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found(ObjectKind::Container, id_or_name))
    }

    fn network_id(&self, id_or_name: &str) -> Option<String> {
        if self.networks.contains_key(id_or_name) {
            return Some(id_or_name.to_string());
        }
        self.networks
            .values()
            .find(|n| n.name == id_or_name)
            .map(|n| n.id.clone())
    }
}

fn matches_labels(labels: Option<&HashMap<String, String>>, filters: &[String]) -> bool {
    filters.iter().all(|filter| {
        let (key, value) = match filter.split_once('=') {
            Some((k, v)) => (k, Some(v)),
            None => (filter.as_str(), None),
        };
        labels
            .and_then(|l| l.get(key))
            .is_some_and(|actual| value.is_none_or(|v| v == actual))
    })
}

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// In-memory engine.
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<State>,
}

impl FakeEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Makes every later call to `op` (e.g. `"start_container"`) fail.
    pub fn fail_on(&self, op: &'static str) {
        self.lock().failing.insert(op);
    }

    /// Clears injected failures.
    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    /// Returns the calls made so far, each as `"<op> <subject>"`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Returns calls to one operation, as their subjects.
    #[must_use]
    pub fn calls_to(&self, op: &str) -> Vec<String> {
        let prefix = format!("{op} ");
        self.lock()
            .calls
            .iter()
            .filter_map(|c| c.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    /// Returns a snapshot of a container, looked up by ID or name.
    #[must_use]
    pub fn container(&self, id_or_name: &str) -> Option<ContainerInspectResponse> {
        let state = self.lock();
        state
            .container_id(id_or_name)
            .and_then(|id| state.containers.get(&id).cloned())
    }

    /// Returns the names of all containers, without the leading `/`.
    #[must_use]
    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .containers
            .values()
            .map(|c| c.name.trim_start_matches('/').to_string())
            .collect();
        names.sort();
        names
    }

    /// Returns the names of all volumes.
    #[must_use]
    pub fn volume_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().volumes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the names of all networks.
    #[must_use]
    pub fn network_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .networks
            .values()
            .map(|n| n.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Deletes a container without going through the API, as if someone
    /// removed it out of band.
    pub fn forget_container(&self, id_or_name: &str) {
        let mut state = self.lock();
        if let Some(id) = state.container_id(id_or_name) {
            state.containers.remove(&id);
        }
    }

    /// Overwrites a container's lifecycle status.
    pub fn set_status(&self, id_or_name: &str, status: &str) {
        let mut state = self.lock();
        if let Ok(container) = state.container_mut(id_or_name) {
            container.state.status = status.to_string();
            container.state.running = status == "running";
            container.state.paused = status == "paused";
            container.state.restarting = status == "restarting";
            container.state.dead = status == "dead";
        }
    }

    /// Marks a container as OOM-killed and exited.
    pub fn set_oom_killed(&self, id_or_name: &str) {
        let mut state = self.lock();
        if let Ok(container) = state.container_mut(id_or_name) {
            container.state.status = "exited".to_string();
            container.state.running = false;
            container.state.oom_killed = true;
            container.state.exit_code = 137;
        }
    }

    /// Overwrites a container's health status, appending a log entry.
    pub fn set_health(&self, id_or_name: &str, status: &str) {
        let mut state = self.lock();
        if let Ok(container) = state.container_mut(id_or_name) {
            let health = container.state.health.get_or_insert_with(Health::default);
            health.status = status.to_string();
            health.failing_streak = if status == "unhealthy" {
                health.failing_streak + 1
            } else {
                0
            };
            health.log.get_or_insert_with(Vec::new).push(HealthcheckResult {
                start: FAKE_TIMESTAMP.to_string(),
                end: FAKE_TIMESTAMP.to_string(),
                exit_code: i64::from(status == "unhealthy"),
                output: status.to_string(),
            });
        }
    }

    /// Overwrites an environment entry, as if the container had been
    /// recreated out of band.
    pub fn set_env(&self, id_or_name: &str, env: Vec<String>) {
        let mut state = self.lock();
        if let Ok(container) = state.container_mut(id_or_name) {
            container.config.env = Some(env);
        }
    }

    /// Sets volume usage data.
    pub fn set_volume_usage(&self, name: &str, size: i64, ref_count: i64) {
        if let Some(volume) = self.lock().volumes.get_mut(name) {
            volume.usage_data = Some(crate::types::VolumeUsageData { size, ref_count });
        }
    }
}

#[async_trait]
impl ContainerOps for FakeEngine {
    async fn create_container(
        &self,
        name: Option<&str>,
        request: &ContainerCreateRequest,
    ) -> Result<ContainerCreateResponse> {
        let mut state = self.lock();
        state.record("create_container", name.unwrap_or(&request.image))?;

        if let Some(name) = name {
            if state.container_id(name).is_some() {
                return Err(EngineError::Conflict(format!(
                    "container name \"/{name}\" is already in use"
                )));
            }
        }

        let id = new_id();
        let mut networks = HashMap::new();
        if let Some(config) = &request.networking_config {
            for (network, endpoint) in &config.endpoints_config {
                state.next_ip = state.next_ip.wrapping_add(1);
                let ip = endpoint
                    .ipam_config
                    .as_ref()
                    .and_then(|ipam| ipam.ipv4_address.clone())
                    .unwrap_or_else(|| format!("172.18.0.{}", state.next_ip));
                networks.insert(
                    network.clone(),
                    EndpointSettings {
                        network_id: state.network_id(network),
                        endpoint_id: Some(new_id()),
                        gateway: Some("172.18.0.1".to_string()),
                        ip_address: Some(ip),
                        ip_prefix_len: Some(16),
                        mac_address: Some("02:42:ac:12:00:02".to_string()),
                        aliases: endpoint.aliases.clone(),
                        ..Default::default()
                    },
                );
            }
        }

        let host_config = request.host_config.clone().unwrap_or_default();
        let mut ports: HashMap<String, Option<Vec<crate::types::PortBinding>>> = request
            .exposed_ports
            .as_ref()
            .map(|exposed| exposed.keys().map(|k| (k.clone(), None)).collect())
            .unwrap_or_default();
        if let Some(bindings) = &host_config.port_bindings {
            for (port, binding) in bindings {
                ports.insert(port.clone(), Some(binding.clone()));
            }
        }

        let inspect = ContainerInspectResponse {
            id: id.clone(),
            created: FAKE_TIMESTAMP.to_string(),
            state: ContainerState {
                status: "created".to_string(),
                ..Default::default()
            },
            image: format!("sha256:{}", new_id()),
            name: format!("/{}", name.unwrap_or(&id[..12])),
            restart_count: 0,
            config: ContainerConfig {
                hostname: request.hostname.clone().unwrap_or_else(|| id[..12].to_string()),
                user: request.user.clone().unwrap_or_default(),
                env: request.env.clone(),
                cmd: request.cmd.clone(),
                image: request.image.clone(),
                working_dir: request.working_dir.clone().unwrap_or_default(),
                labels: request.labels.clone(),
                healthcheck: request.healthcheck.clone(),
            },
            host_config,
            network_settings: NetworkSettings {
                ports: Some(ports),
                networks: Some(networks),
            },
            mounts: Vec::new(),
        };

        state.containers.insert(id.clone(), inspect);
        Ok(ContainerCreateResponse {
            id,
            warnings: None,
        })
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.record("start_container", id)?;
        let container = state.container_mut(id)?;
        container.state.status = "running".to_string();
        container.state.running = true;
        container.state.pid = 4242;
        container.state.started_at = FAKE_TIMESTAMP.to_string();
        if container.config.healthcheck.is_some() && container.state.health.is_none() {
            container.state.health = Some(Health {
                status: "starting".to_string(),
                ..Default::default()
            });
        }
        Ok(())
    }

    async fn stop_container(&self, id: &str, _timeout: Option<Duration>) -> Result<()> {
        let mut state = self.lock();
        state.record("stop_container", id)?;
        let container = state.container_mut(id)?;
        if container.state.running {
            container.state.status = "exited".to_string();
            container.state.running = false;
            container.state.pid = 0;
            container.state.finished_at = FAKE_TIMESTAMP.to_string();
        }
        Ok(())
    }

    async fn restart_container(&self, id: &str, _timeout: Option<Duration>) -> Result<()> {
        let mut state = self.lock();
        state.record("restart_container", id)?;
        let container = state.container_mut(id)?;
        container.state.status = "running".to_string();
        container.state.running = true;
        container.state.restarting = false;
        container.restart_count += 1;
        Ok(())
    }

    async fn remove_container(&self, id: &str, options: RemoveContainerOptions) -> Result<()> {
        let mut state = self.lock();
        state.record("remove_container", id)?;
        let key = state
            .container_id(id)
            .ok_or_else(|| EngineError::not_found(ObjectKind::Container, id))?;
        let running = state.containers.get(&key).is_some_and(|c| c.state.running);
        if running && !options.force {
            return Err(EngineError::Conflict(format!(
                "cannot remove container {id}: container is running"
            )));
        }
        state.containers.remove(&key);
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse> {
        let mut state = self.lock();
        state.record("inspect_container", id)?;
        state.container_mut(id).map(|c| c.clone())
    }

    async fn list_containers(
        &self,
        options: &ListContainersOptions,
    ) -> Result<Vec<ContainerSummary>> {
        let mut state = self.lock();
        state.record("list_containers", &options.labels.join(","))?;
        let mut listed: Vec<ContainerSummary> = state
            .containers
            .values()
            .filter(|c| options.all || c.state.running)
            .filter(|c| matches_labels(c.config.labels.as_ref(), &options.labels))
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                names: vec![c.name.clone()],
                image: c.config.image.clone(),
                image_id: c.image.clone(),
                state: c.state.status.clone(),
                status: c.state.status.clone(),
                labels: c.config.labels.clone().unwrap_or_default(),
                ..Default::default()
            })
            .collect();
        listed.sort_by(|a, b| a.names.cmp(&b.names));
        Ok(listed)
    }
}

#[async_trait]
impl VolumeOps for FakeEngine {
    async fn create_volume(&self, request: &VolumeCreateRequest) -> Result<Volume> {
        let mut state = self.lock();
        let name = request.name.clone().unwrap_or_else(new_id);
        state.record("create_volume", &name)?;
        if let Some(existing) = state.volumes.get(&name) {
            return Ok(existing.clone());
        }
        let volume = Volume {
            name: name.clone(),
            driver: request.driver.clone().unwrap_or_else(|| "local".to_string()),
            mountpoint: format!("/var/lib/docker/volumes/{name}/_data"),
            created_at: FAKE_TIMESTAMP.to_string(),
            labels: request.labels.clone(),
            scope: "local".to_string(),
            options: request.driver_opts.clone(),
            usage_data: None,
        };
        state.volumes.insert(name, volume.clone());
        Ok(volume)
    }

    async fn inspect_volume(&self, name: &str) -> Result<Volume> {
        let mut state = self.lock();
        state.record("inspect_volume", name)?;
        state
            .volumes
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::not_found(ObjectKind::Volume, name))
    }

    async fn list_volumes(&self, labels: &[String]) -> Result<Vec<Volume>> {
        let mut state = self.lock();
        state.record("list_volumes", &labels.join(","))?;
        let mut listed: Vec<Volume> = state
            .volumes
            .values()
            .filter(|v| matches_labels(v.labels.as_ref(), labels))
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listed)
    }

    async fn remove_volume(&self, name: &str, _force: bool) -> Result<()> {
        let mut state = self.lock();
        state.record("remove_volume", name)?;
        state
            .volumes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::not_found(ObjectKind::Volume, name))
    }
}

#[async_trait]
impl NetworkOps for FakeEngine {
    async fn create_network(
        &self,
        request: &NetworkCreateRequest,
    ) -> Result<NetworkCreateResponse> {
        let mut state = self.lock();
        state.record("create_network", &request.name)?;
        if state.network_id(&request.name).is_some() {
            return Err(EngineError::Conflict(format!(
                "network with name {} already exists",
                request.name
            )));
        }
        let id = new_id();
        let network = Network {
            name: request.name.clone(),
            id: id.clone(),
            created: FAKE_TIMESTAMP.to_string(),
            scope: "local".to_string(),
            driver: request.driver.clone().unwrap_or_else(|| "bridge".to_string()),
            enable_ipv6: request.enable_ipv6.unwrap_or(false),
            ipam: request.ipam.clone().unwrap_or_else(|| Ipam {
                driver: Some("default".to_string()),
                ..Default::default()
            }),
            internal: request.internal.unwrap_or(false),
            attachable: request.attachable.unwrap_or(false),
            ingress: request.ingress.unwrap_or(false),
            containers: Some(HashMap::new()),
            options: request.options.clone(),
            labels: request.labels.clone(),
        };
        state.networks.insert(id.clone(), network);
        Ok(NetworkCreateResponse { id, warning: None })
    }

    async fn inspect_network(&self, id: &str) -> Result<Network> {
        let mut state = self.lock();
        state.record("inspect_network", id)?;
        state
            .network_id(id)
            .and_then(|key| state.networks.get(&key).cloned())
            .ok_or_else(|| EngineError::not_found(ObjectKind::Network, id))
    }

    async fn list_networks(&self, labels: &[String]) -> Result<Vec<Network>> {
        let mut state = self.lock();
        state.record("list_networks", &labels.join(","))?;
        let mut listed: Vec<Network> = state
            .networks
            .values()
            .filter(|n| matches_labels(n.labels.as_ref(), labels))
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listed)
    }

    async fn remove_network(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.record("remove_network", id)?;
        let key = state
            .network_id(id)
            .ok_or_else(|| EngineError::not_found(ObjectKind::Network, id))?;
        state.networks.remove(&key);
        Ok(())
    }

    async fn connect_network(&self, id: &str, request: &NetworkConnectRequest) -> Result<()> {
        let mut state = self.lock();
        state.record("connect_network", id)?;
        let container_id = state
            .container_id(&request.container)
            .ok_or_else(|| EngineError::not_found(ObjectKind::Container, &request.container))?;
        let container_name = state
            .containers
            .get(&container_id)
            .map(|c| c.name.trim_start_matches('/').to_string())
            .unwrap_or_default();
        let key = state
            .network_id(id)
            .ok_or_else(|| EngineError::not_found(ObjectKind::Network, id))?;
        if let Some(network) = state.networks.get_mut(&key) {
            network.containers.get_or_insert_with(HashMap::new).insert(
                container_id,
                NetworkContainer {
                    name: container_name,
                    endpoint_id: new_id(),
                    ..Default::default()
                },
            );
        }
        Ok(())
    }

    async fn disconnect_network(
        &self,
        id: &str,
        request: &NetworkDisconnectRequest,
    ) -> Result<()> {
        let mut state = self.lock();
        state.record("disconnect_network", id)?;
        let container_id = state
            .container_id(&request.container)
            .unwrap_or_else(|| request.container.clone());
        let key = state
            .network_id(id)
            .ok_or_else(|| EngineError::not_found(ObjectKind::Network, id))?;
        if let Some(containers) = state
            .networks
            .get_mut(&key)
            .and_then(|n| n.containers.as_mut())
        {
            containers.remove(&container_id);
        }
        Ok(())
    }
}

#[async_trait]
impl SystemOps for FakeEngine {
    async fn ping(&self) -> Result<()> {
        self.lock().record("ping", "")
    }

    async fn version(&self) -> Result<VersionResponse> {
        self.lock().record("version", "")?;
        Ok(VersionResponse {
            version: "24.0.7".to_string(),
            api_version: "1.43".to_string(),
            min_api_version: "1.12".to_string(),
            os: "linux".to_string(),
            arch: "amd64".to_string(),
            kernel_version: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn labelled(image: &str, labels: &[(&str, &str)]) -> ContainerCreateRequest {
        ContainerCreateRequest {
            image: image.to_string(),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect::<HashMap<_, _>>(),
            ),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_container_lifecycle() {
        let engine = FakeEngine::new();
        let created = engine
            .create_container(Some("web"), &labelled("nginx", &[]))
            .await
            .unwrap();

        let inspect = engine.inspect_container("web").await.unwrap();
        assert_eq!(inspect.id, created.id);
        assert_eq!(inspect.state.status, "created");

        engine.start_container(&created.id).await.unwrap();
        assert!(engine.container("web").unwrap().state.running);

        let err = engine
            .remove_container(&created.id, RemoveContainerOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        engine
            .remove_container(
                &created.id,
                RemoveContainerOptions {
                    force: true,
                    volumes: false,
                },
            )
            .await
            .unwrap();
        assert!(
            engine
                .inspect_container(&created.id)
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_name_conflict() {
        let engine = FakeEngine::new();
        engine
            .create_container(Some("db"), &labelled("postgres", &[]))
            .await
            .unwrap();
        let err = engine
            .create_container(Some("db"), &labelled("postgres", &[]))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_list_filters_by_label() {
        let engine = FakeEngine::new();
        engine
            .create_container(Some("a"), &labelled("img", &[("project", "one")]))
            .await
            .unwrap();
        engine
            .create_container(Some("b"), &labelled("img", &[("project", "two")]))
            .await
            .unwrap();

        let listed = engine
            .list_containers(&ListContainersOptions::with_label("project", "one"))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].names, vec!["/a".to_string()]);

        // Without `all`, stopped containers are hidden.
        let running = engine
            .list_containers(&ListContainersOptions::default())
            .await
            .unwrap();
        assert!(running.is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let engine = FakeEngine::new();
        engine.fail_on("ping");
        assert!(engine.ping().await.is_err());
        engine.clear_failures();
        engine.ping().await.unwrap();
        assert_eq!(engine.calls_to("ping").len(), 2);
    }

    #[tokio::test]
    async fn test_volume_create_is_idempotent() {
        let engine = FakeEngine::new();
        let request = VolumeCreateRequest {
            name: Some("data".to_string()),
            ..Default::default()
        };
        engine.create_volume(&request).await.unwrap();
        let again = engine.create_volume(&request).await.unwrap();
        assert_eq!(again.driver, "local");
        assert_eq!(engine.volume_names(), vec!["data".to_string()]);
    }

    #[tokio::test]
    async fn test_network_lookup_by_name() {
        let engine = FakeEngine::new();
        let created = engine
            .create_network(&NetworkCreateRequest {
                name: "front".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let by_name = engine.inspect_network("front").await.unwrap();
        assert_eq!(by_name.id, created.id);
        assert_eq!(by_name.driver, "bridge");
        engine.remove_network("front").await.unwrap();
        assert!(
            engine
                .inspect_network(&created.id)
                .await
                .unwrap_err()
                .is_not_found()
        );
    }
}
