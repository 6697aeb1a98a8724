//! Engine operation traits.
//!
//! The reconciler only ever talks to the engine through these traits. They
//! are split by object kind so a controller can be handed exactly the
//! capability it needs, and so tests can substitute a single kind.
//!
//! Implementations must report a missing object with an error for which
//! [`EngineError::is_not_found`](crate::EngineError::is_not_found) returns
//! true. No implementation retries on its own.

use crate::error::Result;
use crate::types::{
    ContainerCreateRequest, ContainerCreateResponse, ContainerInspectResponse, ContainerSummary,
    Network, NetworkConnectRequest, NetworkCreateRequest, NetworkCreateResponse,
    NetworkDisconnectRequest, VersionResponse, Volume, VolumeCreateRequest,
};
use async_trait::async_trait;
use std::time::Duration;

/// Options for listing containers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListContainersOptions {
    /// Include stopped containers.
    pub all: bool,
    /// Label filters, each `key` or `key=value`.
    pub labels: Vec<String>,
}

impl ListContainersOptions {
    /// Lists all containers (running or not) carrying `key=value`.
    #[must_use]
    pub fn with_label(key: &str, value: &str) -> Self {
        Self {
            all: true,
            labels: vec![format!("{key}={value}")],
        }
    }
}

/// Options for removing a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveContainerOptions {
    /// Kill the container if it is running.
    pub force: bool,
    /// Remove anonymous volumes.
    pub volumes: bool,
}

/// Container operations.
#[async_trait]
pub trait ContainerOps: Send + Sync {
    /// Creates a container, optionally with an explicit name.
    async fn create_container(
        &self,
        name: Option<&str>,
        request: &ContainerCreateRequest,
    ) -> Result<ContainerCreateResponse>;

    /// Starts a container. Starting a running container succeeds.
    async fn start_container(&self, id: &str) -> Result<()>;

    /// Stops a container, waiting up to `timeout` before killing it.
    /// Stopping a stopped container succeeds.
    async fn stop_container(&self, id: &str, timeout: Option<Duration>) -> Result<()>;

    /// Restarts a container.
    async fn restart_container(&self, id: &str, timeout: Option<Duration>) -> Result<()>;

    /// Removes a container.
    async fn remove_container(&self, id: &str, options: RemoveContainerOptions) -> Result<()>;

    /// Inspects a container by ID or name.
    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse>;

    /// Lists containers.
    async fn list_containers(&self, options: &ListContainersOptions)
    -> Result<Vec<ContainerSummary>>;
}

/// Volume operations.
#[async_trait]
pub trait VolumeOps: Send + Sync {
    /// Creates a volume.
    async fn create_volume(&self, request: &VolumeCreateRequest) -> Result<Volume>;

    /// Inspects a volume by name.
    async fn inspect_volume(&self, name: &str) -> Result<Volume>;

    /// Lists volumes matching the label filters.
    async fn list_volumes(&self, labels: &[String]) -> Result<Vec<Volume>>;

    /// Removes a volume.
    async fn remove_volume(&self, name: &str, force: bool) -> Result<()>;
}

/// Network operations.
#[async_trait]
pub trait NetworkOps: Send + Sync {
    /// Creates a network.
    async fn create_network(&self, request: &NetworkCreateRequest)
    -> Result<NetworkCreateResponse>;

    /// Inspects a network by ID or name.
    async fn inspect_network(&self, id: &str) -> Result<Network>;

    /// Lists networks matching the label filters.
    async fn list_networks(&self, labels: &[String]) -> Result<Vec<Network>>;

    /// Removes a network.
    async fn remove_network(&self, id: &str) -> Result<()>;

    /// Attaches a container to a network.
    async fn connect_network(&self, id: &str, request: &NetworkConnectRequest) -> Result<()>;

    /// Detaches a container from a network.
    async fn disconnect_network(&self, id: &str, request: &NetworkDisconnectRequest)
    -> Result<()>;
}

/// Connectivity probes.
#[async_trait]
pub trait SystemOps: Send + Sync {
    /// Checks the engine is reachable.
    async fn ping(&self) -> Result<()>;

    /// Returns engine version information.
    async fn version(&self) -> Result<VersionResponse>;
}

/// Full engine capability.
pub trait Engine: ContainerOps + VolumeOps + NetworkOps + SystemOps {}

impl<T> Engine for T where T: ContainerOps + VolumeOps + NetworkOps + SystemOps + ?Sized {}
