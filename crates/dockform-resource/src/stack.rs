//! Compose stack records.

use crate::container::{ContainerHealth, EnvVar, PortSpec, ResourceRequirements};
use crate::meta::Resource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A stack record.
pub type ComposeStack = Resource<ComposeStackParameters, ComposeStackObservation>;

/// Kind name.
pub const COMPOSE_STACK_KIND: &str = "ComposeStack";

/// Desired stack configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeStackParameters {
    /// Inline compose document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compose: Option<String>,
    /// Compose document held in a config map or secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compose_ref: Option<ComposeReference>,
    /// Project name. Defaults to the record name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    /// Variables used for interpolation and added to every service.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<EnvVar>,
    /// Per-service overrides keyed by service name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub service_overrides: BTreeMap<String, ServiceOverride>,
    /// Base directory for relative bind sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// `KEY=VALUE` documents loaded before `environment`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_files: Vec<ComposeReference>,
}

impl ComposeStackParameters {
    /// Project name, falling back to `record_name`.
    #[must_use]
    pub fn project_name_or<'a>(&'a self, record_name: &'a str) -> &'a str {
        self.project_name
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(record_name)
    }
}

/// Reference to a document stored under a key of a config map or secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeReference {
    /// Config map holding the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_ref: Option<ObjectKeyReference>,
    /// Secret holding the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<ObjectKeyReference>,
}

/// Named object and key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectKeyReference {
    /// Object name.
    pub name: String,
    /// Namespace. Defaults to the record's namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Key.
    pub key: String,
}

/// Per-service override applied after decomposition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOverride {
    /// Replica count. Only one container per service is managed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// Resource limits and requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Extra or replacement environment entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<EnvVar>,
    /// Extra or replacement labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Restart policy in engine spelling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<String>,
}

/// Observed stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeStackObservation {
    /// Project name.
    pub project_name: String,
    /// Services keyed by service name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub services: BTreeMap<String, ServiceStatus>,
    /// Project networks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<StackNetworkStatus>,
    /// Project volumes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<StackVolumeStatus>,
    /// When the document was last parsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_at: Option<DateTime<Utc>>,
    /// Document `version` key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compose_version: Option<String>,
    /// Engine objects this stack created.
    #[serde(default, skip_serializing_if = "StackChildren::is_empty")]
    pub children: StackChildren,
}

/// Engine objects created by a stack, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackChildren {
    /// Container IDs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<String>,
    /// Network names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,
    /// Volume names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
}

impl StackChildren {
    /// Nothing tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty() && self.networks.is_empty() && self.volumes.is_empty()
    }

    /// Tracks a container, ignoring duplicates.
    pub fn track_container(&mut self, id: impl Into<String>) {
        push_unique(&mut self.containers, id.into());
    }

    /// Tracks a network, ignoring duplicates.
    pub fn track_network(&mut self, name: impl Into<String>) {
        push_unique(&mut self.networks, name.into());
    }

    /// Tracks a volume, ignoring duplicates.
    pub fn track_volume(&mut self, name: impl Into<String>) {
        push_unique(&mut self.volumes, name.into());
    }
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

/// Observed service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    /// Service name.
    pub name: String,
    /// Container ID.
    #[serde(default, rename = "containerID", skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    /// Container status, or `missing`.
    pub state: String,
    /// Image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Published ports.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortSpec>,
    /// Health.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<ContainerHealth>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Start time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

/// Observed project network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackNetworkStatus {
    /// Engine name.
    pub name: String,
    /// Network ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Observed project volume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackVolumeStatus {
    /// Engine name.
    pub name: String,
    /// Driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Host mount point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<String>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_name_fallback() {
        let mut params = ComposeStackParameters::default();
        assert_eq!(params.project_name_or("shop"), "shop");
        params.project_name = Some(String::new());
        assert_eq!(params.project_name_or("shop"), "shop");
        params.project_name = Some("store".to_string());
        assert_eq!(params.project_name_or("shop"), "store");
    }

    #[test]
    fn test_children_dedup() {
        let mut children = StackChildren::default();
        assert!(children.is_empty());
        children.track_container("a");
        children.track_container("a");
        children.track_network("n");
        assert_eq!(children.containers, vec!["a".to_string()]);
        assert!(!children.is_empty());
    }

    #[test]
    fn test_compose_ref_deserialize() {
        let yaml = r"
metadata: {name: shop, namespace: team-a}
spec:
  forProvider:
    composeRef:
      configMapRef: {name: shop-compose, key: compose.yaml}
    serviceOverrides:
      web:
        restartPolicy: always
        labels: {tier: front}
";
        let stack: ComposeStack = serde_yaml::from_str(yaml).unwrap();
        let reference = stack.params().compose_ref.as_ref().unwrap();
        assert_eq!(reference.config_map_ref.as_ref().unwrap().key, "compose.yaml");
        assert_eq!(
            stack.params().service_overrides["web"].restart_policy.as_deref(),
            Some("always")
        );
    }
}
