//! Volume records.

use crate::meta::Resource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A volume record.
pub type Volume = Resource<VolumeParameters, VolumeObservation>;

/// Kind name.
pub const VOLUME_KIND: &str = "Volume";

/// Default volume driver.
pub const DEFAULT_VOLUME_DRIVER: &str = "local";

/// Desired volume configuration. Immutable once created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeParameters {
    /// Engine-side name. Defaults to the record name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Driver options.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub driver_opts: BTreeMap<String, String>,
    /// Labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl VolumeParameters {
    /// Declared driver, or [`DEFAULT_VOLUME_DRIVER`].
    #[must_use]
    pub fn driver_or_default(&self) -> &str {
        self.driver
            .as_deref()
            .filter(|d| !d.is_empty())
            .unwrap_or(DEFAULT_VOLUME_DRIVER)
    }
}

/// Observed volume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeObservation {
    /// Name.
    pub name: String,
    /// Driver.
    pub driver: String,
    /// Host mount point.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mountpoint: String,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Scope (local, global).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope: String,
    /// Driver options.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
    /// Labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Usage, when the engine reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_data: Option<VolumeUsage>,
}

/// Volume usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeUsage {
    /// Bytes used, -1 when unknown.
    pub size: i64,
    /// Containers referencing the volume, -1 when unknown.
    pub ref_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_default() {
        let mut params = VolumeParameters::default();
        assert_eq!(params.driver_or_default(), "local");
        params.driver = Some("nfs".to_string());
        assert_eq!(params.driver_or_default(), "nfs");
    }

    #[test]
    fn test_deserialize() {
        let json = r#"{
            "metadata": {"name": "data"},
            "spec": {"forProvider": {"driverOpts": {"type": "tmpfs"}, "labels": {"tier": "db"}}}
        }"#;
        let volume: Volume = serde_json::from_str(json).unwrap();
        assert_eq!(volume.name(), "data");
        assert_eq!(volume.params().driver_opts["type"], "tmpfs");
        assert_eq!(volume.params().labels["tier"], "db");
    }
}
