//! Network records.

use crate::meta::Resource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A network record.
pub type Network = Resource<NetworkParameters, NetworkObservation>;

/// Kind name.
pub const NETWORK_KIND: &str = "Network";

/// Default network driver.
pub const DEFAULT_NETWORK_DRIVER: &str = "bridge";

/// Default IPAM driver.
pub const DEFAULT_IPAM_DRIVER: &str = "default";

/// Desired network configuration. Immutable once created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkParameters {
    /// Engine-side name. Defaults to the record name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Restrict external access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal: Option<bool>,
    /// Allow manual attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachable: Option<bool>,
    /// Swarm routing-mesh network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<bool>,
    /// Enable IPv6.
    #[serde(default, rename = "enableIPv6", skip_serializing_if = "Option::is_none")]
    pub enable_ipv6: Option<bool>,
    /// Address management.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam: Option<IpamParameters>,
    /// Driver options.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
    /// Labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl NetworkParameters {
    /// Declared driver, or [`DEFAULT_NETWORK_DRIVER`].
    #[must_use]
    pub fn driver_or_default(&self) -> &str {
        self.driver
            .as_deref()
            .filter(|d| !d.is_empty())
            .unwrap_or(DEFAULT_NETWORK_DRIVER)
    }
}

/// IPAM configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpamParameters {
    /// IPAM driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Address pools.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config: Vec<IpamPool>,
    /// Driver options.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

/// One IPAM address pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpamPool {
    /// Subnet in CIDR form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
    /// Allocation range.
    #[serde(default, rename = "ipRange", skip_serializing_if = "Option::is_none")]
    pub ip_range: Option<String>,
    /// Gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    /// Reserved addresses.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aux_addresses: BTreeMap<String, String>,
}

/// Observed network.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkObservation {
    /// Network ID.
    pub id: String,
    /// Name.
    pub name: String,
    /// Driver.
    pub driver: String,
    /// Scope.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope: String,
    /// Internal.
    #[serde(default)]
    pub internal: bool,
    /// Attachable.
    #[serde(default)]
    pub attachable: bool,
    /// Ingress.
    #[serde(default)]
    pub ingress: bool,
    /// IPv6 enabled.
    #[serde(default, rename = "enableIPv6")]
    pub enable_ipv6: bool,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Address management.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam: Option<IpamParameters>,
    /// Driver options.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
    /// Labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Attached containers keyed by container ID.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub containers: BTreeMap<String, AttachedContainer>,
}

/// Container endpoint on a network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedContainer {
    /// Container name.
    pub name: String,
    /// Endpoint ID.
    #[serde(default, rename = "endpointID")]
    pub endpoint_id: String,
    /// MAC address.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mac_address: String,
    /// IPv4 address.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ipv4_address: String,
    /// IPv6 address.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ipv6_address: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names() {
        let params = NetworkParameters {
            enable_ipv6: Some(true),
            ipam: Some(IpamParameters {
                driver: None,
                config: vec![IpamPool {
                    subnet: Some("10.9.0.0/24".to_string()),
                    ip_range: Some("10.9.0.128/25".to_string()),
                    ..Default::default()
                }],
                options: BTreeMap::new(),
            }),
            ..Default::default()
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["enableIPv6"], true);
        assert_eq!(value["ipam"]["config"][0]["ipRange"], "10.9.0.128/25");
        assert!(value.get("driver").is_none());
        assert_eq!(params.driver_or_default(), "bridge");
    }
}
