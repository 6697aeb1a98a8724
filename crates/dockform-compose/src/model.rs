//! Compose document model.
//!
//! Only the subset of the compose format that maps onto container, network
//! and volume records is modelled; unknown keys (including `x-` extensions)
//! are ignored. Fields that accept both a short and a long form are untagged
//! enums.

use crate::error::{ComposeError, Result};
use crate::interpolate::interpolate_value;
use dockform_resource::container::Propagation;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// A parsed compose document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ComposeFile {
    /// Legacy schema version, e.g. `"3.8"`.
    pub version: Option<Scalar>,
    /// Project name declared in the document. Informational only.
    pub name: Option<String>,
    /// Services by name.
    pub services: BTreeMap<String, Service>,
    /// Top-level networks. A bare key means "all defaults".
    pub networks: BTreeMap<String, Option<NetworkDef>>,
    /// Top-level volumes. A bare key means "all defaults".
    pub volumes: BTreeMap<String, Option<VolumeDef>>,
}

impl ComposeFile {
    /// Parses a document, substituting `${VAR}` references from `env` in
    /// every string value first.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError::Parse`] for malformed YAML or a shape
    /// mismatch, and [`ComposeError::Validation`] for an empty document or a
    /// bad interpolation.
    pub fn parse(document: &str, env: &BTreeMap<String, String>) -> Result<Self> {
        let mut value: serde_yaml::Value = serde_yaml::from_str(document)?;
        if value.is_null() {
            return Err(ComposeError::validation("document is empty"));
        }
        interpolate_value(&mut value, env)?;
        Ok(serde_yaml::from_value(value)?)
    }

    /// Schema version as written, if any.
    #[must_use]
    pub fn compose_version(&self) -> Option<String> {
        self.version.as_ref().map(ToString::to_string)
    }
}

/// A YAML scalar that compose accepts where a string is meant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// `true` / `false`.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float, e.g. `version: 3.8`.
    Float(f64),
    /// String.
    String(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// A string, or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    /// Single string.
    String(String),
    /// List.
    List(Vec<String>),
}

impl StringOrList {
    /// List form; a single string becomes a one-element list.
    #[must_use]
    pub fn to_list(&self) -> Vec<String> {
        match self {
            Self::String(s) => vec![s.clone()],
            Self::List(list) => list.clone(),
        }
    }
}

/// `KEY=VALUE` list, or a map.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ListOrMap {
    /// `["KEY=VALUE", "KEY"]`.
    List(Vec<String>),
    /// `{KEY: VALUE, KEY: null}`.
    Map(BTreeMap<String, Option<Scalar>>),
}

impl ListOrMap {
    /// Entries in declaration order (list) or key order (map). A key with
    /// no value yields `None`.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Option<String>)> {
        match self {
            Self::List(list) => list
                .iter()
                .map(|entry| match entry.split_once('=') {
                    Some((key, value)) => (key.to_string(), Some(value.to_string())),
                    None => (entry.clone(), None),
                })
                .collect(),
            Self::Map(map) => map
                .iter()
                .map(|(key, value)| (key.clone(), value.as_ref().map(ToString::to_string)))
                .collect(),
        }
    }
}

/// One service.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Service {
    /// Image reference. Required; `build` is not supported.
    pub image: Option<String>,
    /// Command, as a shell-style string or an argv list.
    pub command: Option<StringOrList>,
    /// Environment.
    pub environment: Option<ListOrMap>,
    /// Published and exposed ports.
    pub ports: Vec<Port>,
    /// Mounts.
    pub volumes: Vec<ServiceVolume>,
    /// Networks to join.
    pub networks: Option<ServiceNetworks>,
    /// Network mode, e.g. `host`.
    pub network_mode: Option<String>,
    /// Start-order dependencies.
    pub depends_on: Option<DependsOn>,
    /// Restart policy, e.g. `on-failure:3`.
    pub restart: Option<String>,
    /// Working directory inside the container.
    pub working_dir: Option<String>,
    /// User.
    pub user: Option<String>,
    /// Hostname.
    pub hostname: Option<String>,
    /// Labels.
    pub labels: Option<ListOrMap>,
    /// Extra `/etc/hosts` entries.
    pub extra_hosts: Option<ListOrMap>,
    /// DNS servers.
    pub dns: Option<StringOrList>,
    /// DNS search domains.
    pub dns_search: Option<StringOrList>,
    /// Privileged mode.
    pub privileged: Option<bool>,
    /// Run an init process.
    pub init: Option<bool>,
    /// Health check.
    pub healthcheck: Option<Healthcheck>,
}

/// Port: a bare number, a short string, or the long form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Port {
    /// `- 80`
    Number(u16),
    /// `- "127.0.0.1:8080:80/tcp"`
    Short(String),
    /// `- {target: 80, published: 8080}`
    Long(PortLong),
}

/// Long port syntax.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PortLong {
    /// Container port.
    pub target: u16,
    /// Host port.
    #[serde(default)]
    pub published: Option<StringOrNumber>,
    /// Host address.
    #[serde(default)]
    pub host_ip: Option<String>,
    /// `tcp` or `udp`.
    #[serde(default)]
    pub protocol: Option<String>,
}

/// A number that may be written as a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StringOrNumber {
    /// Number.
    Number(u64),
    /// String.
    String(String),
}

impl fmt::Display for StringOrNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// Mount: `source:target[:mode]` or the long form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ServiceVolume {
    /// Short syntax.
    Short(String),
    /// Long syntax.
    Long(VolumeLong),
}

/// Long mount syntax.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VolumeLong {
    /// `volume`, `bind` or `tmpfs`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Volume name or host path.
    #[serde(default)]
    pub source: Option<String>,
    /// Path inside the container.
    pub target: String,
    /// Mount read-only.
    #[serde(default)]
    pub read_only: bool,
    /// Bind options.
    #[serde(default)]
    pub bind: Option<BindOptions>,
}

/// Bind options of the long mount syntax.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BindOptions {
    /// Mount propagation.
    pub propagation: Option<Propagation>,
}

/// Networks a service joins.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ServiceNetworks {
    /// `[front, back]`
    List(Vec<String>),
    /// `{back: {aliases: [db]}}`
    Map(BTreeMap<String, Option<ServiceNetwork>>),
}

impl ServiceNetworks {
    /// Network keys with their per-service settings.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, ServiceNetwork)> {
        match self {
            Self::List(list) => list
                .iter()
                .map(|name| (name.clone(), ServiceNetwork::default()))
                .collect(),
            Self::Map(map) => map
                .iter()
                .map(|(name, settings)| (name.clone(), settings.clone().unwrap_or_default()))
                .collect(),
        }
    }
}

/// Per-service network settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceNetwork {
    /// Extra DNS names on this network.
    pub aliases: Vec<String>,
    /// Static IPv4 address.
    pub ipv4_address: Option<String>,
    /// Static IPv6 address.
    pub ipv6_address: Option<String>,
}

/// `depends_on`, list or map form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DependsOn {
    /// `[db, cache]`
    List(Vec<String>),
    /// `{db: {condition: service_healthy}}`
    Map(BTreeMap<String, Option<DependsOnCondition>>),
}

impl DependsOn {
    /// Names of the services depended on.
    #[must_use]
    pub fn services(&self) -> Vec<String> {
        match self {
            Self::List(list) => list.clone(),
            Self::Map(map) => map.keys().cloned().collect(),
        }
    }
}

/// Map-form dependency settings. Parsed for completeness; creation order is
/// the only thing dependencies affect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DependsOnCondition {
    /// e.g. `service_healthy`.
    pub condition: Option<String>,
}

/// Health check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Healthcheck {
    /// Test command. A string runs through the shell.
    pub test: Option<StringOrList>,
    /// Interval.
    pub interval: Option<String>,
    /// Timeout.
    pub timeout: Option<String>,
    /// Start period.
    pub start_period: Option<String>,
    /// Retries.
    pub retries: Option<i32>,
    /// Disable any image-defined check.
    pub disable: bool,
}

/// `external: true` or the legacy `external: {name: ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum External {
    /// Flag.
    Flag(bool),
    /// Legacy form naming the existing object.
    Named {
        /// Engine-side name.
        name: String,
    },
}

impl External {
    fn is_external(&self) -> bool {
        !matches!(self, Self::Flag(false))
    }

    fn name(&self) -> Option<&str> {
        match self {
            Self::Flag(_) => None,
            Self::Named { name } => Some(name),
        }
    }
}

/// Top-level network.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NetworkDef {
    /// Engine-side name, overriding the project-scoped default.
    pub name: Option<String>,
    /// Driver.
    pub driver: Option<String>,
    /// Driver options.
    pub driver_opts: BTreeMap<String, String>,
    /// Already exists; never created or removed.
    pub external: Option<External>,
    /// Restrict external access.
    pub internal: Option<bool>,
    /// Allow manual attachment.
    pub attachable: Option<bool>,
    /// Enable IPv6.
    pub enable_ipv6: Option<bool>,
    /// Address management.
    pub ipam: Option<IpamDef>,
    /// Labels.
    pub labels: Option<ListOrMap>,
}

/// Top-level volume.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct VolumeDef {
    /// Engine-side name, overriding the project-scoped default.
    pub name: Option<String>,
    /// Driver.
    pub driver: Option<String>,
    /// Driver options.
    pub driver_opts: BTreeMap<String, String>,
    /// Already exists; never created or removed.
    pub external: Option<External>,
    /// Labels.
    pub labels: Option<ListOrMap>,
}

/// Shared accessors for top-level networks and volumes.
pub trait TopLevel {
    /// Explicit engine-side name.
    fn explicit_name(&self) -> Option<&str>;
    /// External marker.
    fn external(&self) -> Option<&External>;

    /// Whether the object is managed outside the stack.
    fn is_external(&self) -> bool {
        self.external().is_some_and(External::is_external)
    }

    /// Engine-side name for key `key` in project `project`.
    fn engine_name(&self, project: &str, key: &str) -> String {
        if let Some(name) = self.explicit_name().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        if let Some(name) = self.external().and_then(External::name) {
            return name.to_string();
        }
        if self.is_external() {
            return key.to_string();
        }
        crate::decompose::scoped_name(project, key)
    }
}

impl TopLevel for NetworkDef {
    fn explicit_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn external(&self) -> Option<&External> {
        self.external.as_ref()
    }
}

impl TopLevel for VolumeDef {
    fn explicit_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn external(&self) -> Option<&External> {
        self.external.as_ref()
    }
}

/// IPAM block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IpamDef {
    /// Driver.
    pub driver: Option<String>,
    /// Pools.
    pub config: Vec<IpamPoolDef>,
    /// Driver options.
    pub options: BTreeMap<String, String>,
}

/// IPAM pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IpamPoolDef {
    /// Subnet.
    pub subnet: Option<String>,
    /// Allocation range.
    pub ip_range: Option<String>,
    /// Gateway.
    pub gateway: Option<String>,
    /// Reserved addresses.
    pub aux_addresses: BTreeMap<String, String>,
}
