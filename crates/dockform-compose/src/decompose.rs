//! Compose document to container, network and volume parameters.
//!
//! Every service becomes one container named `<project>_<service>_1`, every
//! top-level network and volume one engine object named `<project>_<key>`
//! unless it declares its own name or is external. All objects carry the
//! compose project and service labels so a stack can be found again by
//! label alone.

use crate::error::{ComposeError, Result};
use crate::model::{
    ComposeFile, Healthcheck, IpamDef, NetworkDef, Port, Service, ServiceNetwork, ServiceVolume,
    StringOrList, TopLevel, VolumeDef,
};
use crate::order::creation_order;
use dockform_resource::container::{
    BindSource, ContainerParameters, EmptyDirSource, EnvVar, HealthCheck, HostPathSource,
    HostPathType, NamedVolumeSource, NetworkAttachment, PortSpec, Propagation, RestartPolicy,
    VolumeMount, VolumeSource,
};
use dockform_resource::network::{IpamParameters, IpamPool, NetworkParameters};
use dockform_resource::volume::VolumeParameters;
use std::collections::BTreeMap;
use std::path::Path;

/// Label naming the compose project.
pub const PROJECT_LABEL: &str = "com.docker.compose.project";
/// Label naming the service a container belongs to.
pub const SERVICE_LABEL: &str = "com.docker.compose.service";
/// Label naming the compose key of a project network.
pub const NETWORK_LABEL: &str = "com.docker.compose.network";
/// Label naming the compose key of a project volume.
pub const VOLUME_LABEL: &str = "com.docker.compose.volume";
/// Network every service joins when it names none.
pub const DEFAULT_NETWORK: &str = "default";

/// Engine name of a project network or volume.
#[must_use]
pub fn scoped_name(project: &str, name: &str) -> String {
    format!("{project}_{name}")
}

/// Record name of a service's container.
#[must_use]
pub fn record_name(project: &str, service: &str) -> String {
    format!("{project}-{service}")
}

/// Engine name of a service's container.
#[must_use]
pub fn container_name(project: &str, service: &str) -> String {
    format!("{project}_{service}_1")
}

/// `com.docker.compose.project=<project>` label filter.
#[must_use]
pub fn project_filter(project: &str) -> String {
    format!("{PROJECT_LABEL}={project}")
}

/// Everything a stack needs on the engine side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackPlan {
    /// Project name.
    pub project: String,
    /// Document `version`, if any.
    pub compose_version: Option<String>,
    /// Services in creation order.
    pub services: Vec<ServicePlan>,
    /// Project networks, in key order.
    pub networks: Vec<NetworkPlan>,
    /// Project volumes, in key order.
    pub volumes: Vec<VolumePlan>,
}

impl StackPlan {
    /// Looks up a service by compose name.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&ServicePlan> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Looks up a service by compose name, mutably.
    pub fn service_mut(&mut self, name: &str) -> Option<&mut ServicePlan> {
        self.services.iter_mut().find(|s| s.name == name)
    }
}

/// One service's container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePlan {
    /// Compose service name.
    pub name: String,
    /// `<project>-<service>`.
    pub record_name: String,
    /// `<project>_<service>_1`.
    pub container_name: String,
    /// Container parameters. `name` is set to `container_name`.
    pub params: ContainerParameters,
    /// Services this one is created after.
    pub depends_on: Vec<String>,
}

/// One project network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPlan {
    /// Compose key.
    pub key: String,
    /// Engine name.
    pub name: String,
    /// Managed outside the stack.
    pub external: bool,
    /// Create parameters.
    pub params: NetworkParameters,
}

/// One project volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumePlan {
    /// Compose key.
    pub key: String,
    /// Engine name.
    pub name: String,
    /// Managed outside the stack.
    pub external: bool,
    /// Create parameters.
    pub params: VolumeParameters,
}

/// Splits a parsed document into per-object parameters.
///
/// Relative bind sources are resolved against `working_dir`.
///
/// # Errors
///
/// Returns [`ComposeError::Validation`] for a document that names no
/// services, a service without an image, an undeclared network or named
/// volume, an unusable port, mount or restart policy, or a dependency on an
/// unknown service; [`ComposeError::DependencyCycle`] when `depends_on`
/// loops.
pub fn decompose(
    project: &str,
    file: &ComposeFile,
    working_dir: Option<&Path>,
) -> Result<StackPlan> {
    if file.services.is_empty() {
        return Err(ComposeError::validation("no services defined"));
    }

    let mut networks: BTreeMap<String, NetworkPlan> = file
        .networks
        .iter()
        .map(|(key, def)| {
            let def = def.clone().unwrap_or_default();
            (key.clone(), network_plan(project, key, &def))
        })
        .collect();
    let needs_default = file
        .services
        .values()
        .any(|s| s.networks.is_none() && s.network_mode.is_none());
    if needs_default && !networks.contains_key(DEFAULT_NETWORK) {
        networks.insert(
            DEFAULT_NETWORK.to_string(),
            network_plan(project, DEFAULT_NETWORK, &NetworkDef::default()),
        );
    }

    let volumes: BTreeMap<String, VolumePlan> = file
        .volumes
        .iter()
        .map(|(key, def)| {
            let def = def.clone().unwrap_or_default();
            (key.clone(), volume_plan(project, key, &def))
        })
        .collect();

    let context = Context {
        project,
        networks: &networks,
        volumes: &volumes,
        working_dir,
    };
    let mut services = BTreeMap::new();
    for (name, service) in &file.services {
        services.insert(name.clone(), context.service(name, service)?);
    }

    let dependencies = services
        .iter()
        .map(|(name, plan)| (name.clone(), plan.depends_on.clone()))
        .collect();
    let order = creation_order(&dependencies)?;
    let services = order
        .iter()
        .filter_map(|name| services.remove(name))
        .collect();

    Ok(StackPlan {
        project: project.to_string(),
        compose_version: file.compose_version(),
        services,
        networks: networks.into_values().collect(),
        volumes: volumes.into_values().collect(),
    })
}

fn network_plan(project: &str, key: &str, def: &NetworkDef) -> NetworkPlan {
    let name = def.engine_name(project, key);
    let mut labels = labels_of(def.labels.as_ref());
    labels.insert(PROJECT_LABEL.to_string(), project.to_string());
    labels.insert(NETWORK_LABEL.to_string(), key.to_string());
    NetworkPlan {
        key: key.to_string(),
        name: name.clone(),
        external: def.is_external(),
        params: NetworkParameters {
            name: Some(name),
            driver: def.driver.clone(),
            internal: def.internal,
            attachable: def.attachable,
            ingress: None,
            enable_ipv6: def.enable_ipv6,
            ipam: def.ipam.as_ref().map(ipam),
            options: def.driver_opts.clone(),
            labels,
        },
    }
}

fn ipam(def: &IpamDef) -> IpamParameters {
    IpamParameters {
        driver: def.driver.clone(),
        config: def
            .config
            .iter()
            .map(|pool| IpamPool {
                subnet: pool.subnet.clone(),
                ip_range: pool.ip_range.clone(),
                gateway: pool.gateway.clone(),
                aux_addresses: pool.aux_addresses.clone(),
            })
            .collect(),
        options: def.options.clone(),
    }
}

fn volume_plan(project: &str, key: &str, def: &VolumeDef) -> VolumePlan {
    let name = def.engine_name(project, key);
    let mut labels = labels_of(def.labels.as_ref());
    labels.insert(PROJECT_LABEL.to_string(), project.to_string());
    labels.insert(VOLUME_LABEL.to_string(), key.to_string());
    VolumePlan {
        key: key.to_string(),
        name: name.clone(),
        external: def.is_external(),
        params: VolumeParameters {
            name: Some(name),
            driver: def.driver.clone(),
            driver_opts: def.driver_opts.clone(),
            labels,
        },
    }
}

fn labels_of(labels: Option<&crate::model::ListOrMap>) -> BTreeMap<String, String> {
    labels
        .map(|l| {
            l.entries()
                .into_iter()
                .map(|(k, v)| (k, v.unwrap_or_default()))
                .collect()
        })
        .unwrap_or_default()
}

struct Context<'a> {
    project: &'a str,
    networks: &'a BTreeMap<String, NetworkPlan>,
    volumes: &'a BTreeMap<String, VolumePlan>,
    working_dir: Option<&'a Path>,
}

impl Context<'_> {
    fn service(&self, name: &str, service: &Service) -> Result<ServicePlan> {
        let image = service
            .image
            .as_deref()
            .filter(|i| !i.is_empty())
            .ok_or_else(|| ComposeError::validation(format!("service {name} has no image")))?;
        let engine_name = container_name(self.project, name);
        let mut depends_on = service
            .depends_on
            .as_ref()
            .map(crate::model::DependsOn::services)
            .unwrap_or_default();

        let mut params = ContainerParameters::for_image(image);
        params.name = Some(engine_name.clone());
        params.command = match &service.command {
            Some(StringOrList::String(line)) => split_command(line)
                .map_err(|e| ComposeError::validation(format!("service {name}: {e}")))?,
            Some(StringOrList::List(argv)) => argv.clone(),
            None => Vec::new(),
        };
        params.environment = service
            .environment
            .as_ref()
            .map(|env| {
                env.entries()
                    .into_iter()
                    .map(|(key, value)| match value {
                        Some(value) => EnvVar::literal(key, value),
                        None => EnvVar::inherited(key),
                    })
                    .collect()
            })
            .unwrap_or_default();

        params.labels = labels_of(service.labels.as_ref());
        params
            .labels
            .insert(PROJECT_LABEL.to_string(), self.project.to_string());
        params.labels.insert(SERVICE_LABEL.to_string(), name.to_string());

        for port in &service.ports {
            params.ports.extend(
                port_specs(port)
                    .map_err(|e| ComposeError::validation(format!("service {name}: {e}")))?,
            );
        }
        for (index, volume) in service.volumes.iter().enumerate() {
            params.volumes.push(self.mount(name, index, volume)?);
        }

        match (&service.network_mode, &service.networks) {
            (Some(_), Some(_)) => {
                return Err(ComposeError::validation(format!(
                    "service {name} sets both network_mode and networks"
                )));
            }
            (Some(mode), None) => {
                params.network_mode = Some(match mode.strip_prefix("service:") {
                    Some(other) => {
                        depends_on.push(other.to_string());
                        format!("container:{}", container_name(self.project, other))
                    }
                    None => mode.clone(),
                });
            }
            (None, networks) => {
                let entries = networks.as_ref().map_or_else(
                    || vec![(DEFAULT_NETWORK.to_string(), ServiceNetwork::default())],
                    crate::model::ServiceNetworks::entries,
                );
                for (key, settings) in entries {
                    params.networks.push(self.attachment(name, &key, settings)?);
                }
            }
        }

        if let Some(restart) = service.restart.as_deref() {
            let (policy, retries) = RestartPolicy::parse(restart).ok_or_else(|| {
                ComposeError::validation(format!(
                    "service {name} has unknown restart policy {restart:?}"
                ))
            })?;
            params.restart_policy = Some(policy);
            params.maximum_retry_count = retries;
        }

        params.working_dir = service.working_dir.clone();
        params.user = service.user.clone();
        params.hostname = service.hostname.clone();
        params.extra_hosts = service
            .extra_hosts
            .as_ref()
            .map(|hosts| {
                hosts
                    .entries()
                    .into_iter()
                    .map(|(host, ip)| ip.map_or_else(|| host.clone(), |ip| format!("{host}:{ip}")))
                    .collect()
            })
            .unwrap_or_default();
        params.dns = service.dns.as_ref().map(StringOrList::to_list).unwrap_or_default();
        params.dns_search = service
            .dns_search
            .as_ref()
            .map(StringOrList::to_list)
            .unwrap_or_default();
        params.privileged = service.privileged;
        params.init = service.init;
        params.health_check = service.healthcheck.as_ref().and_then(health_check);

        Ok(ServicePlan {
            name: name.to_string(),
            record_name: record_name(self.project, name),
            container_name: engine_name,
            params,
            depends_on,
        })
    }

    fn attachment(
        &self,
        service: &str,
        key: &str,
        settings: ServiceNetwork,
    ) -> Result<NetworkAttachment> {
        let network = self.networks.get(key).ok_or_else(|| {
            ComposeError::validation(format!("service {service} uses undefined network {key}"))
        })?;
        let mut aliases = settings.aliases;
        if !aliases.iter().any(|a| a == service) {
            aliases.push(service.to_string());
        }
        Ok(NetworkAttachment {
            name: network.name.clone(),
            aliases,
            ip_address: settings.ipv4_address,
            ipv6_address: settings.ipv6_address,
            links: Vec::new(),
        })
    }

    fn mount(&self, service: &str, index: usize, volume: &ServiceVolume) -> Result<VolumeMount> {
        let name = format!("{service}-{index}");
        let invalid =
            |message: String| ComposeError::validation(format!("service {service}: {message}"));

        match volume {
            ServiceVolume::Short(spec) => {
                let parts: Vec<&str> = spec.split(':').collect();
                let (source, target, mode) = match parts.as_slice() {
                    [target] => (None, *target, ""),
                    [source, target] => (Some(*source), *target, ""),
                    [source, target, mode] => (Some(*source), *target, *mode),
                    _ => return Err(invalid(format!("invalid volume {spec:?}"))),
                };
                if target.is_empty() {
                    return Err(invalid(format!("invalid volume {spec:?}")));
                }
                let options: Vec<&str> = mode.split(',').filter(|o| !o.is_empty()).collect();
                let read_only = options.contains(&"ro");
                let propagation = options.iter().find_map(|o| propagation(o));

                let source = match source {
                    None => anonymous(),
                    Some(source) if is_path(source) => {
                        host_source(self.host_path(source).map_err(invalid)?, propagation)
                    }
                    Some(key) => self.named(service, key)?,
                };
                Ok(VolumeMount {
                    name,
                    mount_path: target.to_string(),
                    read_only: read_only.then_some(true),
                    source,
                })
            }
            ServiceVolume::Long(long) => {
                let source = match long.kind.as_str() {
                    "bind" => {
                        let path = long
                            .source
                            .as_deref()
                            .filter(|s| !s.is_empty())
                            .ok_or_else(|| {
                                invalid(format!("bind mount at {} has no source", long.target))
                            })?;
                        host_source(
                            self.host_path(path).map_err(invalid)?,
                            long.bind.as_ref().and_then(|b| b.propagation),
                        )
                    }
                    "volume" => match long.source.as_deref().filter(|s| !s.is_empty()) {
                        None => anonymous(),
                        Some(key) => self.named(service, key)?,
                    },
                    "tmpfs" => VolumeSource {
                        empty_dir: Some(EmptyDirSource::default()),
                        ..Default::default()
                    },
                    other => return Err(invalid(format!("unsupported mount type {other:?}"))),
                };
                Ok(VolumeMount {
                    name,
                    mount_path: long.target.clone(),
                    read_only: long.read_only.then_some(true),
                    source,
                })
            }
        }
    }

    fn named(&self, service: &str, key: &str) -> Result<VolumeSource> {
        let volume = self.volumes.get(key).ok_or_else(|| {
            ComposeError::validation(format!("service {service} uses undefined volume {key}"))
        })?;
        Ok(VolumeSource {
            volume: Some(NamedVolumeSource {
                volume_name: volume.name.clone(),
            }),
            ..Default::default()
        })
    }

    fn host_path(&self, source: &str) -> std::result::Result<String, String> {
        if source.starts_with('/') {
            return Ok(source.to_string());
        }
        if source.starts_with('~') {
            return Err(format!("home-relative path {source:?} is not supported"));
        }
        let base = self
            .working_dir
            .ok_or_else(|| format!("relative path {source:?} needs a working directory"))?;
        Ok(base.join(source).to_string_lossy().into_owned())
    }
}

fn is_path(source: &str) -> bool {
    source.starts_with('/') || source.starts_with('.') || source.starts_with('~')
}

fn anonymous() -> VolumeSource {
    VolumeSource {
        volume: Some(NamedVolumeSource::default()),
        ..Default::default()
    }
}

fn host_source(path: String, propagation: Option<Propagation>) -> VolumeSource {
    match propagation {
        Some(propagation) => VolumeSource {
            bind: Some(BindSource {
                source_path: path,
                propagation: Some(propagation),
            }),
            ..Default::default()
        },
        None => VolumeSource {
            host_path: Some(HostPathSource {
                path,
                path_type: Some(HostPathType::DirectoryOrCreate),
            }),
            ..Default::default()
        },
    }
}

fn propagation(option: &str) -> Option<Propagation> {
    Some(match option {
        "private" => Propagation::Private,
        "rprivate" => Propagation::Rprivate,
        "shared" => Propagation::Shared,
        "rshared" => Propagation::Rshared,
        "slave" => Propagation::Slave,
        "rslave" => Propagation::Rslave,
        _ => return None,
    })
}

fn health_check(check: &Healthcheck) -> Option<HealthCheck> {
    let test = if check.disable {
        vec!["NONE".to_string()]
    } else {
        match check.test.as_ref()? {
            StringOrList::String(line) => vec!["CMD-SHELL".to_string(), line.clone()],
            StringOrList::List(argv) => argv.clone(),
        }
    };
    Some(HealthCheck {
        test,
        interval: check.interval.clone(),
        timeout: check.timeout.clone(),
        start_period: check.start_period.clone(),
        retries: check.retries,
    })
}

/// Expands one compose port entry into port specs. Ranges yield one spec
/// per port.
fn port_specs(port: &Port) -> std::result::Result<Vec<PortSpec>, String> {
    match port {
        Port::Number(n) => Ok(vec![PortSpec {
            container_port: container_port(&n.to_string())?,
            ..Default::default()
        }]),
        Port::Long(long) => {
            if long.target == 0 {
                return Err("port 0 is not a valid target".to_string());
            }
            let host_port = match &long.published {
                Some(published) => Some(host_port(&published.to_string())?).flatten(),
                None => None,
            };
            Ok(vec![PortSpec {
                container_port: long.target,
                host_port,
                host_ip: long.host_ip.clone().filter(|ip| !ip.is_empty()),
                protocol: long.protocol.as_deref().map(str::to_uppercase),
            }])
        }
        Port::Short(spec) => short_port(spec),
    }
}

fn short_port(spec: &str) -> std::result::Result<Vec<PortSpec>, String> {
    let (mapping, protocol) = match spec.rsplit_once('/') {
        Some((mapping, protocol)) => (mapping, Some(protocol.to_uppercase())),
        None => (spec, None),
    };

    let (host_ip, rest) = if let Some(bracketed) = mapping.strip_prefix('[') {
        let (ip, rest) = bracketed
            .split_once("]:")
            .ok_or_else(|| format!("invalid port {spec:?}"))?;
        (Some(ip.to_string()), rest)
    } else {
        (None, mapping)
    };

    let parts: Vec<&str> = rest.split(':').collect();
    let (host_ip, host, container) = match (host_ip, parts.as_slice()) {
        (None, [container]) => (None, "", *container),
        (ip, [host, container]) => (ip, *host, *container),
        (None, [ip, host, container]) => (Some((*ip).to_string()), *host, *container),
        _ => return Err(format!("invalid port {spec:?}")),
    };

    let containers = port_range(container)?;
    let hosts: Vec<Option<u16>> = if host.is_empty() {
        vec![None; containers.len()]
    } else {
        let hosts = port_range(host)?;
        if hosts.len() != containers.len() {
            return Err(format!("port ranges in {spec:?} differ in length"));
        }
        hosts.into_iter().map(Some).collect()
    };

    Ok(containers
        .into_iter()
        .zip(hosts)
        .map(|(container_port, host_port)| PortSpec {
            container_port,
            host_port,
            host_ip: host_ip.clone().filter(|ip| !ip.is_empty()),
            protocol: protocol.clone(),
        })
        .collect())
}

fn port_range(s: &str) -> std::result::Result<Vec<u16>, String> {
    match s.split_once('-') {
        Some((start, end)) => {
            let (start, end) = (container_port(start)?, container_port(end)?);
            if start > end {
                return Err(format!("invalid port range {s:?}"));
            }
            Ok((start..=end).collect())
        }
        None => Ok(vec![container_port(s)?]),
    }
}

fn container_port(s: &str) -> std::result::Result<u16, String> {
    match s.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("invalid port {s:?}")),
        Ok(port) => Ok(port),
    }
}

fn host_port(s: &str) -> std::result::Result<Option<u16>, String> {
    if s.is_empty() {
        return Ok(None);
    }
    container_port(s).map(Some)
}

/// Splits a command line the way a POSIX shell would, without expansion.
fn split_command(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => word.push(c),
                        None => return Err(format!("unterminated quote in command {line:?}")),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => word.push(c),
                            Some(c) => {
                                word.push('\\');
                                word.push(c);
                            }
                            None => return Err(format!("unterminated quote in command {line:?}")),
                        },
                        Some(c) => word.push(c),
                        None => return Err(format!("unterminated quote in command {line:?}")),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(c) = chars.next() {
                    word.push(c);
                }
            }
            c => {
                in_word = true;
                word.push(c);
            }
        }
    }
    if in_word {
        words.push(word);
    }
    Ok(words)
}
