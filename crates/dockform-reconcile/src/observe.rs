//! Engine inspect output to record observations and readiness.

use chrono::{DateTime, Datelike, Utc};
use dockform_engine::{ContainerInspectResponse, ContainerState, Health, Network, Volume};
use dockform_resource::Condition;
use dockform_resource::container::{
    ContainerHealth, ContainerObservation, HealthCheckResult, NetworkInfo, ObservedImage,
    ObservedPort, ObservedState,
};
use dockform_resource::network::{AttachedContainer, IpamParameters, IpamPool, NetworkObservation};
use dockform_resource::volume::{VolumeObservation, VolumeUsage};
use std::collections::{BTreeMap, HashMap};

/// Health log entries kept on the observation.
pub const HEALTH_LOG_LIMIT: usize = 5;

/// Parses an engine timestamp. Empty strings and the engine's zero time
/// (`0001-01-01T00:00:00Z`) yield `None`.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
        .filter(|t| t.year() > 1)
}

fn sorted<K: Ord, V>(map: Option<&HashMap<K, V>>) -> BTreeMap<K, V>
where
    K: Clone,
    V: Clone,
{
    map.map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

/// Builds the container observation from inspect output.
#[must_use]
pub fn container_observation(inspect: &ContainerInspectResponse) -> ContainerObservation {
    let state = &inspect.state;
    let started_at = parse_timestamp(&state.started_at);
    ContainerObservation {
        id: inspect.id.clone(),
        name: inspect.name.trim_start_matches('/').to_string(),
        state: ObservedState {
            status: state.status.clone(),
            running: state.running,
            paused: state.paused,
            restarting: state.restarting,
            oom_killed: state.oom_killed,
            dead: state.dead,
            pid: state.pid,
            exit_code: state.exit_code,
            error: state.error.clone(),
            started_at,
            finished_at: parse_timestamp(&state.finished_at),
            health: state.health.as_ref().map(health),
        },
        image: ObservedImage {
            name: inspect.config.image.clone(),
            id: inspect.image.clone(),
        },
        created: parse_timestamp(&inspect.created),
        started: started_at,
        ports: observed_ports(inspect),
        networks: observed_networks(inspect),
    }
}

/// Converts engine health, keeping the most recent log entries.
#[must_use]
pub fn health(health: &Health) -> ContainerHealth {
    let log = health.log.as_deref().unwrap_or_default();
    let skip = log.len().saturating_sub(HEALTH_LOG_LIMIT);
    ContainerHealth {
        status: health.status.clone(),
        failing_streak: health.failing_streak,
        log: log
            .iter()
            .skip(skip)
            .map(|entry| HealthCheckResult {
                start: parse_timestamp(&entry.start),
                end: parse_timestamp(&entry.end),
                exit_code: entry.exit_code,
                output: entry.output.clone(),
            })
            .collect(),
    }
}

fn observed_ports(inspect: &ContainerInspectResponse) -> Vec<ObservedPort> {
    let Some(ports) = &inspect.network_settings.ports else {
        return Vec::new();
    };
    let mut observed = Vec::new();
    for (key, bindings) in ports {
        let (port, protocol) = key.split_once('/').unwrap_or((key.as_str(), "tcp"));
        let Ok(private_port) = port.parse::<u16>() else {
            continue;
        };
        match bindings.as_deref() {
            None | Some([]) => observed.push(ObservedPort {
                ip: None,
                private_port,
                public_port: None,
                protocol: protocol.to_string(),
            }),
            Some(bindings) => observed.extend(bindings.iter().map(|binding| ObservedPort {
                ip: binding.host_ip.clone().filter(|ip| !ip.is_empty()),
                private_port,
                public_port: binding.host_port.as_deref().and_then(|p| p.parse().ok()),
                protocol: protocol.to_string(),
            })),
        }
    }
    observed.sort_by(|a, b| {
        (a.private_port, &a.protocol, a.public_port, &a.ip)
            .cmp(&(b.private_port, &b.protocol, b.public_port, &b.ip))
    });
    observed
}

fn observed_networks(inspect: &ContainerInspectResponse) -> BTreeMap<String, NetworkInfo> {
    sorted(inspect.network_settings.networks.as_ref())
        .into_iter()
        .map(|(name, endpoint)| {
            let info = NetworkInfo {
                network_id: endpoint.network_id.unwrap_or_default(),
                endpoint_id: endpoint.endpoint_id.unwrap_or_default(),
                gateway: endpoint.gateway.unwrap_or_default(),
                ip_address: endpoint.ip_address.unwrap_or_default(),
                ip_prefix_len: endpoint.ip_prefix_len.unwrap_or_default(),
                ipv6_gateway: endpoint.ipv6_gateway.unwrap_or_default(),
                global_ipv6_address: endpoint.global_ipv6_address.unwrap_or_default(),
                mac_address: endpoint.mac_address.unwrap_or_default(),
            };
            (name, info)
        })
        .collect()
}

/// Readiness condition for a container state.
#[must_use]
pub fn readiness(state: &ContainerState) -> Condition {
    if state.running {
        return Condition::available();
    }
    let message = if state.dead {
        "container is dead".to_string()
    } else if state.oom_killed {
        "container was killed due to OOM".to_string()
    } else if !state.error.is_empty() {
        format!("container error: {}", state.error)
    } else if state.status == "exited" {
        format!("container exited with code {}", state.exit_code)
    } else {
        format!("container is {}", state.status)
    };
    Condition::unavailable().with_message(message)
}

/// Builds the volume observation from inspect output.
#[must_use]
pub fn volume_observation(volume: &Volume) -> VolumeObservation {
    VolumeObservation {
        name: volume.name.clone(),
        driver: volume.driver.clone(),
        mountpoint: volume.mountpoint.clone(),
        created_at: parse_timestamp(&volume.created_at),
        scope: volume.scope.clone(),
        options: sorted(volume.options.as_ref()),
        labels: sorted(volume.labels.as_ref()),
        usage_data: volume.usage_data.map(|usage| VolumeUsage {
            size: usage.size,
            ref_count: usage.ref_count,
        }),
    }
}

/// Builds the network observation from inspect output.
#[must_use]
pub fn network_observation(network: &Network) -> NetworkObservation {
    let ipam = &network.ipam;
    NetworkObservation {
        id: network.id.clone(),
        name: network.name.clone(),
        driver: network.driver.clone(),
        scope: network.scope.clone(),
        internal: network.internal,
        attachable: network.attachable,
        ingress: network.ingress,
        enable_ipv6: network.enable_ipv6,
        created_at: parse_timestamp(&network.created),
        ipam: Some(IpamParameters {
            driver: ipam.driver.clone(),
            config: ipam
                .config
                .iter()
                .flatten()
                .map(|pool| IpamPool {
                    subnet: pool.subnet.clone(),
                    ip_range: pool.ip_range.clone(),
                    gateway: pool.gateway.clone(),
                    aux_addresses: sorted(pool.aux_addresses.as_ref()),
                })
                .collect(),
            options: sorted(ipam.options.as_ref()),
        }),
        options: sorted(network.options.as_ref()),
        labels: sorted(network.labels.as_ref()),
        containers: sorted(network.containers.as_ref())
            .into_iter()
            .map(|(id, c)| {
                let attached = AttachedContainer {
                    name: c.name,
                    endpoint_id: c.endpoint_id,
                    mac_address: c.mac_address,
                    ipv4_address: c.ipv4_address,
                    ipv6_address: c.ipv6_address,
                };
                (id, attached)
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockform_engine::{EndpointSettings, HealthcheckResult, NetworkSettings, PortBinding};
    use dockform_resource::{ConditionStatus, Reason};

    #[test]
    fn test_parse_timestamp() {
        let t = parse_timestamp("2024-03-01T10:00:00.123456789Z").unwrap();
        assert_eq!(t.year(), 2024);
        assert!(parse_timestamp("0001-01-01T00:00:00Z").is_none());
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_readiness_messages() {
        let mut state = ContainerState {
            running: true,
            ..Default::default()
        };
        assert_eq!(readiness(&state).reason, Reason::Available);

        state.running = false;
        state.status = "exited".into();
        state.exit_code = 2;
        let condition = readiness(&state);
        assert_eq!(condition.status, ConditionStatus::False);
        assert_eq!(condition.message.as_deref(), Some("container exited with code 2"));

        state.oom_killed = true;
        assert_eq!(
            readiness(&state).message.as_deref(),
            Some("container was killed due to OOM")
        );

        state.dead = true;
        assert_eq!(readiness(&state).message.as_deref(), Some("container is dead"));

        let created = ContainerState {
            status: "created".into(),
            ..Default::default()
        };
        assert_eq!(readiness(&created).message.as_deref(), Some("container is created"));
    }

    #[test]
    fn test_container_observation() {
        let mut inspect = ContainerInspectResponse {
            id: "abc".into(),
            name: "/web".into(),
            image: "sha256:1".into(),
            created: "2024-01-01T00:00:00Z".into(),
            network_settings: NetworkSettings {
                ports: Some(HashMap::from([
                    (
                        "80/tcp".to_string(),
                        Some(vec![PortBinding {
                            host_ip: Some("0.0.0.0".into()),
                            host_port: Some("8080".into()),
                        }]),
                    ),
                    ("443/tcp".to_string(), None),
                ])),
                networks: Some(HashMap::from([(
                    "bridge".to_string(),
                    EndpointSettings {
                        ip_address: Some("172.17.0.2".into()),
                        ip_prefix_len: Some(16),
                        ..Default::default()
                    },
                )])),
            },
            ..Default::default()
        };
        inspect.config.image = "nginx:latest".into();

        let observation = container_observation(&inspect);
        assert_eq!(observation.name, "web");
        assert_eq!(observation.image.name, "nginx:latest");
        assert_eq!(observation.image.id, "sha256:1");
        assert!(observation.created.is_some());
        assert_eq!(observation.ports.len(), 2);
        assert_eq!(observation.ports[0].private_port, 80);
        assert_eq!(observation.ports[0].public_port, Some(8080));
        assert_eq!(observation.ports[1].private_port, 443);
        assert_eq!(observation.ports[1].public_port, None);
        assert_eq!(observation.networks["bridge"].ip_address, "172.17.0.2");
    }

    #[test]
    fn test_health_log_keeps_last_entries() {
        let engine_health = Health {
            status: "healthy".into(),
            failing_streak: 0,
            log: Some(
                (0..8)
                    .map(|i| HealthcheckResult {
                        exit_code: 0,
                        output: format!("run {i}"),
                        ..Default::default()
                    })
                    .collect(),
            ),
        };
        let observed = health(&engine_health);
        assert_eq!(observed.log.len(), HEALTH_LOG_LIMIT);
        assert_eq!(observed.log[0].output, "run 3");
        assert_eq!(observed.log[4].output, "run 7");
    }

    #[test]
    fn test_volume_observation() {
        let volume = Volume {
            name: "data".into(),
            driver: "local".into(),
            created_at: "2024-01-01T00:00:00Z".into(),
            labels: Some(HashMap::from([("a".to_string(), "b".to_string())])),
            ..Default::default()
        };
        let observed = volume_observation(&volume);
        assert_eq!(observed.labels["a"], "b");
        assert!(observed.created_at.is_some());
        assert!(observed.usage_data.is_none());
    }
}
