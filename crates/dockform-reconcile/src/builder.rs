//! Container parameters to engine create request.
//!
//! The mapping is pure: it reads only the parameters it is given and either
//! returns a complete [`ContainerCreateRequest`] or a [`BuildError`]. Values
//! sourced from config maps or secrets must be resolved beforehand (see
//! [`crate::resolve`]).

use crate::error::BuildError;
use crate::quantity::{
    CPU_PERIOD, as_nanos, cpu_quota, cpu_shares, parse_byte_size, parse_cpu_millis,
    parse_duration,
};
use dockform_engine::{
    BindOptions, ContainerCreateRequest, EndpointIpamConfig, EndpointSettings, HealthConfig,
    HostConfig, Mount, MountType, NetworkingConfig, PortBinding, RestartPolicy as EngineRestart,
    TmpfsOptions,
};
use dockform_resource::container::{
    ContainerParameters, EnvVar, HealthCheck, NetworkAttachment, PortSpec, ProfileType,
    ResourceRequirements, RestartPolicy, SecurityContext, SecurityProfile, VolumeMount,
};
use std::collections::{BTreeMap, HashMap};

/// User assigned when `runAsNonRoot` is set without a uid.
pub const NOBODY_UID: &str = "65534";

/// Builds the engine create request for a container.
///
/// # Errors
///
/// Returns a [`BuildError`] for malformed sizes, durations or CPU
/// quantities, an empty health check test, an unusable volume source, an
/// unresolved `valueFrom` entry, or a root user under `runAsNonRoot`.
pub fn build_create_request(
    params: &ContainerParameters,
) -> Result<ContainerCreateRequest, BuildError> {
    if params.image.is_empty() {
        return Err(BuildError::MissingImage);
    }

    let mut request = ContainerCreateRequest {
        image: params.image.clone(),
        cmd: build_command(&params.command, &params.args),
        env: build_env(&params.environment)?,
        labels: non_empty_map(&params.labels),
        working_dir: params.working_dir.clone(),
        user: params.user.clone(),
        hostname: params.hostname.clone(),
        ..Default::default()
    };

    let mut host = HostConfig {
        network_mode: params.network_mode.clone(),
        privileged: params.privileged,
        init: params.init,
        auto_remove: params.remove,
        dns: non_empty_vec(&params.dns),
        dns_search: non_empty_vec(&params.dns_search),
        dns_options: non_empty_vec(&params.dns_options),
        extra_hosts: non_empty_vec(&params.extra_hosts),
        restart_policy: params
            .restart_policy
            .map(|policy| restart_policy(policy, params.maximum_retry_count)),
        ..Default::default()
    };

    let (exposed, bindings) = build_ports(&params.ports);
    request.exposed_ports = exposed;
    host.port_bindings = bindings;

    let (binds, mounts) = build_volumes(&params.volumes)?;
    host.binds = binds;
    host.mounts = mounts;

    if let Some(resources) = &params.resources {
        apply_resources(resources, &mut host)?;
    }
    if let Some(security) = &params.security_context {
        apply_security(security, &mut request, &mut host)?;
    }
    request.healthcheck = params
        .health_check
        .as_ref()
        .map(build_health_check)
        .transpose()?;
    request.networking_config = build_networks(&params.networks);
    request.host_config = Some(host);

    Ok(request)
}

fn non_empty_vec(items: &[String]) -> Option<Vec<String>> {
    (!items.is_empty()).then(|| items.to_vec())
}

fn non_empty_map(map: &BTreeMap<String, String>) -> Option<HashMap<String, String>> {
    (!map.is_empty()).then(|| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

fn build_command(command: &[String], args: &[String]) -> Option<Vec<String>> {
    let cmd: Vec<String> = command.iter().chain(args).cloned().collect();
    (!cmd.is_empty()).then_some(cmd)
}

/// Renders environment entries as `NAME=value`.
///
/// An entry with neither a value nor a reference renders as the bare name,
/// which tells the engine to inherit it from its own environment.
fn build_env(env: &[EnvVar]) -> Result<Option<Vec<String>>, BuildError> {
    if env.is_empty() {
        return Ok(None);
    }
    env.iter()
        .map(|var| match (&var.value, &var.value_from) {
            (Some(value), _) => Ok(format!("{}={value}", var.name)),
            (None, Some(_)) => Err(BuildError::UnresolvedEnv(var.name.clone())),
            (None, None) => Ok(var.name.clone()),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn restart_policy(policy: RestartPolicy, retries: Option<i32>) -> EngineRestart {
    EngineRestart {
        name: policy.as_str().to_string(),
        maximum_retry_count: if policy == RestartPolicy::OnFailure {
            retries
        } else {
            None
        },
    }
}

/// Engine key for a port: `<port>/<protocol>`, protocol lowercased.
#[must_use]
pub fn port_key(port: &PortSpec) -> String {
    let protocol = port
        .protocol
        .as_deref()
        .filter(|p| !p.is_empty())
        .unwrap_or("tcp")
        .to_lowercase();
    format!("{}/{protocol}", port.container_port)
}

#[allow(clippy::zero_sized_map_values, clippy::type_complexity)]
fn build_ports(
    ports: &[PortSpec],
) -> (
    Option<HashMap<String, HashMap<(), ()>>>,
    Option<HashMap<String, Vec<PortBinding>>>,
) {
    if ports.is_empty() {
        return (None, None);
    }
    let mut exposed = HashMap::new();
    let mut bindings = HashMap::new();
    for port in ports {
        let key = port_key(port);
        exposed.insert(key.clone(), HashMap::new());
        if let Some(host_port) = port.host_port {
            bindings.insert(
                key,
                vec![PortBinding {
                    host_ip: port.host_ip.clone(),
                    host_port: Some(host_port.to_string()),
                }],
            );
        }
    }
    let bindings = (!bindings.is_empty()).then_some(bindings);
    (Some(exposed), bindings)
}

fn build_volumes(
    volumes: &[VolumeMount],
) -> Result<(Option<Vec<String>>, Option<Vec<Mount>>), BuildError> {
    let mut binds = Vec::new();
    let mut mounts = Vec::new();

    for volume in volumes {
        let read_only = volume.is_read_only();
        let source = &volume.source;

        if let Some(host_path) = &source.host_path {
            let mut bind = format!("{}:{}", host_path.path, volume.mount_path);
            if read_only {
                bind.push_str(":ro");
            }
            binds.push(bind);
        } else if let Some(named) = &source.volume {
            mounts.push(Mount {
                target: volume.mount_path.clone(),
                source: Some(named.volume_name.clone()).filter(|name| !name.is_empty()),
                mount_type: MountType::Volume,
                read_only: read_only.then_some(true),
                ..Default::default()
            });
        } else if let Some(bind) = &source.bind {
            if bind.source_path.is_empty() {
                return Err(BuildError::MissingBindSource(volume.name.clone()));
            }
            mounts.push(Mount {
                target: volume.mount_path.clone(),
                source: Some(bind.source_path.clone()),
                mount_type: MountType::Bind,
                read_only: read_only.then_some(true),
                bind_options: bind.propagation.map(|p| BindOptions {
                    propagation: Some(p.as_str().to_string()),
                }),
                ..Default::default()
            });
        } else if let Some(empty_dir) = &source.empty_dir {
            let size_bytes = empty_dir
                .size_limit
                .as_deref()
                .map(parse_byte_size)
                .transpose()?;
            mounts.push(Mount {
                target: volume.mount_path.clone(),
                mount_type: MountType::Tmpfs,
                read_only: read_only.then_some(true),
                tmpfs_options: size_bytes.map(|size| TmpfsOptions {
                    size_bytes: Some(size),
                    mode: None,
                }),
                ..Default::default()
            });
        } else if source.secret.is_some() || source.config_map.is_some() {
            // Materialized by whoever owns the secret store, not by the engine.
        } else {
            return Err(BuildError::UnsupportedVolumeSource(volume.name.clone()));
        }
    }

    Ok((
        (!binds.is_empty()).then_some(binds),
        (!mounts.is_empty()).then_some(mounts),
    ))
}

fn build_networks(networks: &[NetworkAttachment]) -> Option<NetworkingConfig> {
    if networks.is_empty() {
        return None;
    }
    let endpoints_config = networks
        .iter()
        .map(|attachment| {
            let ipam_config = (attachment.ip_address.is_some()
                || attachment.ipv6_address.is_some())
            .then(|| EndpointIpamConfig {
                ipv4_address: attachment.ip_address.clone(),
                ipv6_address: attachment.ipv6_address.clone(),
            });
            let endpoint = EndpointSettings {
                ipam_config,
                aliases: non_empty_vec(&attachment.aliases),
                links: non_empty_vec(&attachment.links),
                ..Default::default()
            };
            (attachment.name.clone(), endpoint)
        })
        .collect();
    Some(NetworkingConfig { endpoints_config })
}

fn apply_resources(
    resources: &ResourceRequirements,
    host: &mut HostConfig,
) -> Result<(), BuildError> {
    if let Some(memory) = resources.limits.get("memory") {
        host.memory = Some(parse_byte_size(memory)?);
    }
    if let Some(cpu) = resources.limits.get("cpu") {
        host.cpu_quota = Some(cpu_quota(parse_cpu_millis(cpu)?));
        host.cpu_period = Some(CPU_PERIOD);
    }
    if let Some(memory) = resources.requests.get("memory") {
        host.memory_reservation = Some(parse_byte_size(memory)?);
    }
    if let Some(cpu) = resources.requests.get("cpu") {
        host.cpu_shares = Some(cpu_shares(parse_cpu_millis(cpu)?));
    }
    Ok(())
}

fn apply_security(
    security: &SecurityContext,
    request: &mut ContainerCreateRequest,
    host: &mut HostConfig,
) -> Result<(), BuildError> {
    let non_root = security.run_as_non_root.unwrap_or(false);

    let mut user = match security.run_as_user {
        Some(0) if non_root => return Err(BuildError::RunAsRoot),
        Some(uid) => Some(uid.to_string()),
        None => request.user.clone().filter(|u| !u.is_empty()),
    };
    if non_root {
        match user.as_deref() {
            None => user = Some(NOBODY_UID.to_string()),
            Some(u) if is_root_user(u) => return Err(BuildError::RunAsRoot),
            Some(_) => {}
        }
    }
    if let Some(gid) = security.run_as_group {
        user = Some(format!("{}:{gid}", user.unwrap_or_default()));
    }
    request.user = user;

    if security.read_only_root_filesystem == Some(true) {
        host.readonly_rootfs = Some(true);
    }
    if let Some(caps) = &security.capabilities {
        host.cap_add = non_empty_vec(&caps.add);
        host.cap_drop = non_empty_vec(&caps.drop);
    }

    let mut opts = Vec::new();
    if let Some(selinux) = &security.se_linux_options {
        let parts: Vec<String> = [
            ("user", &selinux.user),
            ("role", &selinux.role),
            ("type", &selinux.label_type),
            ("level", &selinux.level),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| format!("{key}:{v}")))
        .collect();
        if !parts.is_empty() {
            opts.push(format!("label:{}", parts.join(",")));
        }
    }
    if let Some(profile) = &security.seccomp_profile {
        opts.extend(profile_option("seccomp", "runtime/default", profile));
    }
    if let Some(profile) = &security.app_armor_profile {
        opts.extend(profile_option("apparmor", "docker-default", profile));
    }
    if security.allow_privilege_escalation == Some(false) {
        opts.push("no-new-privileges:true".to_string());
    }
    if !opts.is_empty() {
        host.security_opt = Some(opts);
    }
    Ok(())
}

fn is_root_user(user: &str) -> bool {
    let name = user.split(':').next().unwrap_or_default();
    name == "0" || name == "root"
}

/// `Localhost` without a path yields no option.
fn profile_option(
    prefix: &str,
    runtime_default: &str,
    profile: &SecurityProfile,
) -> Option<String> {
    match profile.profile_type {
        ProfileType::RuntimeDefault => Some(format!("{prefix}:{runtime_default}")),
        ProfileType::Unconfined => Some(format!("{prefix}:unconfined")),
        ProfileType::Localhost => profile
            .localhost_profile
            .as_ref()
            .map(|path| format!("{prefix}:{path}")),
    }
}

fn build_health_check(check: &HealthCheck) -> Result<HealthConfig, BuildError> {
    if check.test.is_empty() {
        return Err(BuildError::EmptyHealthCheck);
    }
    let nanos = |field: &'static str, value: &Option<String>| {
        value
            .as_deref()
            .map(|v| parse_duration(field, v).map(as_nanos))
            .transpose()
    };
    Ok(HealthConfig {
        test: check.test.clone(),
        interval: nanos("interval", &check.interval)?,
        timeout: nanos("timeout", &check.timeout)?,
        start_period: nanos("startPeriod", &check.start_period)?,
        retries: check.retries.map(i64::from),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockform_resource::container::{
        BindSource, Capabilities, EmptyDirSource, EnvVarSource, HostPathSource, KeySelector,
        NamedVolumeSource, Propagation, SeLinuxOptions, SecretSource, VolumeSource,
    };

    fn params() -> ContainerParameters {
        ContainerParameters::for_image("nginx:latest")
    }

    fn mount(name: &str, path: &str, source: VolumeSource) -> VolumeMount {
        VolumeMount {
            name: name.to_string(),
            mount_path: path.to_string(),
            read_only: None,
            source,
        }
    }

    fn host(request: &ContainerCreateRequest) -> &HostConfig {
        request.host_config.as_ref().unwrap()
    }

    #[test]
    fn test_minimal_request() {
        let request = build_create_request(&params()).unwrap();
        assert_eq!(request.image, "nginx:latest");
        assert!(request.cmd.is_none());
        assert!(request.env.is_none());
        assert!(request.exposed_ports.is_none());
        assert!(request.healthcheck.is_none());
        assert!(request.networking_config.is_none());
        assert!(host(&request).restart_policy.is_none());
    }

    #[test]
    fn test_empty_image_rejected() {
        let err = build_create_request(&ContainerParameters::default()).unwrap_err();
        assert_eq!(err, BuildError::MissingImage);
    }

    #[test]
    fn test_command_and_args_concatenate() {
        let mut p = params();
        p.args = vec!["-g".into(), "daemon off;".into()];
        assert_eq!(
            build_create_request(&p).unwrap().cmd,
            Some(vec!["-g".to_string(), "daemon off;".to_string()])
        );
        p.command = vec!["nginx".into()];
        assert_eq!(build_create_request(&p).unwrap().cmd.unwrap().len(), 3);
    }

    #[test]
    fn test_ports_exposed_and_bound() {
        let mut p = params();
        p.ports = vec![
            PortSpec {
                container_port: 80,
                host_port: Some(8080),
                host_ip: Some("127.0.0.1".into()),
                protocol: Some("TCP".into()),
            },
            PortSpec {
                container_port: 53,
                protocol: Some("UDP".into()),
                ..Default::default()
            },
        ];
        let request = build_create_request(&p).unwrap();
        let exposed = request.exposed_ports.as_ref().unwrap();
        assert!(exposed.contains_key("80/tcp"));
        assert!(exposed.contains_key("53/udp"));

        let bindings = host(&request).port_bindings.as_ref().unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings["80/tcp"][0].host_port.as_deref(), Some("8080"));
        assert_eq!(bindings["80/tcp"][0].host_ip.as_deref(), Some("127.0.0.1"));
    }

    #[test]
    fn test_env_rendering() {
        let mut p = params();
        p.environment = vec![EnvVar::literal("MODE", "prod"), EnvVar::inherited("HOME")];
        assert_eq!(
            build_create_request(&p).unwrap().env,
            Some(vec!["MODE=prod".to_string(), "HOME".to_string()])
        );

        p.environment.push(EnvVar {
            name: "TOKEN".into(),
            value: None,
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(KeySelector {
                    name: "creds".into(),
                    key: "token".into(),
                    ..Default::default()
                }),
                config_map_key_ref: None,
            }),
        });
        assert_eq!(
            build_create_request(&p).unwrap_err(),
            BuildError::UnresolvedEnv("TOKEN".into())
        );
    }

    #[test]
    fn test_volume_sources() {
        let mut p = params();
        p.volumes = vec![
            VolumeMount {
                read_only: Some(true),
                ..mount(
                    "conf",
                    "/etc/nginx",
                    VolumeSource {
                        host_path: Some(HostPathSource {
                            path: "/srv/conf".into(),
                            path_type: None,
                        }),
                        ..Default::default()
                    },
                )
            },
            mount(
                "data",
                "/data",
                VolumeSource {
                    volume: Some(NamedVolumeSource {
                        volume_name: "app-data".into(),
                    }),
                    ..Default::default()
                },
            ),
            mount(
                "shared",
                "/mnt/shared",
                VolumeSource {
                    bind: Some(BindSource {
                        source_path: "/mnt".into(),
                        propagation: Some(Propagation::Rshared),
                    }),
                    ..Default::default()
                },
            ),
            mount(
                "scratch",
                "/tmp",
                VolumeSource {
                    empty_dir: Some(EmptyDirSource {
                        size_limit: Some("64Mi".into()),
                    }),
                    ..Default::default()
                },
            ),
            mount(
                "creds",
                "/run/secrets",
                VolumeSource {
                    secret: Some(SecretSource {
                        secret_name: "creds".into(),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ),
        ];
        let request = build_create_request(&p).unwrap();
        let host = host(&request);
        assert_eq!(host.binds, Some(vec!["/srv/conf:/etc/nginx:ro".to_string()]));

        let mounts = host.mounts.as_ref().unwrap();
        assert_eq!(mounts.len(), 3);
        assert_eq!(mounts[0].mount_type, MountType::Volume);
        assert_eq!(mounts[0].source.as_deref(), Some("app-data"));
        assert_eq!(mounts[1].mount_type, MountType::Bind);
        assert_eq!(
            mounts[1].bind_options.as_ref().unwrap().propagation.as_deref(),
            Some("rshared")
        );
        assert_eq!(mounts[2].mount_type, MountType::Tmpfs);
        assert_eq!(
            mounts[2].tmpfs_options.as_ref().unwrap().size_bytes,
            Some(64 * 1024 * 1024)
        );
    }

    #[test]
    fn test_volume_errors() {
        let mut p = params();
        p.volumes = vec![mount("nothing", "/x", VolumeSource::default())];
        assert_eq!(
            build_create_request(&p).unwrap_err(),
            BuildError::UnsupportedVolumeSource("nothing".into())
        );

        p.volumes = vec![mount(
            "bind",
            "/x",
            VolumeSource {
                bind: Some(BindSource::default()),
                ..Default::default()
            },
        )];
        assert_eq!(
            build_create_request(&p).unwrap_err(),
            BuildError::MissingBindSource("bind".into())
        );

        p.volumes = vec![mount(
            "tmp",
            "/tmp",
            VolumeSource {
                empty_dir: Some(EmptyDirSource {
                    size_limit: Some("64MB".into()),
                }),
                ..Default::default()
            },
        )];
        assert_eq!(
            build_create_request(&p).unwrap_err(),
            BuildError::InvalidSize("64MB".into())
        );
    }

    #[test]
    fn test_network_attachments() {
        let mut p = params();
        p.networks = vec![
            NetworkAttachment {
                name: "backend".into(),
                aliases: vec!["api".into()],
                ip_address: Some("10.0.0.5".into()),
                ..Default::default()
            },
            NetworkAttachment {
                name: "frontend".into(),
                ..Default::default()
            },
        ];
        let request = build_create_request(&p).unwrap();
        let endpoints = &request.networking_config.as_ref().unwrap().endpoints_config;
        assert_eq!(endpoints.len(), 2);
        let backend = &endpoints["backend"];
        assert_eq!(
            backend.ipam_config.as_ref().unwrap().ipv4_address.as_deref(),
            Some("10.0.0.5")
        );
        assert_eq!(backend.aliases, Some(vec!["api".to_string()]));
        assert!(endpoints["frontend"].ipam_config.is_none());
    }

    #[test]
    fn test_security_options() {
        let mut p = params();
        p.security_context = Some(SecurityContext {
            run_as_user: Some(1000),
            run_as_group: Some(2000),
            read_only_root_filesystem: Some(true),
            allow_privilege_escalation: Some(false),
            capabilities: Some(Capabilities {
                add: vec!["NET_ADMIN".into()],
                drop: vec!["ALL".into()],
            }),
            se_linux_options: Some(SeLinuxOptions {
                user: Some("system_u".into()),
                label_type: Some("spc_t".into()),
                ..Default::default()
            }),
            seccomp_profile: Some(SecurityProfile {
                profile_type: ProfileType::RuntimeDefault,
                localhost_profile: None,
            }),
            app_armor_profile: Some(SecurityProfile {
                profile_type: ProfileType::Localhost,
                localhost_profile: Some("my-profile".into()),
            }),
            ..Default::default()
        });
        let request = build_create_request(&p).unwrap();
        assert_eq!(request.user.as_deref(), Some("1000:2000"));
        let host = host(&request);
        assert_eq!(host.readonly_rootfs, Some(true));
        assert_eq!(host.cap_add, Some(vec!["NET_ADMIN".to_string()]));
        assert_eq!(host.cap_drop, Some(vec!["ALL".to_string()]));
        assert_eq!(
            host.security_opt.as_deref().unwrap(),
            [
                "label:user:system_u,type:spc_t",
                "seccomp:runtime/default",
                "apparmor:my-profile",
                "no-new-privileges:true",
            ]
        );
    }

    #[test]
    fn test_group_only_user() {
        let mut p = params();
        p.security_context = Some(SecurityContext {
            run_as_group: Some(50),
            ..Default::default()
        });
        assert_eq!(build_create_request(&p).unwrap().user.as_deref(), Some(":50"));
    }

    #[test]
    fn test_run_as_non_root() {
        let mut p = params();
        p.security_context = Some(SecurityContext {
            run_as_non_root: Some(true),
            ..Default::default()
        });
        assert_eq!(build_create_request(&p).unwrap().user.as_deref(), Some("65534"));

        p.user = Some("root".into());
        assert_eq!(build_create_request(&p).unwrap_err(), BuildError::RunAsRoot);

        p.user = None;
        p.security_context = Some(SecurityContext {
            run_as_non_root: Some(true),
            run_as_user: Some(0),
            ..Default::default()
        });
        assert_eq!(build_create_request(&p).unwrap_err(), BuildError::RunAsRoot);
    }

    #[test]
    fn test_unconfined_profiles() {
        let mut p = params();
        p.security_context = Some(SecurityContext {
            seccomp_profile: Some(SecurityProfile {
                profile_type: ProfileType::Unconfined,
                localhost_profile: None,
            }),
            app_armor_profile: Some(SecurityProfile {
                profile_type: ProfileType::RuntimeDefault,
                localhost_profile: None,
            }),
            ..Default::default()
        });
        let request = build_create_request(&p).unwrap();
        assert_eq!(
            host(&request).security_opt.as_deref().unwrap(),
            ["seccomp:unconfined", "apparmor:docker-default"]
        );
    }

    #[test]
    fn test_health_check() {
        let mut p = params();
        p.health_check = Some(HealthCheck {
            test: vec!["CMD-SHELL".into(), "curl -f localhost".into()],
            interval: Some("30s".into()),
            timeout: Some("5s".into()),
            start_period: Some("1m".into()),
            retries: Some(3),
        });
        let health = build_create_request(&p).unwrap().healthcheck.unwrap();
        assert_eq!(health.interval, Some(30_000_000_000));
        assert_eq!(health.timeout, Some(5_000_000_000));
        assert_eq!(health.start_period, Some(60_000_000_000));
        assert_eq!(health.retries, Some(3));

        p.health_check = Some(HealthCheck::default());
        assert_eq!(build_create_request(&p).unwrap_err(), BuildError::EmptyHealthCheck);

        p.health_check = Some(HealthCheck {
            test: vec!["CMD".into(), "true".into()],
            interval: Some("often".into()),
            ..Default::default()
        });
        assert!(matches!(
            build_create_request(&p).unwrap_err(),
            BuildError::InvalidDuration { field: "interval", .. }
        ));
    }

    #[test]
    fn test_restart_policy_retry_only_on_failure() {
        let mut p = params();
        p.restart_policy = Some(RestartPolicy::Always);
        p.maximum_retry_count = Some(5);
        let request = build_create_request(&p).unwrap();
        let policy = host(&request).restart_policy.as_ref().unwrap();
        assert_eq!(policy.name, "always");
        assert_eq!(policy.maximum_retry_count, None);

        p.restart_policy = Some(RestartPolicy::OnFailure);
        let request = build_create_request(&p).unwrap();
        let policy = host(&request).restart_policy.as_ref().unwrap();
        assert_eq!(policy.name, "on-failure");
        assert_eq!(policy.maximum_retry_count, Some(5));
    }

    #[test]
    fn test_resources() {
        let mut p = params();
        p.resources = Some(ResourceRequirements {
            limits: BTreeMap::from([
                ("memory".to_string(), "512Mi".to_string()),
                ("cpu".to_string(), "1.5".to_string()),
            ]),
            requests: BTreeMap::from([
                ("memory".to_string(), "256Mi".to_string()),
                ("cpu".to_string(), "500m".to_string()),
            ]),
        });
        let request = build_create_request(&p).unwrap();
        let host = host(&request);
        assert_eq!(host.memory, Some(512 * 1024 * 1024));
        assert_eq!(host.cpu_quota, Some(150_000));
        assert_eq!(host.cpu_period, Some(100_000));
        assert_eq!(host.memory_reservation, Some(256 * 1024 * 1024));
        assert_eq!(host.cpu_shares, Some(512));
    }

    #[test]
    fn test_oversized_cpu_is_rejected() {
        let mut p = params();
        p.resources = Some(ResourceRequirements {
            limits: BTreeMap::from([("cpu".to_string(), "99999999999999999m".to_string())]),
            requests: BTreeMap::new(),
        });
        assert_eq!(
            build_create_request(&p).unwrap_err(),
            BuildError::InvalidCpu("99999999999999999m".to_string())
        );

        p.resources = Some(ResourceRequirements {
            limits: BTreeMap::new(),
            requests: BTreeMap::from([("cpu".to_string(), "1e300".to_string())]),
        });
        assert!(matches!(
            build_create_request(&p),
            Err(BuildError::InvalidCpu(_))
        ));
    }

    #[test]
    fn test_host_passthrough_fields() {
        let mut p = params();
        p.network_mode = Some("host".into());
        p.privileged = Some(true);
        p.init = Some(true);
        p.remove = Some(true);
        p.dns = vec!["1.1.1.1".into()];
        p.extra_hosts = vec!["db:10.0.0.2".into()];
        p.labels = BTreeMap::from([("tier".to_string(), "web".to_string())]);
        let request = build_create_request(&p).unwrap();
        let host = host(&request);
        assert_eq!(host.network_mode.as_deref(), Some("host"));
        assert_eq!(host.privileged, Some(true));
        assert_eq!(host.init, Some(true));
        assert_eq!(host.auto_remove, Some(true));
        assert_eq!(host.dns, Some(vec!["1.1.1.1".to_string()]));
        assert_eq!(host.extra_hosts, Some(vec!["db:10.0.0.2".to_string()]));
        assert_eq!(request.labels.unwrap()["tier"], "web");
    }
}
