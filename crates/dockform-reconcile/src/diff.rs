//! Drift detection.
//!
//! Each check short-circuits: the first mismatch found is the reason
//! reported. Whether a container is running is not configuration and is
//! never compared here.

use dockform_engine::{ContainerInspectResponse, Network, Volume};
use dockform_resource::container::{ContainerParameters, EnvVar, RestartPolicy};
use dockform_resource::network::NetworkParameters;
use dockform_resource::volume::VolumeParameters;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Outcome of comparing desired with observed configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Observed configuration satisfies the desired one.
    UpToDate,
    /// Observed configuration differs.
    Drifted(String),
}

impl Verdict {
    /// Returns true for [`Verdict::UpToDate`].
    #[must_use]
    pub const fn is_up_to_date(&self) -> bool {
        matches!(self, Self::UpToDate)
    }

    /// Drift reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::UpToDate => None,
            Self::Drifted(reason) => Some(reason),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpToDate => f.write_str("up to date"),
            Self::Drifted(reason) => write!(f, "drifted: {reason}"),
        }
    }
}

macro_rules! drifted {
    ($($arg:tt)*) => {
        return Verdict::Drifted(format!($($arg)*))
    };
}

/// Compares a container's desired parameters against its inspect output.
#[must_use]
pub fn container_verdict(
    params: &ContainerParameters,
    observed: &ContainerInspectResponse,
) -> Verdict {
    if observed.config.image != params.image {
        drifted!(
            "image {:?} does not match {:?}",
            observed.config.image,
            params.image
        );
    }

    if let Some(policy) = params.restart_policy {
        let Some(actual) = &observed.host_config.restart_policy else {
            drifted!("restart policy {policy} is not set");
        };
        if actual.name != policy.as_str() {
            drifted!("restart policy {:?} does not match {policy}", actual.name);
        }
        if policy == RestartPolicy::OnFailure {
            if let Some(wanted) = params.maximum_retry_count {
                let actual = actual.maximum_retry_count.unwrap_or(0);
                if actual != wanted {
                    drifted!("maximum retry count {actual} does not match {wanted}");
                }
            }
        }
    }

    if let Some(name) = env_mismatch(&params.environment, observed.config.env.as_deref()) {
        drifted!("environment variable {name} differs");
    }

    if let Some(key) = label_mismatch(&params.labels, observed.config.labels.as_ref()) {
        drifted!("label {key} differs");
    }

    if let Some(wanted) = params.privileged {
        let actual = observed.host_config.privileged.unwrap_or(false);
        if actual != wanted {
            drifted!("privileged {actual} does not match {wanted}");
        }
    }

    if observed
        .state
        .health
        .as_ref()
        .is_some_and(|h| h.status == "unhealthy")
    {
        drifted!("container is unhealthy");
    }

    Verdict::UpToDate
}

/// Compares a volume's desired parameters against its inspect output.
#[must_use]
pub fn volume_verdict(params: &VolumeParameters, observed: &Volume) -> Verdict {
    let driver = params.driver_or_default();
    if observed.driver != driver {
        drifted!("driver {:?} does not match {driver:?}", observed.driver);
    }
    if let Some(key) = label_mismatch(&params.labels, observed.labels.as_ref()) {
        drifted!("label {key} differs");
    }
    Verdict::UpToDate
}

/// Compares a network's desired parameters against its inspect output.
#[must_use]
pub fn network_verdict(params: &NetworkParameters, observed: &Network) -> Verdict {
    let driver = params.driver_or_default();
    if observed.driver != driver {
        drifted!("driver {:?} does not match {driver:?}", observed.driver);
    }
    if let Some(key) = label_mismatch(&params.labels, observed.labels.as_ref()) {
        drifted!("label {key} differs");
    }
    Verdict::UpToDate
}

/// First declared literal env entry missing from, or different in, the
/// observed `NAME=value` list. Referenced and valueless entries are skipped.
fn env_mismatch<'a>(declared: &'a [EnvVar], observed: Option<&[String]>) -> Option<&'a str> {
    let observed: HashMap<&str, &str> = observed
        .unwrap_or_default()
        .iter()
        .map(|entry| entry.split_once('=').unwrap_or((entry.as_str(), "")))
        .collect();
    declared
        .iter()
        .filter_map(|var| var.value.as_deref().map(|value| (var.name.as_str(), value)))
        .find(|(name, value)| observed.get(name) != Some(value))
        .map(|(name, _)| name)
}

fn label_mismatch<'a>(
    declared: &'a BTreeMap<String, String>,
    observed: Option<&HashMap<String, String>>,
) -> Option<&'a str> {
    declared
        .iter()
        .find(|(key, value)| observed.and_then(|o| o.get(*key)) != Some(*value))
        .map(|(key, _)| key.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockform_engine::{Health, HostConfig, RestartPolicy as EngineRestart};

    fn observed(image: &str, env: &[&str]) -> ContainerInspectResponse {
        let mut inspect = ContainerInspectResponse::default();
        inspect.config.image = image.to_string();
        inspect.config.env = Some(env.iter().map(ToString::to_string).collect());
        inspect
    }

    fn desired(image: &str, env: &[(&str, &str)]) -> ContainerParameters {
        let mut params = ContainerParameters::for_image(image);
        params.environment = env.iter().map(|(k, v)| EnvVar::literal(*k, *v)).collect();
        params
    }

    #[test]
    fn test_identical_is_up_to_date() {
        let verdict =
            container_verdict(&desired("nginx:latest", &[]), &observed("nginx:latest", &[]));
        assert_eq!(verdict, Verdict::UpToDate);
    }

    #[test]
    fn test_image_mismatch_always_drifts() {
        let verdict = container_verdict(
            &desired("nginx:1.21", &[("A", "1")]),
            &observed("nginx:1.20", &["A=1"]),
        );
        assert!(!verdict.is_up_to_date());
        assert!(verdict.reason().unwrap().contains("image"));
    }

    #[test]
    fn test_env_superset_is_up_to_date() {
        let verdict = container_verdict(
            &desired("app", &[("A", "1")]),
            &observed("app", &["A=1", "B=2", "PATH=/usr/bin"]),
        );
        assert!(verdict.is_up_to_date());
    }

    #[test]
    fn test_env_missing_drifts() {
        let verdict = container_verdict(
            &desired("app", &[("A", "1"), ("C", "3")]),
            &observed("app", &["A=1", "B=2"]),
        );
        assert_eq!(verdict, Verdict::Drifted("environment variable C differs".into()));
    }

    #[test]
    fn test_env_value_with_equals_sign() {
        let verdict = container_verdict(
            &desired("app", &[("URL", "a=b")]),
            &observed("app", &["URL=a=b"]),
        );
        assert!(verdict.is_up_to_date());
    }

    #[test]
    fn test_referenced_env_is_exempt() {
        let mut params = desired("app", &[]);
        params.environment.push(EnvVar {
            name: "TOKEN".into(),
            value: None,
            value_from: Some(Default::default()),
        });
        assert!(container_verdict(&params, &observed("app", &[])).is_up_to_date());
    }

    #[test]
    fn test_ports_are_not_compared() {
        let mut params = desired("nginx:latest", &[]);
        params.ports = vec![dockform_resource::container::PortSpec {
            container_port: 80,
            host_port: Some(8080),
            ..Default::default()
        }];
        assert!(container_verdict(&params, &observed("nginx:latest", &[])).is_up_to_date());
    }

    #[test]
    fn test_restart_policy() {
        let mut params = desired("app", &[]);
        params.restart_policy = Some(RestartPolicy::OnFailure);
        params.maximum_retry_count = Some(3);

        let mut inspect = observed("app", &[]);
        assert!(!container_verdict(&params, &inspect).is_up_to_date());

        inspect.host_config = HostConfig {
            restart_policy: Some(EngineRestart {
                name: "on-failure".into(),
                maximum_retry_count: Some(3),
            }),
            ..Default::default()
        };
        assert!(container_verdict(&params, &inspect).is_up_to_date());

        params.maximum_retry_count = Some(5);
        assert!(!container_verdict(&params, &inspect).is_up_to_date());

        params.restart_policy = Some(RestartPolicy::Always);
        assert!(!container_verdict(&params, &inspect).is_up_to_date());
    }

    #[test]
    fn test_labels_and_privileged() {
        let mut params = desired("app", &[]);
        params.labels.insert("tier".into(), "web".into());
        let mut inspect = observed("app", &[]);
        assert_eq!(
            container_verdict(&params, &inspect),
            Verdict::Drifted("label tier differs".into())
        );

        inspect.config.labels = Some(HashMap::from([
            ("tier".to_string(), "web".to_string()),
            ("extra".to_string(), "x".to_string()),
        ]));
        assert!(container_verdict(&params, &inspect).is_up_to_date());

        params.privileged = Some(true);
        assert!(!container_verdict(&params, &inspect).is_up_to_date());
        inspect.host_config.privileged = Some(true);
        assert!(container_verdict(&params, &inspect).is_up_to_date());
    }

    #[test]
    fn test_unhealthy_drifts() {
        let mut inspect = observed("app", &[]);
        inspect.state.health = Some(Health {
            status: "unhealthy".into(),
            failing_streak: 3,
            log: None,
        });
        let verdict = container_verdict(&desired("app", &[]), &inspect);
        assert_eq!(verdict, Verdict::Drifted("container is unhealthy".into()));
    }

    #[test]
    fn test_volume_and_network_verdicts() {
        let mut volume = Volume {
            driver: "local".into(),
            ..Default::default()
        };
        let mut params = VolumeParameters::default();
        assert!(volume_verdict(&params, &volume).is_up_to_date());

        params.labels.insert("app".into(), "db".into());
        assert!(!volume_verdict(&params, &volume).is_up_to_date());
        volume.labels = Some(HashMap::from([("app".to_string(), "db".to_string())]));
        assert!(volume_verdict(&params, &volume).is_up_to_date());

        let network = Network {
            driver: "overlay".into(),
            ..Default::default()
        };
        assert!(!network_verdict(&NetworkParameters::default(), &network).is_up_to_date());
    }
}
