//! Record-level adjustments applied on top of a decomposed document.

use crate::decompose::StackPlan;
use crate::error::{ComposeError, Result};
use dockform_resource::container::{EnvVar, RestartPolicy};
use dockform_resource::stack::ServiceOverride;
use std::collections::BTreeMap;
use tracing::warn;

/// Adds stack-wide variables to every service. A variable the service
/// already sets keeps the service's value.
pub fn inject_environment(plan: &mut StackPlan, env: &[EnvVar]) {
    for service in &mut plan.services {
        for var in env {
            if !service.params.environment.iter().any(|e| e.name == var.name) {
                service.params.environment.push(var.clone());
            }
        }
    }
}

/// Applies per-service overrides.
///
/// Environment entries replace same-named ones or are appended, labels are
/// merged, and a restart policy or resource block replaces the document's.
/// Only one container per service is managed, so a replica count above one
/// is reported and otherwise ignored. Overrides for services the document
/// does not define are skipped.
///
/// # Errors
///
/// Returns [`ComposeError::Validation`] for an unknown restart policy.
pub fn apply_overrides(
    plan: &mut StackPlan,
    overrides: &BTreeMap<String, ServiceOverride>,
) -> Result<()> {
    for (name, patch) in overrides {
        let Some(service) = plan.service_mut(name) else {
            warn!(service = %name, "override for undefined service ignored");
            continue;
        };
        let params = &mut service.params;

        if let Some(replicas) = patch.replicas.filter(|r| *r > 1) {
            warn!(service = %name, replicas, "only one container per service is managed");
        }
        if let Some(resources) = &patch.resources {
            params.resources = Some(resources.clone());
        }
        for var in &patch.environment {
            match params.environment.iter_mut().find(|e| e.name == var.name) {
                Some(existing) => *existing = var.clone(),
                None => params.environment.push(var.clone()),
            }
        }
        params
            .labels
            .extend(patch.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(restart) = patch.restart_policy.as_deref() {
            let (policy, retries) = RestartPolicy::parse(restart).ok_or_else(|| {
                ComposeError::validation(format!(
                    "override for service {name} has unknown restart policy {restart:?}"
                ))
            })?;
            params.restart_policy = Some(policy);
            params.maximum_retry_count = retries;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompose::decompose;
    use crate::model::ComposeFile;
    use dockform_resource::container::ResourceRequirements;

    fn plan() -> StackPlan {
        let file = ComposeFile::parse(
            r"
services:
  web:
    image: nginx
    restart: always
    environment: {MODE: dev, PORT: '80'}
    labels: {tier: front}
",
            &BTreeMap::new(),
        )
        .unwrap();
        decompose("shop", &file, None).unwrap()
    }

    #[test]
    fn test_inject_environment_keeps_service_values() {
        let mut plan = plan();
        let env = [EnvVar::literal("MODE", "prod"), EnvVar::literal("REGION", "eu")];
        inject_environment(&mut plan, &env);
        let vars = &plan.service("web").unwrap().params.environment;
        assert!(vars.contains(&EnvVar::literal("MODE", "dev")));
        assert!(vars.contains(&EnvVar::literal("REGION", "eu")));
    }

    #[test]
    fn test_overrides() {
        let mut plan = plan();
        let overrides = BTreeMap::from([(
            "web".to_string(),
            ServiceOverride {
                replicas: Some(3),
                resources: Some(ResourceRequirements {
                    limits: BTreeMap::from([("memory".to_string(), "256Mi".to_string())]),
                    requests: BTreeMap::new(),
                }),
                environment: vec![EnvVar::literal("MODE", "prod"), EnvVar::literal("DEBUG", "0")],
                labels: BTreeMap::from([("tier".to_string(), "edge".to_string())]),
                restart_policy: Some("on-failure:2".to_string()),
            },
        )]);
        apply_overrides(&mut plan, &overrides).unwrap();

        let params = &plan.service("web").unwrap().params;
        assert!(params.environment.contains(&EnvVar::literal("MODE", "prod")));
        assert!(params.environment.contains(&EnvVar::literal("DEBUG", "0")));
        assert!(!params.environment.contains(&EnvVar::literal("MODE", "dev")));
        assert_eq!(params.labels["tier"], "edge");
        assert_eq!(params.restart_policy, Some(RestartPolicy::OnFailure));
        assert_eq!(params.maximum_retry_count, Some(2));
        assert_eq!(params.resources.as_ref().unwrap().limits["memory"], "256Mi");
    }

    #[test]
    fn test_unknown_service_ignored_and_bad_policy_rejected() {
        let mut plan = plan();
        let ghost = BTreeMap::from([("ghost".to_string(), ServiceOverride::default())]);
        apply_overrides(&mut plan, &ghost).unwrap();

        let bad = BTreeMap::from([(
            "web".to_string(),
            ServiceOverride {
                restart_policy: Some("sometimes".to_string()),
                ..Default::default()
            },
        )]);
        assert!(apply_overrides(&mut plan, &bad).is_err());
    }
}
