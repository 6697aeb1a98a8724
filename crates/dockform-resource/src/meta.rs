//! Record envelope shared by every resource kind.

use crate::condition::{Condition, ConditionType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// API group all records belong to.
pub const API_GROUP: &str = "dockform.io";

/// Annotation holding the engine-side identity of a record.
///
/// Its presence is the only thing that says "this record has been created".
pub const EXTERNAL_NAME_ANNOTATION: &str = "dockform.io/external-name";

/// Namespace assumed for records that do not declare one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Record metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Record name.
    pub name: String,
    /// Record namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Creates metadata with just a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Returns the engine-side identity, if the record has been created.
    #[must_use]
    pub fn external_name(&self) -> Option<&str> {
        self.annotations
            .get(EXTERNAL_NAME_ANNOTATION)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Records the engine-side identity.
    pub fn set_external_name(&mut self, name: impl Into<String>) {
        self.annotations
            .insert(EXTERNAL_NAME_ANNOTATION.to_string(), name.into());
    }

    /// Forgets the engine-side identity.
    pub fn clear_external_name(&mut self) {
        self.annotations.remove(EXTERNAL_NAME_ANNOTATION);
    }

    /// Returns the namespace, or [`DEFAULT_NAMESPACE`].
    #[must_use]
    pub fn namespace_or_default(&self) -> &str {
        self.namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(DEFAULT_NAMESPACE)
    }
}

/// Desired state wrapper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec<P> {
    /// Engine-facing parameters.
    pub for_provider: P,
}

/// Observed state wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus<O> {
    /// Conditions, at most one per type.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Last observation from the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_provider: Option<O>,
}

impl<O> Default for ResourceStatus<O> {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            at_provider: None,
        }
    }
}

impl<O> ResourceStatus<O> {
    /// Sets a condition, replacing any existing one of the same type.
    ///
    /// The transition time is kept when status and reason are unchanged.
    pub fn set_condition(&mut self, condition: Condition) {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.condition_type == condition.condition_type)
        {
            Some(existing) if existing.same_state(&condition) => {
                existing.message = condition.message;
            }
            Some(existing) => *existing = condition,
            None => self.conditions.push(condition),
        }
    }

    /// Returns the condition of the given type.
    #[must_use]
    pub fn condition(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }
}

/// A declarative record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource<P, O> {
    /// API version, e.g. `container.dockform.io/v1alpha1`.
    #[serde(default)]
    pub api_version: String,
    /// Kind, e.g. `Container`.
    #[serde(default)]
    pub kind: String,
    /// Metadata.
    pub metadata: ObjectMeta,
    /// Desired state.
    pub spec: ResourceSpec<P>,
    /// Observed state.
    #[serde(default)]
    pub status: ResourceStatus<O>,
}

impl<P, O> Resource<P, O> {
    /// Creates a record with empty status.
    #[must_use]
    pub fn new(metadata: ObjectMeta, for_provider: P) -> Self {
        Self {
            api_version: String::new(),
            kind: String::new(),
            metadata,
            spec: ResourceSpec { for_provider },
            status: ResourceStatus::default(),
        }
    }

    /// Returns the desired parameters.
    #[must_use]
    pub const fn params(&self) -> &P {
        &self.spec.for_provider
    }

    /// Returns the record name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Returns the engine-side identity, if created.
    #[must_use]
    pub fn external_name(&self) -> Option<&str> {
        self.metadata.external_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;

    #[test]
    fn test_external_name_roundtrip() {
        let mut meta = ObjectMeta::named("web");
        assert_eq!(meta.external_name(), None);

        meta.set_external_name("abc123");
        assert_eq!(meta.external_name(), Some("abc123"));
        assert_eq!(
            meta.annotations.get("dockform.io/external-name"),
            Some(&"abc123".to_string())
        );

        meta.clear_external_name();
        assert_eq!(meta.external_name(), None);
    }

    #[test]
    fn test_empty_external_name_means_not_created() {
        let mut meta = ObjectMeta::named("web");
        meta.set_external_name("");
        assert_eq!(meta.external_name(), None);
    }

    #[test]
    fn test_namespace_default() {
        let mut meta = ObjectMeta::named("web");
        assert_eq!(meta.namespace_or_default(), "default");
        meta.namespace = Some("team-a".to_string());
        assert_eq!(meta.namespace_or_default(), "team-a");
    }

    #[test]
    fn test_set_condition_replaces_same_type() {
        let mut status: ResourceStatus<()> = ResourceStatus::default();
        status.set_condition(Condition::creating());
        status.set_condition(Condition::available());
        assert_eq!(status.conditions.len(), 1);
        assert!(status.condition(ConditionType::Ready).unwrap().is_true());
    }

    #[test]
    fn test_set_condition_keeps_transition_time() {
        let mut status: ResourceStatus<()> = ResourceStatus::default();
        status.set_condition(Condition::available());
        let first = status.conditions[0].last_transition_time;
        status.set_condition(Condition::available());
        assert_eq!(status.conditions[0].last_transition_time, first);
    }
}
