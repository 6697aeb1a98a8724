//! Config map and secret value lookup.
//!
//! Records may take environment values and whole documents from config maps
//! or secrets owned by an outer control plane. Controllers resolve those
//! references through a [`ValueSource`] before building anything, so the
//! builder only ever sees literal values.

use crate::error::ResolveError;
use async_trait::async_trait;
use dockform_resource::container::{EnvVar, KeySelector};
use dockform_resource::stack::{ComposeReference, ObjectKeyReference};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::warn;

/// Kind of object holding referenced values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Config map.
    ConfigMap,
    /// Secret.
    Secret,
}

impl SourceKind {
    /// Lowercase name used in messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConfigMap => "configmap",
            Self::Secret => "secret",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Looks up one key of a config map or secret.
#[async_trait]
pub trait ValueSource: Send + Sync {
    /// Returns the value, or `None` if the object or key does not exist.
    async fn lookup(
        &self,
        kind: SourceKind,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<String>, ResolveError>;
}

/// In-memory [`ValueSource`].
#[derive(Debug, Clone, Default)]
pub struct MapValueSource {
    objects: HashMap<(SourceKind, String, String), BTreeMap<String, String>>,
}

impl MapValueSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an object.
    pub fn insert(
        &mut self,
        kind: SourceKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
        data: BTreeMap<String, String>,
    ) {
        self.objects
            .insert((kind, namespace.into(), name.into()), data);
    }

    /// Adds a config map.
    #[must_use]
    pub fn with_config_map<I, K, V>(mut self, namespace: &str, name: &str, data: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let data = data.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.insert(SourceKind::ConfigMap, namespace, name, data);
        self
    }

    /// Adds a secret.
    #[must_use]
    pub fn with_secret<I, K, V>(mut self, namespace: &str, name: &str, data: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let data = data.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.insert(SourceKind::Secret, namespace, name, data);
        self
    }
}

#[async_trait]
impl ValueSource for MapValueSource {
    async fn lookup(
        &self,
        kind: SourceKind,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<String>, ResolveError> {
        Ok(self
            .objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .and_then(|data| data.get(key))
            .cloned())
    }
}

/// Replaces `valueFrom` entries with literal values.
///
/// References default to `namespace`. An optional reference that resolves
/// to nothing drops its entry; a required one is an error. Entries with a
/// literal value, or with no value at all, pass through unchanged.
///
/// # Errors
///
/// Returns [`ResolveError::Missing`] for a required reference with no value,
/// [`ResolveError::EmptyReference`] for a `valueFrom` naming no source, or
/// whatever the source reports.
pub async fn resolve_env(
    env: &[EnvVar],
    namespace: &str,
    source: &dyn ValueSource,
) -> Result<Vec<EnvVar>, ResolveError> {
    let mut resolved = Vec::with_capacity(env.len());
    for var in env {
        let Some(value_from) = var.value_from.as_ref().filter(|_| var.value.is_none()) else {
            resolved.push(EnvVar {
                value_from: None,
                ..var.clone()
            });
            continue;
        };
        let (kind, selector) = match (&value_from.secret_key_ref, &value_from.config_map_key_ref) {
            (Some(selector), _) => (SourceKind::Secret, selector),
            (None, Some(selector)) => (SourceKind::ConfigMap, selector),
            (None, None) => return Err(ResolveError::EmptyReference(var.name.clone())),
        };
        match lookup_selector(kind, selector, namespace, source).await? {
            Some(value) => resolved.push(EnvVar::literal(&var.name, value)),
            None => {
                warn!(
                    env = %var.name,
                    %kind,
                    object = %selector.name,
                    key = %selector.key,
                    "optional environment reference not found, skipping"
                );
            }
        }
    }
    Ok(resolved)
}

async fn lookup_selector(
    kind: SourceKind,
    selector: &KeySelector,
    namespace: &str,
    source: &dyn ValueSource,
) -> Result<Option<String>, ResolveError> {
    let namespace = selector
        .namespace
        .as_deref()
        .filter(|ns| !ns.is_empty())
        .unwrap_or(namespace);
    let value = source
        .lookup(kind, namespace, &selector.name, &selector.key)
        .await?;
    if value.is_none() && !selector.is_optional() {
        return Err(ResolveError::Missing {
            kind: kind.as_str(),
            namespace: namespace.to_string(),
            name: selector.name.clone(),
            key: selector.key.clone(),
        });
    }
    Ok(value)
}

/// Resolves a document reference to its contents.
///
/// # Errors
///
/// Returns [`ResolveError::EmptyReference`] when neither a config map nor a
/// secret is named, and [`ResolveError::Missing`] when the key is absent.
pub async fn resolve_document(
    reference: &ComposeReference,
    namespace: &str,
    source: &dyn ValueSource,
) -> Result<String, ResolveError> {
    let (kind, key_ref) = match (&reference.config_map_ref, &reference.secret_ref) {
        (Some(key_ref), _) => (SourceKind::ConfigMap, key_ref),
        (None, Some(key_ref)) => (SourceKind::Secret, key_ref),
        (None, None) => return Err(ResolveError::EmptyReference("document".to_string())),
    };
    lookup_object_key(kind, key_ref, namespace, source).await
}

async fn lookup_object_key(
    kind: SourceKind,
    key_ref: &ObjectKeyReference,
    namespace: &str,
    source: &dyn ValueSource,
) -> Result<String, ResolveError> {
    let namespace = key_ref
        .namespace
        .as_deref()
        .filter(|ns| !ns.is_empty())
        .unwrap_or(namespace);
    source
        .lookup(kind, namespace, &key_ref.name, &key_ref.key)
        .await?
        .ok_or_else(|| ResolveError::Missing {
            kind: kind.as_str(),
            namespace: namespace.to_string(),
            name: key_ref.name.clone(),
            key: key_ref.key.clone(),
        })
}
