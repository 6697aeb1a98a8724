//! Values file: the config maps and secrets `valueFrom` references read.
//!
//! ```yaml
//! configMaps:
//!   - name: app
//!     data: {LOG_LEVEL: debug}
//! secrets:
//!   - name: db
//!     namespace: team-a
//!     data: {password: hunter2}
//! ```

use anyhow::{Context, Result};
use dockform_reconcile::{MapValueSource, SourceKind};
use dockform_resource::DEFAULT_NAMESPACE;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValuesFile {
    #[serde(default)]
    config_maps: Vec<ValueObject>,
    #[serde(default)]
    secrets: Vec<ValueObject>,
}

#[derive(Debug, Deserialize)]
struct ValueObject {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    data: BTreeMap<String, String>,
}

/// Parses a values document.
///
/// # Errors
///
/// Returns an error if the document is not valid YAML of the expected shape.
pub fn parse(text: &str) -> Result<MapValueSource> {
    let file: ValuesFile = serde_yaml::from_str(text)?;
    let mut source = MapValueSource::new();
    let objects = file
        .config_maps
        .into_iter()
        .map(|o| (SourceKind::ConfigMap, o))
        .chain(file.secrets.into_iter().map(|o| (SourceKind::Secret, o)));
    for (kind, object) in objects {
        let namespace = object
            .namespace
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        source.insert(kind, namespace, object.name, object.data);
    }
    Ok(source)
}

/// Loads the values file, or an empty source when none is configured.
///
/// # Errors
///
/// Returns an error if a configured file cannot be read or parsed.
pub fn load(path: Option<&Path>) -> Result<MapValueSource> {
    let Some(path) = path else {
        return Ok(MapValueSource::new());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read values file {}", path.display()))?;
    parse(&text).with_context(|| format!("invalid values file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockform_reconcile::ValueSource;

    #[tokio::test]
    async fn test_parse_values() {
        let source = parse(
            r"
configMaps:
  - name: app
    data: {LOG_LEVEL: debug}
secrets:
  - name: db
    namespace: team-a
    data: {password: hunter2}
",
        )
        .unwrap();

        let level = source
            .lookup(SourceKind::ConfigMap, "default", "app", "LOG_LEVEL")
            .await
            .unwrap();
        assert_eq!(level.as_deref(), Some("debug"));

        let password = source
            .lookup(SourceKind::Secret, "team-a", "db", "password")
            .await
            .unwrap();
        assert_eq!(password.as_deref(), Some("hunter2"));

        let wrong_kind = source
            .lookup(SourceKind::ConfigMap, "team-a", "db", "password")
            .await
            .unwrap();
        assert!(wrong_kind.is_none());
    }

    #[test]
    fn test_load() {
        assert!(load(None).is_ok());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("values.yaml");
        std::fs::write(&path, "secrets: not-a-list\n").unwrap();
        assert!(load(Some(&path)).is_err());
        assert!(load(Some(&dir.path().join("missing.yaml"))).is_err());
    }
}
