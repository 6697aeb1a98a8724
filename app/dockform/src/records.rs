//! Records files.
//!
//! A records file is a multi-document YAML stream; each document is one
//! record, dispatched on its `kind`.

use anyhow::{Context, Result, bail};
use dockform_resource::{
    COMPOSE_STACK_KIND, CONTAINER_KIND, ComposeStack, Condition, ConditionType, Container,
    NETWORK_KIND, Network, ObjectMeta, VOLUME_KIND, Volume,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One record of any kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    /// A container.
    Container(Container),
    /// A named volume.
    Volume(Volume),
    /// A network.
    Network(Network),
    /// A compose stack.
    Stack(ComposeStack),
}

impl Record {
    /// Decodes one YAML document.
    ///
    /// # Errors
    ///
    /// Returns an error for a missing or unknown `kind`, or a document that
    /// does not match its kind.
    pub fn from_value(value: serde_yaml::Value) -> Result<Self> {
        let kind = value
            .get("kind")
            .and_then(serde_yaml::Value::as_str)
            .map(str::to_string)
            .context("record has no kind")?;

        let record = match kind.as_str() {
            CONTAINER_KIND => Self::Container(serde_yaml::from_value(value)?),
            VOLUME_KIND => Self::Volume(serde_yaml::from_value(value)?),
            NETWORK_KIND => Self::Network(serde_yaml::from_value(value)?),
            COMPOSE_STACK_KIND => Self::Stack(serde_yaml::from_value(value)?),
            other => bail!("unsupported kind {other:?}"),
        };
        if record.metadata().name.is_empty() {
            bail!("{kind} record has no metadata.name");
        }
        Ok(record)
    }

    /// Kind name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Container(_) => CONTAINER_KIND,
            Self::Volume(_) => VOLUME_KIND,
            Self::Network(_) => NETWORK_KIND,
            Self::Stack(_) => COMPOSE_STACK_KIND,
        }
    }

    /// Record metadata.
    #[must_use]
    pub const fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Container(r) => &r.metadata,
            Self::Volume(r) => &r.metadata,
            Self::Network(r) => &r.metadata,
            Self::Stack(r) => &r.metadata,
        }
    }

    /// Mutable record metadata.
    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::Container(r) => &mut r.metadata,
            Self::Volume(r) => &mut r.metadata,
            Self::Network(r) => &mut r.metadata,
            Self::Stack(r) => &mut r.metadata,
        }
    }

    /// Record name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata().name
    }

    /// `Kind/namespace/name`, unique within a records file.
    #[must_use]
    pub fn key(&self) -> String {
        let meta = self.metadata();
        format!("{}/{}/{}", self.kind(), meta.namespace_or_default(), meta.name)
    }

    /// The `Ready` condition, once observed.
    #[must_use]
    pub fn ready(&self) -> Option<&Condition> {
        match self {
            Self::Container(r) => r.status.condition(ConditionType::Ready),
            Self::Volume(r) => r.status.condition(ConditionType::Ready),
            Self::Network(r) => r.status.condition(ConditionType::Ready),
            Self::Stack(r) => r.status.condition(ConditionType::Ready),
        }
    }

    /// Volumes and networks come before the containers that use them.
    const fn rank(&self) -> u8 {
        match self {
            Self::Volume(_) => 0,
            Self::Network(_) => 1,
            Self::Container(_) => 2,
            Self::Stack(_) => 3,
        }
    }
}

/// Parses a records file.
///
/// Empty documents are skipped. Records come back in creation order:
/// volumes, networks, containers, stacks, each kind in file order.
///
/// # Errors
///
/// Returns an error for invalid YAML, an undecodable record, or two records
/// with the same kind, namespace and name.
pub fn parse(text: &str) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    let mut seen = HashSet::new();

    for (index, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let value = serde_yaml::Value::deserialize(document)
            .with_context(|| format!("document {} is not valid YAML", index + 1))?;
        if value.is_null() {
            continue;
        }
        let record =
            Record::from_value(value).with_context(|| format!("document {}", index + 1))?;
        if !seen.insert(record.key()) {
            bail!("duplicate record {}", record.key());
        }
        records.push(record);
    }

    records.sort_by_key(Record::rank);
    Ok(records)
}

/// Reads and parses a records file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load(path: &Path) -> Result<Vec<Record>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read records file {}", path.display()))?;
    parse(&text).with_context(|| format!("invalid records file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORDS: &str = r"
apiVersion: container.dockform.io/v1alpha1
kind: Container
metadata:
  name: web
spec:
  forProvider:
    image: nginx:1.27
    ports:
      - containerPort: 80
        hostPort: 8080
---
apiVersion: container.dockform.io/v1alpha1
kind: Volume
metadata:
  name: data
  namespace: team-a
spec:
  forProvider:
    driver: local
---
---
apiVersion: container.dockform.io/v1alpha1
kind: ComposeStack
metadata:
  name: shop
spec:
  forProvider:
    compose: |
      services:
        web: {image: nginx}
";

    #[test]
    fn test_parse_orders_by_kind() {
        let records = parse(RECORDS).unwrap();
        let keys: Vec<_> = records.iter().map(Record::key).collect();
        assert_eq!(
            keys,
            vec![
                "Volume/team-a/data",
                "Container/default/web",
                "ComposeStack/default/shop",
            ]
        );

        let Record::Container(web) = &records[1] else {
            panic!("expected a container");
        };
        assert_eq!(web.spec.for_provider.image, "nginx:1.27");
        assert_eq!(web.kind, "Container");
        assert!(records[1].ready().is_none());
    }

    #[test]
    fn test_rejects_bad_records() {
        let err = parse("kind: Pod\nmetadata: {name: x}\nspec: {forProvider: {}}\n").unwrap_err();
        assert!(format!("{err:#}").contains("unsupported kind"));

        let err = parse("metadata: {name: x}\n").unwrap_err();
        assert!(format!("{err:#}").contains("no kind"));

        let twice = "kind: Network\nmetadata: {name: n}\nspec: {forProvider: {}}\n";
        let err = parse(&format!("{twice}---\n{twice}")).unwrap_err();
        assert!(err.to_string().contains("duplicate record Network/default/n"));

        let err =
            parse("kind: Volume\nmetadata: {name: ''}\nspec: {forProvider: {}}\n").unwrap_err();
        assert!(format!("{err:#}").contains("no metadata.name"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load(Path::new("/nonexistent/records.yaml")).unwrap_err();
        assert!(err.to_string().contains("failed to read records file"));
    }
}
