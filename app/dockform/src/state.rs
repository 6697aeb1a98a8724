//! State persisted between runs.
//!
//! Records files hold desired state only. What the engine side looks like
//! is carried here: each record's external-name marker and, for stacks, the
//! children they created. Entries are keyed by [`Record::key`].

use crate::records::Record;
use anyhow::{Context, Result};
use dockform_resource::ComposeStackObservation;
use dockform_resource::stack::StackChildren;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Engine-side identity of one record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEntry {
    /// External-name marker.
    pub external_name: String,
    /// Objects a stack created.
    #[serde(default, skip_serializing_if = "StackChildren::is_empty")]
    pub children: StackChildren,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateDocument {
    #[serde(default)]
    records: BTreeMap<String, StateEntry>,
}

/// JSON state file.
#[derive(Debug)]
pub struct State {
    path: PathBuf,
    records: BTreeMap<String, StateEntry>,
}

impl State {
    /// Loads the state file. A missing file is empty state.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let records = match std::fs::read(path) {
            Ok(bytes) => {
                let document: StateDocument = serde_json::from_slice(&bytes)
                    .with_context(|| format!("invalid state file {}", path.display()))?;
                document.records
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read state file {}", path.display()));
            }
        };
        debug!(path = %path.display(), entries = records.len(), "loaded state");
        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    /// Writes the state file, replacing it atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let document = StateDocument {
            records: self.records.clone(),
        };
        let json = serde_json::to_vec_pretty(&document)?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }

    /// Number of tracked records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Puts the stored marker, and a stack's children, back on a record.
    pub fn restore(&self, record: &mut Record) {
        let Some(entry) = self.records.get(&record.key()) else {
            return;
        };
        record
            .metadata_mut()
            .set_external_name(entry.external_name.clone());

        if let Record::Stack(stack) = record {
            if !entry.children.is_empty() {
                stack
                    .status
                    .at_provider
                    .get_or_insert_with(ComposeStackObservation::default)
                    .children = entry.children.clone();
            }
        }
    }

    /// Stores a record's marker, or forgets the record once it has none.
    pub fn capture(&mut self, record: &Record) {
        let key = record.key();
        let Some(external_name) = record.metadata().external_name() else {
            self.records.remove(&key);
            return;
        };

        let children = match record {
            Record::Stack(stack) => stack
                .status
                .at_provider
                .as_ref()
                .map(|o| o.children.clone())
                .unwrap_or_default(),
            _ => StackChildren::default(),
        };
        self.records.insert(
            key,
            StateEntry {
                external_name: external_name.to_string(),
                children,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records;

    const RECORDS: &str = r"
kind: Volume
metadata: {name: data}
spec: {forProvider: {}}
---
kind: ComposeStack
metadata: {name: shop}
spec:
  forProvider:
    compose: 'services: {web: {image: nginx}}'
";

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = State::load(&dir.path().join("state.json")).unwrap();
        assert_eq!(state.len(), 0);
    }

    #[test]
    fn test_capture_save_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let mut records = records::parse(RECORDS).unwrap();

        records[0].metadata_mut().set_external_name("data");
        let Record::Stack(stack) = &mut records[1] else {
            panic!("expected a stack");
        };
        stack.metadata.set_external_name("shop");
        let mut observation = ComposeStackObservation::default();
        observation.children.track_container("abc123");
        observation.children.track_network("shop_default");
        stack.status.at_provider = Some(observation);

        let mut state = State::load(&path).unwrap();
        for record in &records {
            state.capture(record);
        }
        state.save().unwrap();
        assert!(!path.with_extension("tmp").exists());

        let state = State::load(&path).unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state.records["Volume/default/data"].external_name, "data");

        let mut fresh = records::parse(RECORDS).unwrap();
        for record in &mut fresh {
            state.restore(record);
        }
        assert_eq!(fresh[0].metadata().external_name(), Some("data"));
        let Record::Stack(stack) = &fresh[1] else {
            panic!("expected a stack");
        };
        assert_eq!(stack.external_name(), Some("shop"));
        let children = &stack.status.at_provider.as_ref().unwrap().children;
        assert_eq!(children.containers, vec!["abc123"]);
        assert_eq!(children.networks, vec!["shop_default"]);
    }

    #[test]
    fn test_capture_forgets_deleted_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = State::load(&dir.path().join("state.json")).unwrap();
        let mut records = records::parse(RECORDS).unwrap();

        records[0].metadata_mut().set_external_name("data");
        state.capture(&records[0]);
        assert_eq!(state.len(), 1);

        records[0].metadata_mut().clear_external_name();
        state.capture(&records[0]);
        assert_eq!(state.len(), 0);
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(State::load(&path).is_err());
    }
}
