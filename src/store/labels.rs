//! Human labels for thread ids

use super::{read_json, write_json, StoreError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// `{label: thread_id}` document, rewritten on every insert
#[derive(Debug)]
pub struct LabelStore {
    path: PathBuf,
    labels: BTreeMap<String, String>,
}

impl LabelStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let labels = read_json(&path)?;
        Ok(Self { path, labels })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.labels.get(label).map(String::as_str)
    }

    /// Reverse lookup for a thread id
    pub fn find_label(&self, thread_id: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(_, id)| id.as_str() == thread_id)
            .map(|(label, _)| label.as_str())
    }

    pub fn labels(&self) -> Vec<String> {
        self.labels.keys().cloned().collect()
    }

    /// Save a label, replacing any previous thread id
    pub fn insert(&mut self, label: &str, thread_id: &str) -> Result<(), StoreError> {
        self.labels.insert(label.to_string(), thread_id.to_string());
        write_json(&self.path, &self.labels)?;
        tracing::debug!(label, thread_id, "Saved thread label");
        Ok(())
    }
}
