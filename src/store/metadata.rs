//! Tool metadata documents

use super::{read_json, write_json, StoreError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Required parameter names.
///
/// Accepts a single string or a list on input; an empty string means none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RequiredParams(pub Vec<String>);

impl<'de> Deserialize<'de> for RequiredParams {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(String),
            Many(Vec<String>),
            Nothing(()),
        }

        let names = match OneOrMany::deserialize(deserializer)? {
            OneOrMany::One(name) => vec![name],
            OneOrMany::Many(names) => names,
            OneOrMany::Nothing(()) => vec![],
        };
        Ok(RequiredParams(
            names.into_iter().filter(|n| !n.trim().is_empty()).collect(),
        ))
    }
}

impl From<Vec<String>> for RequiredParams {
    fn from(names: Vec<String>) -> Self {
        RequiredParams(names)
    }
}

/// One tool's entry in a metadata document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub tool_name: String,
    #[serde(default)]
    pub tool_required: RequiredParams,
    #[serde(default)]
    pub tool_description: String,
    /// JSON-schema `properties` object
    #[serde(default = "empty_object")]
    pub tool_properties: Value,
    /// Short blurb shown by `list_system_tools`
    #[serde(default)]
    pub tool_meta_description: String,
    /// Bash body for dynamically registered tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_script: Option<String>,
}

fn empty_object() -> Value {
    json!({})
}

impl ToolMetadata {
    /// `parameters` object of a function-tool definition
    pub fn parameters_schema(&self) -> Value {
        let properties = if self.tool_properties.is_object() {
            self.tool_properties.clone()
        } else {
            empty_object()
        };
        json!({
            "type": "object",
            "properties": properties,
            "required": self.tool_required.0,
        })
    }
}

/// Default (read-only) and dynamic (read/append) metadata documents.
///
/// Both are flat JSON objects keyed by tool name.
#[derive(Debug, Clone)]
pub struct ToolStore {
    default_path: PathBuf,
    dynamic_path: PathBuf,
}

impl ToolStore {
    pub fn new(default_path: impl Into<PathBuf>, dynamic_path: impl Into<PathBuf>) -> Self {
        Self {
            default_path: default_path.into(),
            dynamic_path: dynamic_path.into(),
        }
    }

    pub fn load_defaults(&self) -> Result<BTreeMap<String, ToolMetadata>, StoreError> {
        load_document(&self.default_path)
    }

    pub fn load_dynamic(&self) -> Result<BTreeMap<String, ToolMetadata>, StoreError> {
        load_document(&self.dynamic_path)
    }

    /// Defaults overlaid with dynamic entries of the same name
    #[allow(dead_code)] // The registry merges incrementally; used by tests
    pub fn load_merged(&self) -> Result<BTreeMap<String, ToolMetadata>, StoreError> {
        let mut merged = self.load_defaults()?;
        merged.extend(self.load_dynamic()?);
        Ok(merged)
    }

    /// Insert or replace one entry in the dynamic document
    pub fn append_dynamic(&self, meta: &ToolMetadata) -> Result<(), StoreError> {
        let mut doc = self.load_dynamic()?;
        doc.insert(meta.tool_name.clone(), meta.clone());
        write_json(&self.dynamic_path, &doc)?;
        tracing::debug!(tool = %meta.tool_name, path = %self.dynamic_path.display(), "Saved tool metadata");
        Ok(())
    }
}

/// Entries missing `tool_name` take the key they are stored under
fn load_document(path: &Path) -> Result<BTreeMap<String, ToolMetadata>, StoreError> {
    let raw: BTreeMap<String, Value> = read_json(path)?;
    raw.into_iter()
        .map(|(name, mut entry)| {
            if let Value::Object(map) = &mut entry {
                map.entry("tool_name")
                    .or_insert_with(|| Value::String(name.clone()));
            }
            serde_json::from_value(entry)
                .map(|meta| (name, meta))
                .map_err(|e| StoreError::json(path, e))
        })
        .collect()
}
