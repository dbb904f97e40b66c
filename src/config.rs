//! Silo configuration.
//!
//! Configuration is plain serde data. It can be built in code, loaded from a
//! JSON document, or taken from [`SiloConfig::default`] which declares the
//! conventional index fields for the embedded resource types.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ScimError, ScimResult};

/// Per resource type settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConf {
    /// Resource type name, e.g. `User`
    pub name: String,
    /// Attribute paths that get a secondary index in addition to the unique attributes
    #[serde(default)]
    pub index_fields: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

impl ResourceConf {
    pub fn new(name: impl Into<String>, index_fields: &[&str]) -> Self {
        Self {
            name: name.into(),
            index_fields: index_fields.iter().map(|f| f.to_string()).collect(),
            notes: String::new(),
        }
    }
}

/// Configuration for a [`Silo`](crate::silo::Silo).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiloConfig {
    /// Replica id embedded in every generated CSN
    #[serde(default)]
    pub server_id: u16,
    /// Index declarations per resource type
    #[serde(default)]
    pub resources: Vec<ResourceConf>,
    /// Capacity of the bounded channel used by callers of search
    #[serde(default = "default_search_channel_capacity")]
    pub search_channel_capacity: usize,
}

fn default_search_channel_capacity() -> usize {
    64
}

impl Default for SiloConfig {
    fn default() -> Self {
        Self {
            server_id: 0,
            resources: vec![
                ResourceConf::new("User", &["userName", "emails.value", "groups.value"]),
                ResourceConf::new(
                    "Device",
                    &[
                        "manufacturer",
                        "serialNumber",
                        "rating",
                        "price",
                        "location.latitude",
                        "installedDate",
                        "repairDates",
                        "photos.value",
                    ],
                ),
                ResourceConf::new("Group", &["members.value"]),
            ],
            search_channel_capacity: default_search_channel_capacity(),
        }
    }
}

impl SiloConfig {
    /// Parse configuration from a JSON document.
    pub fn from_json_str(json: &str) -> ScimResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ScimError::bad_request(format!("invalid silo configuration: {}", e)))
    }

    /// Load configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ScimResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ScimError::internal(format!(
                "failed to read configuration file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json_str(&content)
    }

    /// Index fields declared for the given resource type, empty when none.
    pub fn index_fields(&self, resource_type: &str) -> &[String] {
        self.resources
            .iter()
            .find(|r| r.name == resource_type)
            .map(|r| r.index_fields.as_slice())
            .unwrap_or(&[])
    }

    /// Declare an additional index field, creating the resource entry if needed.
    pub fn add_index_field(&mut self, resource_type: &str, field: &str) {
        match self.resources.iter_mut().find(|r| r.name == resource_type) {
            Some(rc) => rc.index_fields.push(field.to_string()),
            None => self.resources.push(ResourceConf::new(resource_type, &[field])),
        }
    }
}
