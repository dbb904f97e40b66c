//! Schema registry for loading, managing, and accessing schemas and resource types.
//!
//! The registry is built once, before a silo is opened, and is immutable
//! afterwards. Schemas must be registered before the resource types that
//! reference them.

use log::{debug, info};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::embedded;
use super::resource_type::ResourceType;
use super::types::Schema;
use crate::error::{ScimError, ScimResult};

/// Registry of schemas and resource types.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Schema>,
    resource_types: BTreeMap<String, Arc<ResourceType>>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the embedded User, Group and Device definitions.
    pub fn with_embedded_schemas() -> ScimResult<Self> {
        let mut registry = Self::new();
        for text in embedded::schemas() {
            registry.add_schema(text)?;
        }
        for text in embedded::resource_types() {
            registry.add_resource_type(text)?;
        }
        Ok(registry)
    }

    /// Create a registry from a directory of schema files and a directory of
    /// resource type files. Only files with a `.json` extension are read.
    pub fn from_dirs<P: AsRef<Path>, Q: AsRef<Path>>(
        schema_dir: P,
        resource_type_dir: Q,
    ) -> ScimResult<Self> {
        let mut registry = Self::new();
        for content in read_json_files(schema_dir.as_ref())? {
            registry.add_schema(&content)?;
        }
        for content in read_json_files(resource_type_dir.as_ref())? {
            registry.add_resource_type(&content)?;
        }
        info!(
            "Loaded {} schemas and {} resource types",
            registry.schemas.len(),
            registry.resource_types.len()
        );
        Ok(registry)
    }

    /// Parse and register a schema, replacing any schema with the same id.
    pub fn add_schema(&mut self, text: &str) -> ScimResult<&Schema> {
        let schema = Schema::parse(text)?;
        debug!("Registered schema {}", schema.id);
        let id = schema.id.clone();
        self.schemas.insert(id.clone(), schema);
        self.schemas
            .get(&id)
            .ok_or_else(|| ScimError::internal(format!("schema {} vanished after insert", id)))
    }

    /// Parse and register a resource type. Its schemas must already be registered.
    pub fn add_resource_type(&mut self, text: &str) -> ScimResult<Arc<ResourceType>> {
        let rt = Arc::new(ResourceType::parse(text, &self.schemas)?);
        debug!("Registered resource type {} at {}", rt.name, rt.endpoint);
        self.resource_types.insert(rt.name.clone(), Arc::clone(&rt));
        Ok(rt)
    }

    pub fn get_schema(&self, id: &str) -> Option<&Schema> {
        self.schemas.get(id)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &Schema> {
        self.schemas.values()
    }

    pub fn resource_type(&self, name: &str) -> Option<&Arc<ResourceType>> {
        self.resource_types.get(name)
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &Arc<ResourceType>> {
        self.resource_types.values()
    }

    /// Find the resource type whose main schema is `urn`.
    pub fn resource_type_by_schema(&self, urn: &str) -> Option<&Arc<ResourceType>> {
        self.resource_types.values().find(|rt| rt.schema == urn)
    }

    /// Find the resource type served at `endpoint`, e.g. `/Users`.
    pub fn resource_type_by_endpoint(&self, endpoint: &str) -> Option<&Arc<ResourceType>> {
        self.resource_types
            .values()
            .find(|rt| rt.endpoint.eq_ignore_ascii_case(endpoint))
    }
}

fn read_json_files(dir: &Path) -> ScimResult<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        ScimError::internal(format!("failed to read directory {}: {}", dir.display(), e))
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ScimError::internal(e.to_string()))?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    paths
        .iter()
        .map(|path| {
            debug!("Reading {}", path.display());
            fs::read_to_string(path).map_err(|e| {
                ScimError::internal(format!("failed to read {}: {}", path.display(), e))
            })
        })
        .collect()
}
