//! Resource type definitions.
//!
//! A resource type binds an endpoint to a main schema and any number of
//! extension schemas. Loading a resource type injects the common attributes
//! (`schemas`, `id`, `externalId` and `meta`) into its copy of the main
//! schema, so every attribute a stored resource can carry is resolvable
//! through [`ResourceType::get_at_type`].

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

use super::types::{AttrType, AttributeType, Mutability, Returned, Schema, URN_DELIM};
use crate::error::{ScimError, ScimResult, ScimType};

/// Reference from a resource type to one of its extension schemas.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchemaExtension {
    pub schema: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceTypeDef {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    endpoint: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    schema: String,
    #[serde(default)]
    schema_extensions: Vec<SchemaExtension>,
}

/// A validated resource type with its resolved schemas.
#[derive(Debug, Clone)]
pub struct ResourceType {
    pub id: String,
    pub name: String,
    pub endpoint: String,
    pub description: String,
    /// URN of the main schema
    pub schema: String,
    pub schema_extensions: Vec<SchemaExtension>,
    /// Unique attribute paths across the main and extension schemas
    pub unique_ats: Vec<String>,
    pub never_returned_ats: BTreeSet<String>,
    pub always_returned_ats: BTreeSet<String>,
    pub request_returned_ats: BTreeSet<String>,
    pub default_returned_ats: BTreeSet<String>,
    /// The JSON text this resource type was parsed from
    pub text: String,
    main: Schema,
    extensions: BTreeMap<String, Schema>,
}

impl ResourceType {
    /// Parse a resource type and resolve its schemas against `schemas`.
    pub fn parse(text: &str, schemas: &BTreeMap<String, Schema>) -> ScimResult<Self> {
        let def: ResourceTypeDef = serde_json::from_str(text).map_err(|e| {
            ScimError::bad_request_with(
                ScimType::InvalidSyntax,
                format!("invalid resource type: {}", e),
            )
        })?;

        let mut errors = Vec::new();
        let name = def.name.trim().to_string();
        if name.is_empty() {
            errors.push("Name attribute of the resourcetype cannot be empty".to_string());
        }

        let endpoint = clean_endpoint(&def.endpoint);
        if endpoint.is_empty() {
            errors.push("Endpoint attribute of the resourcetype cannot be empty".to_string());
        }

        let schema_id = def.schema.trim().to_string();
        let main = if schema_id.is_empty() {
            errors.push("Schema attribute of the resourcetype cannot be empty".to_string());
            None
        } else {
            match schemas.get(&schema_id) {
                Some(sc) => Some(sc.clone()),
                None => {
                    errors.push(format!("No Schema found associated with the URN {}", schema_id));
                    None
                }
            }
        };

        let mut extensions = BTreeMap::new();
        let mut schema_extensions = Vec::with_capacity(def.schema_extensions.len());
        for ext in def.schema_extensions {
            let urn = ext.schema.trim().to_string();
            if urn.is_empty() {
                errors.push(
                    "Schema attribute of the resourcetype's extension cannot be empty".to_string(),
                );
                continue;
            }
            match schemas.get(&urn) {
                Some(sc) => {
                    extensions.insert(urn.clone(), sc.clone());
                }
                None => errors.push(format!(
                    "No Schema found associated with the extension schema URN {}",
                    urn
                )),
            }
            schema_extensions.push(SchemaExtension {
                schema: urn,
                required: ext.required,
            });
        }

        let mut main = match main {
            Some(main) if errors.is_empty() => main,
            _ => {
                return Err(ScimError::bad_request_with(
                    ScimType::InvalidValue,
                    format!("invalid resource type {}: {}", name, errors.join("; ")),
                ));
            }
        };

        add_common_attributes(&mut main);

        let mut rt = ResourceType {
            id: def.id,
            name,
            endpoint,
            description: def.description,
            schema: schema_id,
            schema_extensions,
            unique_ats: Vec::new(),
            never_returned_ats: BTreeSet::new(),
            always_returned_ats: BTreeSet::new(),
            request_returned_ats: BTreeSet::new(),
            default_returned_ats: BTreeSet::new(),
            text: text.to_string(),
            main,
            extensions,
        };
        rt.collect_attribute_sets();

        Ok(rt)
    }

    fn collect_attribute_sets(&mut self) {
        let mut unique = Vec::new();
        let mut never = BTreeSet::new();
        let mut always = BTreeSet::new();
        let mut request = BTreeSet::new();
        let mut default = BTreeSet::new();
        for sc in self.extensions.values().chain(std::iter::once(&self.main)) {
            unique.extend(sc.unique_ats.iter().cloned());
            never.extend(sc.never_returned_ats.iter().cloned());
            always.extend(sc.always_returned_ats.iter().cloned());
            request.extend(sc.request_returned_ats.iter().cloned());
            default.extend(sc.default_returned_ats.iter().cloned());
        }
        self.unique_ats = unique;
        self.never_returned_ats = never;
        self.always_returned_ats = always;
        self.request_returned_ats = request;
        self.default_returned_ats = default;
    }

    /// The main schema, including the injected common attributes.
    pub fn main_schema(&self) -> &Schema {
        &self.main
    }

    /// The main or extension schema with the given URN.
    pub fn schema(&self, urn: &str) -> Option<&Schema> {
        if urn == self.schema {
            Some(&self.main)
        } else {
            self.extensions.get(urn)
        }
    }

    /// Like [`schema`](Self::schema) but matches the URN ignoring case.
    pub fn schema_ignore_case(&self, urn: &str) -> Option<&Schema> {
        self.schema(urn).or_else(|| {
            if urn.eq_ignore_ascii_case(&self.schema) {
                Some(&self.main)
            } else {
                self.extensions
                    .values()
                    .find(|sc| sc.id.eq_ignore_ascii_case(urn))
            }
        })
    }

    /// Whether `urn` names one of this type's extension schemas.
    pub fn is_extension(&self, urn: &str) -> bool {
        self.extensions.contains_key(urn)
    }

    pub fn extension_schemas(&self) -> impl Iterator<Item = &Schema> {
        self.extensions.values()
    }

    /// URNs of the extensions every resource of this type must carry.
    pub fn required_extensions(&self) -> impl Iterator<Item = &str> {
        self.schema_extensions
            .iter()
            .filter(|e| e.required)
            .map(|e| e.schema.as_str())
    }

    /// Split an optional URN prefix from an attribute path.
    ///
    /// `urn:...:User:name.givenName` yields the URN and `name.givenName`, a
    /// bare `name.givenName` yields no URN.
    pub fn split_urn(path: &str) -> (Option<&str>, &str) {
        match path.rfind(URN_DELIM) {
            Some(pos) if pos > 0 => (Some(&path[..pos]), &path[pos + 1..]),
            _ => (None, path),
        }
    }

    /// Resolve an attribute path, optionally URN-qualified.
    ///
    /// Without a URN the main schema is searched first, then the extensions.
    /// URNs match ignoring case. Unknown paths resolve to `None`.
    pub fn get_at_type(&self, path: &str) -> Option<&AttrType> {
        match Self::split_urn(path) {
            (Some(urn), rest) => self.schema_ignore_case(urn)?.get_at_type(rest),
            (None, rest) => self
                .main
                .get_at_type(rest)
                .or_else(|| self.extensions.values().find_map(|sc| sc.get_at_type(rest))),
        }
    }

    /// Resolve an attribute path and report the URN of the schema that owns it.
    pub fn resolve(&self, path: &str) -> Option<(&str, &AttrType)> {
        let at = self.get_at_type(path)?;
        let urn = self.schema(&at.schema_id).map(|sc| sc.id.as_str())?;
        Some((urn, at))
    }
}

fn clean_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn add_common_attributes(main: &mut Schema) {
    for name in ["schemas", "id", "externalid", "meta"] {
        main.attributes.retain(|a| a.name.to_ascii_lowercase() != name);
    }

    let mut schemas = AttrType::new("schemas", AttributeType::String);
    schemas.required = true;
    schemas.returned = Returned::Always;
    schemas.multi_valued = true;
    schemas.mutability = Mutability::ReadOnly;
    schemas.case_exact = true;
    main.push_attribute(schemas);

    let mut id = AttrType::new("id", AttributeType::String);
    id.returned = Returned::Always;
    id.case_exact = true;
    id.mutability = Mutability::ReadOnly;
    main.push_attribute(id);

    let mut external_id = AttrType::new("externalId", AttributeType::String);
    external_id.case_exact = true;
    main.push_attribute(external_id);

    let mut meta = AttrType::new("meta", AttributeType::Complex);
    meta.mutability = Mutability::ReadOnly;

    let mut resource_type = AttrType::new("resourceType", AttributeType::String);
    resource_type.case_exact = true;
    resource_type.mutability = Mutability::ReadOnly;

    let mut created = AttrType::new("created", AttributeType::DateTime);
    created.mutability = Mutability::ReadOnly;

    let mut last_modified = AttrType::new("lastModified", AttributeType::DateTime);
    last_modified.mutability = Mutability::ReadOnly;

    let mut location = AttrType::new("location", AttributeType::String);
    location.mutability = Mutability::ReadOnly;

    let mut version = AttrType::new("version", AttributeType::String);
    version.case_exact = true;
    version.mutability = Mutability::ReadOnly;

    meta.sub_attributes = vec![resource_type, created, last_modified, location, version];
    main.push_attribute(meta);
}
