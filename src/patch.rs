//! SCIM PATCH request model.
//!
//! This module parses an RFC 7644 section 3.5.2 PatchOp message into a
//! [`PatchRequest`] whose operations carry fully resolved [`ParsedPath`]s.
//! Applying the operations to a stored resource is the job of the silo's
//! patch engine.
//!
//! ```rust
//! use scim_silo::patch::{PatchOpKind, PatchRequest};
//! use scim_silo::schema::SchemaRegistry;
//! use serde_json::json;
//!
//! let registry = SchemaRegistry::with_embedded_schemas().unwrap();
//! let rt = registry.resource_type("User").unwrap();
//! let request = PatchRequest::parse(
//!     &json!({
//!         "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
//!         "Operations": [{"op": "Remove", "path": "emails[type eq \"work\"].value"}]
//!     }),
//!     rt,
//! )
//! .unwrap();
//! let op = &request.operations[0];
//! assert_eq!(op.op, PatchOpKind::Remove);
//! let path = op.path.as_ref().unwrap();
//! assert_eq!(path.attr.as_deref(), Some("emails"));
//! assert_eq!(path.sub_attr.as_deref(), Some("value"));
//! assert!(path.selector.is_some());
//! ```

use log::debug;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::fmt;

use crate::error::{ScimError, ScimResult, ScimType};
use crate::filter::Selector;
use crate::schema::{ATTR_DELIM, AttrType, ResourceType};

/// URN of the PatchOp message.
pub const PATCH_OP_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";

/// The kind of a patch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOpKind {
    Add,
    Replace,
    Remove,
}

impl fmt::Display for PatchOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PatchOpKind::Add => "add",
            PatchOpKind::Replace => "replace",
            PatchOpKind::Remove => "remove",
        })
    }
}

/// A patch path resolved against a resource type.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPath {
    /// Extension schema URN, `None` for the core schema
    pub schema: Option<String>,
    /// Whether the path names a whole extension container
    pub is_ext_container: bool,
    /// Normalized name of the top-level attribute
    pub attr: Option<String>,
    /// Normalized name of the sub-attribute
    pub sub_attr: Option<String>,
    /// Value filter selecting instances of a complex attribute
    pub selector: Option<Selector>,
    /// The path as given
    pub text: String,
}

impl ParsedPath {
    /// Parse a path such as `name.givenName`, `emails[type eq "work"].value`
    /// or a URN-qualified variant.
    ///
    /// Unknown attributes and schemas are BadRequest `invalidPath`.
    pub fn parse(path: &str, rt: &ResourceType) -> ScimResult<ParsedPath> {
        let text = path.trim();
        let invalid_path = |detail: String| ScimError::bad_request_with(ScimType::InvalidPath, detail);

        let mut running = text.to_string();
        let mut selector_text = None;
        if let Some(start) = text.find('[') {
            if start == 0 {
                return Err(invalid_path(format!(
                    "Invalid attribute path {}, missing parent attribute",
                    text
                )));
            }
            let end = text.rfind(']').filter(|end| *end > start + 1).ok_or_else(|| {
                invalid_path(format!(
                    "Invalid attribute path {}, missing or empty selector",
                    text
                ))
            })?;
            selector_text = Some(&text[..=end]);
            running = format!("{}{}", &text[..start], &text[end + 1..]);
        }

        let ext_container = rt
            .schema_extensions
            .iter()
            .find(|ext| ext.schema.eq_ignore_ascii_case(&running));
        if let Some(ext) = ext_container {
            if selector_text.is_some() {
                return Err(invalid_path(format!(
                    "Invalid attribute path {}, a selector cannot be applied to an extension",
                    text
                )));
            }
            return Ok(ParsedPath {
                schema: Some(ext.schema.clone()),
                is_ext_container: true,
                attr: None,
                sub_attr: None,
                selector: None,
                text: text.to_string(),
            });
        }

        let (urn, at) = rt
            .resolve(&running)
            .ok_or_else(|| invalid_path(format!("Unknown attribute {} in the path {}", running, text)))?;

        let (attr, sub_attr) = match &at.parent {
            Some(parent) => (parent.clone(), Some(at.norm_name.clone())),
            None => (at.norm_name.clone(), None),
        };

        let selector = match selector_text {
            Some(selector_text) => {
                let parent_at = rt
                    .schema(urn)
                    .and_then(|sc| sc.attribute(&attr))
                    .filter(|parent_at| parent_at.is_complex())
                    .ok_or_else(|| {
                        invalid_path(format!(
                            "Invalid attribute path {}, a selector needs a complex attribute",
                            text
                        ))
                    })?;
                debug!("Parsing selector {} of {}", selector_text, parent_at.name);
                Some(Selector::parse(selector_text, rt)?)
            }
            None => None,
        };

        Ok(ParsedPath {
            schema: (urn != rt.schema).then(|| urn.to_string()),
            is_ext_container: false,
            attr: Some(attr),
            sub_attr,
            selector,
            text: text.to_string(),
        })
    }

    /// URN of the schema the path belongs to.
    pub fn urn<'a>(&'a self, rt: &'a ResourceType) -> &'a str {
        self.schema.as_deref().unwrap_or(&rt.schema)
    }

    /// Descriptor of the top-level attribute.
    pub fn attr_type<'a>(&self, rt: &'a ResourceType) -> Option<&'a AttrType> {
        let sc = rt.schema(self.urn(rt))?;
        sc.attribute(self.attr.as_deref()?)
    }

    /// Descriptor of the sub-attribute, when the path has one.
    pub fn sub_attr_type<'a>(&self, rt: &'a ResourceType) -> Option<&'a AttrType> {
        self.attr_type(rt)?.sub_attribute(self.sub_attr.as_deref()?)
    }

    /// Normalized `attr` or `attr.sub` path.
    pub fn norm_path(&self) -> String {
        match (&self.attr, &self.sub_attr) {
            (Some(attr), Some(sub)) => format!("{}{}{}", attr, ATTR_DELIM, sub),
            (Some(attr), None) => attr.clone(),
            _ => String::new(),
        }
    }
}

/// One operation of a patch request.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOp {
    /// Position of the operation in the request
    pub index: usize,
    pub op: PatchOpKind,
    pub path: Option<ParsedPath>,
    pub value: Option<JsonValue>,
}

/// A validated patch request.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchRequest {
    pub schemas: Vec<String>,
    pub operations: Vec<PatchOp>,
}

#[derive(Debug, Deserialize)]
struct RawPatchRequest {
    #[serde(default)]
    schemas: Vec<String>,
    #[serde(default, alias = "operations")]
    #[serde(rename = "Operations")]
    operations: Vec<RawPatchOp>,
}

#[derive(Debug, Deserialize)]
struct RawPatchOp {
    #[serde(default)]
    op: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    value: Option<JsonValue>,
}

impl PatchRequest {
    /// Parse and validate a PatchOp message against `rt`.
    pub fn parse(body: &JsonValue, rt: &ResourceType) -> ScimResult<PatchRequest> {
        let raw: RawPatchRequest = serde_json::from_value(body.clone()).map_err(|e| {
            ScimError::bad_request_with(
                ScimType::InvalidSyntax,
                format!("Invalid patch request: {}", e),
            )
        })?;

        if raw.operations.is_empty() {
            return Err(ScimError::bad_request(
                "Invalid patch request, one or more operations must be present",
            ));
        }

        let operations = raw
            .operations
            .into_iter()
            .enumerate()
            .map(|(index, raw_op)| parse_op(index, raw_op, rt))
            .collect::<ScimResult<Vec<_>>>()?;

        Ok(PatchRequest {
            schemas: raw.schemas,
            operations,
        })
    }

    /// Parse a PatchOp message given as text.
    pub fn parse_str(text: &str, rt: &ResourceType) -> ScimResult<PatchRequest> {
        let body: JsonValue = serde_json::from_str(text).map_err(|e| {
            ScimError::bad_request_with(ScimType::InvalidSyntax, format!("Invalid patch request: {}", e))
        })?;
        Self::parse(&body, rt)
    }
}

fn parse_op(index: usize, raw: RawPatchOp, rt: &ResourceType) -> ScimResult<PatchOp> {
    let op = match raw.op.trim().to_ascii_lowercase().as_str() {
        "add" => PatchOpKind::Add,
        "replace" => PatchOpKind::Replace,
        "remove" => PatchOpKind::Remove,
        other => {
            return Err(ScimError::bad_request_with(
                ScimType::InvalidSyntax,
                format!(
                    "Invalid patch request, unknown operation name {} in operation {}",
                    other, index
                ),
            ));
        }
    };

    let path = raw
        .path
        .as_deref()
        .map(str::trim)
        .filter(|path| !path.is_empty());
    let value = raw.value.filter(|value| !value.is_null());

    match op {
        PatchOpKind::Add | PatchOpKind::Replace if value.is_none() => {
            return Err(ScimError::bad_request_with(
                ScimType::InvalidValue,
                format!("Invalid patch request, missing value in operation {}", index),
            ));
        }
        PatchOpKind::Remove if path.is_none() => {
            return Err(ScimError::bad_request_with(
                ScimType::NoTarget,
                format!("Invalid patch request, missing path in operation {}", index),
            ));
        }
        _ => {}
    }

    let path = path.map(|path| ParsedPath::parse(path, rt)).transpose()?;

    Ok(PatchOp {
        index,
        op,
        path,
        value,
    })
}
