//! Core schema type definitions.
//!
//! This module contains the data structures that describe SCIM schemas and
//! their attribute types as specified in RFC 7643. A [`Schema`] is parsed
//! once, validated, and is immutable afterwards.

use serde::Deserialize;
use std::collections::BTreeSet;

use crate::error::{ScimError, ScimResult, ScimType};

/// Separator between a parent attribute and its sub-attribute.
pub const ATTR_DELIM: char = '.';

/// Separator between a schema URN and an attribute name.
pub const URN_DELIM: char = ':';

macro_rules! schema_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal, default = $default:ident, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
        #[serde(try_from = "String")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Canonical lowercase name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                match value.to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!("invalid {} '{}'", $kind, value)),
                }
            }
        }
    };
}

schema_enum!(
    /// SCIM attribute data types.
    AttributeType, "type", default = String, {
        String => "string",
        Boolean => "boolean",
        Decimal => "decimal",
        Integer => "integer",
        DateTime => "datetime",
        Binary => "binary",
        Reference => "reference",
        Complex => "complex",
    }
);

schema_enum!(
    /// Attribute mutability characteristics.
    Mutability, "mutability", default = ReadWrite, {
        ReadOnly => "readonly",
        ReadWrite => "readwrite",
        Immutable => "immutable",
        WriteOnly => "writeonly",
    }
);

schema_enum!(
    /// When an attribute is returned in a response.
    Returned, "returned", default = Default, {
        Always => "always",
        Never => "never",
        Default => "default",
        Request => "request",
    }
);

schema_enum!(
    /// Attribute uniqueness constraints.
    Uniqueness, "uniqueness", default = None, {
        None => "none",
        Server => "server",
        Global => "global",
    }
);

/// Immutable descriptor of an attribute or sub-attribute.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttrType {
    /// Attribute name as declared
    pub name: String,
    #[serde(rename = "type", default)]
    pub attr_type: AttributeType,
    #[serde(default)]
    pub multi_valued: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    /// Whether string comparison is case-sensitive
    #[serde(default)]
    pub case_exact: bool,
    #[serde(default)]
    pub mutability: Mutability,
    #[serde(default)]
    pub returned: Returned,
    #[serde(default)]
    pub uniqueness: Uniqueness,
    #[serde(default)]
    pub canonical_values: Vec<String>,
    #[serde(default)]
    pub reference_types: Vec<String>,
    #[serde(default)]
    pub sub_attributes: Vec<AttrType>,
    /// Lowercase name used for every lookup
    #[serde(skip)]
    pub norm_name: String,
    /// Normalized name of the parent attribute for sub-attributes
    #[serde(skip)]
    pub parent: Option<String>,
    /// URN of the owning schema
    #[serde(skip)]
    pub schema_id: String,
}

impl AttrType {
    /// A read-write, single valued string attribute.
    pub fn new(name: &str, attr_type: AttributeType) -> Self {
        Self {
            name: name.to_string(),
            attr_type,
            multi_valued: false,
            description: String::new(),
            required: false,
            case_exact: false,
            mutability: Mutability::ReadWrite,
            returned: Returned::Default,
            uniqueness: Uniqueness::None,
            canonical_values: Vec::new(),
            reference_types: Vec::new(),
            sub_attributes: Vec::new(),
            norm_name: name.to_ascii_lowercase(),
            parent: None,
            schema_id: String::new(),
        }
    }

    pub fn is_complex(&self) -> bool {
        self.attr_type == AttributeType::Complex
    }

    pub fn is_simple(&self) -> bool {
        !self.is_complex()
    }

    pub fn is_read_only(&self) -> bool {
        self.mutability == Mutability::ReadOnly
    }

    pub fn is_immutable(&self) -> bool {
        self.mutability == Mutability::Immutable
    }

    pub fn is_unique(&self) -> bool {
        self.uniqueness != Uniqueness::None
    }

    pub fn is_reference(&self) -> bool {
        self.attr_type == AttributeType::Reference
    }

    /// Whether values of this type are compared as strings.
    pub fn is_string_like(&self) -> bool {
        matches!(
            self.attr_type,
            AttributeType::String | AttributeType::Reference | AttributeType::Binary
        )
    }

    /// Look up a sub-attribute by name, ignoring case.
    pub fn sub_attribute(&self, name: &str) -> Option<&AttrType> {
        let norm = name.to_ascii_lowercase();
        self.sub_attributes.iter().find(|sa| sa.norm_name == norm)
    }

    /// Lowercase path of this attribute, `parent.name` for sub-attributes.
    pub fn norm_path(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{}{}{}", parent, ATTR_DELIM, self.norm_name),
            None => self.norm_name.clone(),
        }
    }

    fn validate(&self, errors: &mut Vec<String>) {
        if !is_valid_name(&self.name) {
            errors.push(format!("Invalid attribute name '{}'", self.name));
        }

        if self.is_reference() && self.reference_types.is_empty() {
            errors.push(format!("No referenceTypes set for attribute {}", self.name));
        }

        if self.is_complex() {
            if self.sub_attributes.is_empty() {
                errors.push(format!("No subattributes set for attribute {}", self.name));
            }
            for sa in &self.sub_attributes {
                if sa.is_complex() {
                    errors.push(format!(
                        "Sub-attribute {} of {} cannot be complex",
                        sa.name, self.name
                    ));
                }
                sa.validate(errors);
            }
        }
    }

    fn finalize(&mut self, schema_id: &str, parent: Option<&str>) {
        self.norm_name = self.name.to_ascii_lowercase();
        self.schema_id = schema_id.to_string();
        self.parent = parent.map(str::to_string);

        if self.is_complex() {
            let norm = self.norm_name.clone();
            for sa in self.sub_attributes.iter_mut() {
                sa.finalize(schema_id, Some(&norm));
            }

            if self.multi_valued {
                self.add_default_sub_attributes();
            }
        }
    }

    // RFC 7643 section 2.4
    fn add_default_sub_attributes(&mut self) {
        let mut primary = AttrType::new("primary", AttributeType::Boolean);
        primary.mutability = Mutability::ReadWrite;
        let mut display = AttrType::new("display", AttributeType::String);
        display.mutability = Mutability::Immutable;
        let defaults = [
            AttrType::new("type", AttributeType::String),
            primary,
            display,
            AttrType::new("value", AttributeType::String),
            AttrType::new("$ref", AttributeType::String),
        ];

        for mut def in defaults {
            if self.sub_attribute(&def.name).is_none() {
                def.schema_id = self.schema_id.clone();
                def.parent = Some(self.norm_name.clone());
                self.sub_attributes.push(def);
            }
        }
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '-')
}

/// A SCIM schema definition.
#[derive(Debug, Clone, Deserialize)]
pub struct Schema {
    /// Schema URN
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attributes: Vec<AttrType>,
    /// Lowercase names and `parent.sub` paths of required attributes
    #[serde(skip)]
    pub required_ats: BTreeSet<String>,
    /// Lowercase names and `parent.sub` paths of unique attributes
    #[serde(skip)]
    pub unique_ats: BTreeSet<String>,
    #[serde(skip)]
    pub read_only_ats: BTreeSet<String>,
    #[serde(skip)]
    pub never_returned_ats: BTreeSet<String>,
    #[serde(skip)]
    pub always_returned_ats: BTreeSet<String>,
    #[serde(skip)]
    pub request_returned_ats: BTreeSet<String>,
    #[serde(skip)]
    pub default_returned_ats: BTreeSet<String>,
    /// The JSON text this schema was parsed from
    #[serde(skip)]
    pub text: String,
}

impl Schema {
    /// Parse and validate a schema from its JSON text.
    pub fn parse(text: &str) -> ScimResult<Self> {
        let mut schema: Schema = serde_json::from_str(text).map_err(|e| {
            ScimError::bad_request_with(ScimType::InvalidSyntax, format!("invalid schema: {}", e))
        })?;

        let mut errors = Vec::new();
        schema.id = schema.id.trim().to_string();
        if schema.id.is_empty() {
            errors.push("Schema id is required".to_string());
        }
        if schema.attributes.is_empty() {
            errors.push("A schema should contain at least one attribute".to_string());
        }
        for attr in &schema.attributes {
            attr.validate(&mut errors);
        }
        if !errors.is_empty() {
            return Err(ScimError::bad_request_with(
                ScimType::InvalidValue,
                format!("invalid schema {}: {}", schema.id, errors.join("; ")),
            ));
        }

        schema.text = text.to_string();
        schema.finalize();
        Ok(schema)
    }

    /// Assign normalized names and compute the classification sets.
    pub(crate) fn finalize(&mut self) {
        let id = self.id.clone();
        for attr in self.attributes.iter_mut() {
            attr.finalize(&id, None);
        }
        self.collect_attribute_sets();
    }

    fn collect_attribute_sets(&mut self) {
        self.required_ats.clear();
        self.unique_ats.clear();
        self.read_only_ats.clear();
        self.never_returned_ats.clear();
        self.always_returned_ats.clear();
        self.request_returned_ats.clear();
        self.default_returned_ats.clear();

        for attr in &self.attributes {
            let name = attr.norm_name.clone();
            if attr.required {
                self.required_ats.insert(name.clone());
            }
            if attr.is_unique() {
                self.unique_ats.insert(name.clone());
            }
            if attr.is_read_only() {
                self.read_only_ats.insert(name.clone());
            }
            match attr.returned {
                Returned::Never => self.never_returned_ats.insert(name.clone()),
                Returned::Always => self.always_returned_ats.insert(name.clone()),
                Returned::Request => self.request_returned_ats.insert(name.clone()),
                Returned::Default => self.default_returned_ats.insert(name.clone()),
            };

            for sa in &attr.sub_attributes {
                let path = sa.norm_path();
                if sa.required {
                    self.required_ats.insert(path.clone());
                }
                if sa.is_unique() {
                    self.unique_ats.insert(path.clone());
                }
                if sa.returned == Returned::Never {
                    self.never_returned_ats.insert(path);
                } else if sa.is_read_only() {
                    self.read_only_ats.insert(path);
                }
            }
        }
    }

    /// Look up a top-level attribute by name, ignoring case.
    pub fn attribute(&self, name: &str) -> Option<&AttrType> {
        let norm = name.to_ascii_lowercase();
        self.attributes.iter().find(|a| a.norm_name == norm)
    }

    /// Resolve a plain or dotted attribute path, ignoring case.
    ///
    /// Returns `None` for unknown paths and for dotted paths whose parent is
    /// not complex.
    pub fn get_at_type(&self, path: &str) -> Option<&AttrType> {
        match path.split_once(ATTR_DELIM) {
            Some((parent, sub)) => {
                let parent = self.attribute(parent)?;
                if !parent.is_complex() {
                    return None;
                }
                parent.sub_attribute(sub)
            }
            None => self.attribute(path),
        }
    }

    /// Add an attribute after load, used to inject the common attributes.
    pub(crate) fn push_attribute(&mut self, mut attr: AttrType) {
        let id = self.id.clone();
        attr.finalize(&id, None);
        self.attributes.push(attr);
        self.collect_attribute_sets();
    }
}
