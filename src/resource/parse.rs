//! Parsing SCIM JSON into [`Resource`]s.
//!
//! Parsing is strict: unknown attributes, wrongly shaped values and unknown
//! extension schemas are rejected with BadRequest. JSON nulls and empty
//! arrays are treated as absent.

use log::debug;
use serde_json::{Map, Value as JsonValue};

use super::attribute::{ComplexAttribute, SimpleAttribute, SubAttributes, is_primary};
use super::resource::{Resource, SCHEMAS};
use super::value::Value;
use crate::error::{ScimError, ScimResult, ScimType};
use crate::schema::{AttrType, ResourceType, Schema, SchemaRegistry, URN_DELIM};

impl Resource {
    /// Parse a resource body, selecting its type from the `schemas` attribute.
    pub fn parse(registry: &SchemaRegistry, body: &JsonValue) -> ScimResult<Resource> {
        let obj = body
            .as_object()
            .ok_or_else(|| ScimError::bad_request("Invalid JSON data, expected an object"))?;

        let schema_ids = obj
            .get(SCHEMAS)
            .ok_or_else(|| ScimError::bad_request("Invalid resource, 'schemas' attribute is missing"))?
            .as_array()
            .ok_or_else(|| ScimError::bad_request("Value of the 'schemas' attribute must be an array"))?
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    ScimError::bad_request("Value given for the 'schemas' attribute is invalid")
                })
            })
            .collect::<ScimResult<Vec<String>>>()?;

        let rt = registry
            .resource_types()
            .find(|rt| schema_ids.iter().any(|id| *id == rt.schema))
            .ok_or_else(|| {
                ScimError::bad_request(format!(
                    "No resource type found with the schemas {:?}",
                    schema_ids
                ))
            })?;

        for urn in rt.required_extensions() {
            if !schema_ids.iter().any(|id| id == urn) {
                return Err(ScimError::bad_request(format!(
                    "The extension schema {} is mandatory for resource type {}",
                    urn, rt.name
                )));
            }
        }

        let unknown: Vec<&String> = schema_ids
            .iter()
            .filter(|id| **id != rt.schema && !rt.is_extension(id))
            .collect();
        if !unknown.is_empty() {
            return Err(ScimError::bad_request(format!(
                "Unknown schema extensions {:?} for resource type {}",
                unknown, rt.name
            )));
        }

        let mut rs = Resource::from_object(rt, obj)?;
        rs.update_schemas(rt);
        Ok(rs)
    }

    /// Parse a resource body given as text.
    pub fn parse_str(registry: &SchemaRegistry, text: &str) -> ScimResult<Resource> {
        let body: JsonValue = serde_json::from_str(text).map_err(|e| {
            ScimError::bad_request_with(ScimType::InvalidSyntax, format!("Invalid JSON data: {}", e))
        })?;
        Self::parse(registry, &body)
    }

    /// Parse a JSON object against a known resource type.
    ///
    /// `schemas` is left as given. Patch values are parsed this way too.
    pub fn from_object(rt: &ResourceType, obj: &Map<String, JsonValue>) -> ScimResult<Resource> {
        let mut rs = Resource {
            type_name: rt.name.clone(),
            core: Default::default(),
            ext: Default::default(),
        };

        for (key, value) in obj {
            if key.contains(URN_DELIM) {
                let sc = rt.schema(key).ok_or_else(|| {
                    ScimError::bad_request(format!(
                        "Unknown schema, {} is not found in the extension schemas of resource type {}",
                        key, rt.name
                    ))
                })?;
                match value {
                    JsonValue::Null => debug!("Skipping null extension object {}", key),
                    JsonValue::Object(ext) if ext.is_empty() => {
                        debug!("Skipping empty extension object {}", key)
                    }
                    JsonValue::Object(ext) => {
                        let urn = sc.id.clone();
                        parse_into(&mut rs, rt, sc, &urn, ext)?;
                    }
                    _ => {
                        return Err(ScimError::bad_request(format!(
                            "Invalid value of key {}",
                            key
                        )));
                    }
                }
                continue;
            }

            parse_attribute(&mut rs, rt, rt.main_schema(), &rt.schema, key, value)?;
        }

        Ok(rs)
    }
}

fn parse_into(
    rs: &mut Resource,
    rt: &ResourceType,
    sc: &Schema,
    urn: &str,
    obj: &Map<String, JsonValue>,
) -> ScimResult<()> {
    for (key, value) in obj {
        parse_attribute(rs, rt, sc, urn, key, value)?;
    }
    Ok(())
}

fn parse_attribute(
    rs: &mut Resource,
    rt: &ResourceType,
    sc: &Schema,
    urn: &str,
    key: &str,
    value: &JsonValue,
) -> ScimResult<()> {
    let at = sc.attribute(key).ok_or_else(|| {
        ScimError::bad_request(format!(
            "Attribute {} doesn't exist in the schema {}",
            key, sc.id
        ))
    })?;

    if at.is_complex() {
        if let Some(ca) = parse_complex(at, value)? {
            rs.group_or_insert(rt, urn).insert(ca);
        }
    } else if let Some(sa) = parse_simple(at, value)? {
        rs.group_or_insert(rt, urn).insert(sa);
    }
    Ok(())
}

/// Parse the value of a simple attribute or sub-attribute. Null yields `None`.
pub fn parse_simple(at: &AttrType, value: &JsonValue) -> ScimResult<Option<SimpleAttribute>> {
    match value {
        JsonValue::Null => {
            debug!("Null value received for attribute {}, skipping", at.name);
            Ok(None)
        }
        JsonValue::Array(items) if at.multi_valued => {
            if items.is_empty() {
                return Ok(None);
            }
            let values = items
                .iter()
                .map(|item| {
                    if item.is_null() {
                        Err(ScimError::bad_request(format!(
                            "Null value is present in the values of multivalued attribute {}",
                            at.name
                        )))
                    } else {
                        Value::from_json(at, item)
                    }
                })
                .collect::<ScimResult<Vec<Value>>>()?;
            Ok(Some(SimpleAttribute::new(at.norm_name.clone(), values)))
        }
        _ if at.multi_valued => Err(ScimError::bad_request(format!(
            "Value of the attribute {} must be an array",
            at.name
        ))),
        _ => Ok(Some(SimpleAttribute::single(
            at.norm_name.clone(),
            Value::from_json(at, value)?,
        ))),
    }
}

/// Parse the value of a complex attribute. Null and empty arrays yield `None`.
pub fn parse_complex(at: &AttrType, value: &JsonValue) -> ScimResult<Option<ComplexAttribute>> {
    let mut ca = ComplexAttribute::new(at.norm_name.clone());
    match value {
        JsonValue::Null => return Ok(None),
        JsonValue::Array(items) if at.multi_valued => {
            let mut primary_seen = false;
            for item in items {
                if item.is_null() {
                    return Err(ScimError::bad_request(format!(
                        "Null value is present in the values of multivalued complex attribute {}",
                        at.name
                    )));
                }
                let sub_attrs = parse_sub_attributes(at, item)?;
                if is_primary(&sub_attrs) {
                    if primary_seen {
                        return Err(ScimError::bad_request(format!(
                            "More than one instance is marked as primary in the complex attribute {}",
                            at.name
                        )));
                    }
                    primary_seen = true;
                }
                if !sub_attrs.is_empty() {
                    ca.add_instance(sub_attrs);
                }
            }
        }
        _ if at.multi_valued => {
            return Err(ScimError::bad_request(format!(
                "Value of the attribute {} must be an array",
                at.name
            )));
        }
        _ => {
            let sub_attrs = parse_sub_attributes(at, value)?;
            if !sub_attrs.is_empty() {
                ca.add_instance(sub_attrs);
            }
        }
    }

    Ok(if ca.is_empty() { None } else { Some(ca) })
}

/// Parse one JSON object of sub-attribute values.
pub fn parse_sub_attributes(parent: &AttrType, value: &JsonValue) -> ScimResult<SubAttributes> {
    let obj = value.as_object().ok_or_else(|| {
        ScimError::bad_request(format!(
            "Invalid sub-attribute value {} of {}, expected a JSON object",
            value, parent.name
        ))
    })?;

    let mut sub_attrs = SubAttributes::new();
    for (key, value) in obj {
        let sat = parent.sub_attribute(key).ok_or_else(|| {
            ScimError::bad_request(format!(
                "Sub-attribute {}.{} doesn't exist in the schema {}",
                parent.name, key, parent.schema_id
            ))
        })?;
        if let Some(sa) = parse_simple(sat, value)? {
            sub_attrs.insert(sa.name.clone(), sa);
        }
    }
    Ok(sub_attrs)
}
