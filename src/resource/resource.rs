//! The stored representation of a SCIM resource.
//!
//! A [`Resource`] holds one attribute group for its main schema and one per
//! extension schema. Attribute descriptors are not embedded; every method that
//! needs type information takes the owning [`ResourceType`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

use super::attribute::{AtGroup, Attribute, ComplexAttribute, SimpleAttribute, SubAttributes, VALUE};
use super::value::Value;
use crate::csn::Csn;
use crate::error::{ScimError, ScimResult};
use crate::schema::{AttrType, ResourceType, Returned, Schema};

pub const SCHEMAS: &str = "schemas";
pub const ID: &str = "id";
pub const EXTERNAL_ID: &str = "externalid";
pub const META: &str = "meta";
pub const META_RESOURCE_TYPE: &str = "resourcetype";
pub const META_CREATED: &str = "created";
pub const META_LAST_MODIFIED: &str = "lastmodified";
pub const META_LOCATION: &str = "location";
pub const META_VERSION: &str = "version";
pub const MEMBERS: &str = "members";
pub const GROUPS: &str = "groups";

/// A SCIM resource: a core attribute group plus extension groups keyed by URN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub type_name: String,
    pub core: AtGroup,
    pub ext: BTreeMap<String, AtGroup>,
}

impl Resource {
    /// An empty resource of the given type carrying only `schemas`.
    pub fn new(rt: &ResourceType) -> Self {
        let mut rs = Self {
            type_name: rt.name.clone(),
            core: AtGroup::new(),
            ext: BTreeMap::new(),
        };
        rs.update_schemas(rt);
        rs
    }

    pub fn id(&self) -> Option<&str> {
        self.core
            .simple(ID)
            .and_then(SimpleAttribute::first)
            .and_then(Value::as_str)
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.core
            .insert(SimpleAttribute::single(ID, Value::Str(id.into())));
    }

    pub fn external_id(&self) -> Option<&str> {
        self.core
            .simple(EXTERNAL_ID)
            .and_then(SimpleAttribute::first)
            .and_then(Value::as_str)
    }

    pub fn meta(&self) -> Option<&ComplexAttribute> {
        self.core.complex(META)
    }

    /// The version stored in `meta.version`.
    pub fn version(&self) -> Option<&str> {
        self.meta()
            .and_then(|meta| meta.value_of(META_VERSION))
            .and_then(Value::as_str)
    }

    /// `meta.lastModified` in epoch milliseconds.
    pub fn last_modified(&self) -> Option<i64> {
        self.meta()
            .and_then(|meta| meta.value_of(META_LAST_MODIFIED))
            .and_then(Value::as_i64)
    }

    /// `meta.created` in epoch milliseconds.
    pub fn created(&self) -> Option<i64> {
        self.meta()
            .and_then(|meta| meta.value_of(META_CREATED))
            .and_then(Value::as_i64)
    }

    /// URNs listed in the `schemas` attribute.
    pub fn schema_ids(&self) -> Vec<&str> {
        self.core
            .simple(SCHEMAS)
            .map(|sa| sa.values.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// The attribute group holding attributes of the schema `urn`.
    pub fn group(&self, rt: &ResourceType, urn: &str) -> Option<&AtGroup> {
        if urn == rt.schema {
            Some(&self.core)
        } else {
            self.ext.get(urn)
        }
    }

    pub fn group_mut(&mut self, rt: &ResourceType, urn: &str) -> Option<&mut AtGroup> {
        if urn == rt.schema {
            Some(&mut self.core)
        } else {
            self.ext.get_mut(urn)
        }
    }

    /// The group for `urn`, creating an extension group when absent.
    pub fn group_or_insert(&mut self, rt: &ResourceType, urn: &str) -> &mut AtGroup {
        if urn == rt.schema {
            &mut self.core
        } else {
            self.ext.entry(urn.to_string()).or_default()
        }
    }

    /// Every present group paired with its schema URN, core first.
    pub fn groups<'a>(&'a self, rt: &'a ResourceType) -> impl Iterator<Item = (&'a str, &'a AtGroup)> {
        std::iter::once((rt.schema.as_str(), &self.core))
            .chain(self.ext.iter().map(|(urn, atg)| (urn.as_str(), atg)))
    }

    /// Look up a top-level attribute, optionally URN-qualified.
    pub fn get_attr(&self, rt: &ResourceType, path: &str) -> Option<&Attribute> {
        let (urn, at) = rt.resolve(path)?;
        if at.parent.is_some() {
            return None;
        }
        self.group(rt, urn)?.get(&at.norm_name)
    }

    /// Look up a simple attribute or a sub-attribute of the first instance of
    /// its parent.
    pub fn get_simple(&self, rt: &ResourceType, path: &str) -> Option<&SimpleAttribute> {
        let (urn, at) = rt.resolve(path)?;
        let group = self.group(rt, urn)?;
        match &at.parent {
            Some(parent) => group
                .complex(parent)?
                .first()
                .and_then(|(_, sub_attrs)| sub_attrs.get(&at.norm_name)),
            None => group.simple(&at.norm_name),
        }
    }

    /// All values stored at `path`, across every instance of a complex parent.
    pub fn values_at(&self, rt: &ResourceType, path: &str) -> Vec<&Value> {
        let Some((urn, at)) = rt.resolve(path) else {
            return Vec::new();
        };
        let Some(group) = self.group(rt, urn) else {
            return Vec::new();
        };
        values_in_group(group, at)
    }

    /// Remove a top-level attribute, returning it.
    pub fn delete_attr(&mut self, rt: &ResourceType, path: &str) -> Option<Attribute> {
        let (urn, at) = rt.resolve(path)?;
        let name = at.norm_name.clone();
        let urn = urn.to_string();
        let group = self.group_mut(rt, &urn)?;
        let removed = group.remove(&name);
        if group.is_empty() && urn != rt.schema {
            self.ext.remove(&urn);
        }
        removed
    }

    /// Set `meta` for a freshly created resource.
    pub fn add_meta(&mut self, rt: &ResourceType, csn: &Csn) {
        let millis = csn.time_millis();
        let location = format!("{}/{}", rt.endpoint, self.id().unwrap_or_default());

        let mut sub_attrs = SubAttributes::new();
        for sa in [
            SimpleAttribute::single(META_RESOURCE_TYPE, rt.name.as_str()),
            SimpleAttribute::single(META_CREATED, millis),
            SimpleAttribute::single(META_LAST_MODIFIED, millis),
            SimpleAttribute::single(META_LOCATION, location),
            SimpleAttribute::single(META_VERSION, csn.to_string()),
        ] {
            sub_attrs.insert(sa.name.clone(), sa);
        }

        let mut meta = ComplexAttribute::new(META);
        meta.add_instance(sub_attrs);
        self.core.insert(meta);
    }

    /// Bump `meta.lastModified` and `meta.version` to the given CSN.
    pub fn update_last_mod_time(&mut self, csn: &Csn) {
        if let Some(meta) = self.core.complex_mut(META).and_then(ComplexAttribute::first_mut) {
            meta.insert(
                META_LAST_MODIFIED.into(),
                SimpleAttribute::single(META_LAST_MODIFIED, csn.time_millis()),
            );
            meta.insert(
                META_VERSION.into(),
                SimpleAttribute::single(META_VERSION, csn.to_string()),
            );
        }
    }

    /// Rewrite `schemas` to the main schema followed by the present extensions.
    pub fn update_schemas(&mut self, rt: &ResourceType) {
        let mut values = vec![Value::from(rt.schema.as_str())];
        values.extend(self.ext.keys().map(|urn| Value::from(urn.as_str())));
        self.core.insert(SimpleAttribute::new(SCHEMAS, values));
    }

    /// Strip client supplied read-only attributes, keeping `schemas`.
    pub fn remove_read_only(&mut self, rt: &ResourceType) {
        let main = rt.main_schema();
        remove_read_only_from(&mut self.core, main);
        for (urn, group) in self.ext.iter_mut() {
            if let Some(sc) = rt.schema(urn) {
                remove_read_only_from(group, sc);
            }
        }
        self.ext.retain(|_, group| !group.is_empty());
    }

    /// Fail with BadRequest when a required attribute is absent.
    pub fn check_missing_required(&self, rt: &ResourceType) -> ScimResult<()> {
        for (urn, group) in self.groups(rt) {
            let Some(sc) = rt.schema(urn) else {
                continue;
            };
            check_required_in_group(group, sc)?;
        }
        for urn in rt.required_extensions() {
            if !self.ext.contains_key(urn) {
                return Err(ScimError::bad_request(format!(
                    "Required extension {} is missing from the resource",
                    urn
                )));
            }
        }
        Ok(())
    }

    /// Render as SCIM JSON, omitting attributes that are never returned.
    pub fn to_json(&self, rt: &ResourceType) -> JsonValue {
        let mut obj = group_to_json(&self.core, rt.main_schema());
        for (urn, group) in &self.ext {
            if let Some(sc) = rt.schema(urn) {
                obj.insert(urn.clone(), JsonValue::Object(group_to_json(group, sc)));
            }
        }
        JsonValue::Object(obj)
    }

    /// Whether `members` contains an instance with `value = id`.
    pub fn has_member(&self, id: &str) -> bool {
        has_value_in(&self.core, MEMBERS, id)
    }

    /// Whether `groups` contains an instance with `value = gid`.
    pub fn is_member_of(&self, gid: &str) -> bool {
        has_value_in(&self.core, GROUPS, gid)
    }

    /// Remove the `members` instance whose value is `id`.
    pub fn remove_member(&mut self, id: &str) -> Option<SubAttributes> {
        remove_value_in(&mut self.core, MEMBERS, id)
    }

    /// Remove the `groups` back-link to `gid`.
    pub fn remove_member_of(&mut self, gid: &str) -> Option<SubAttributes> {
        remove_value_in(&mut self.core, GROUPS, gid)
    }

    /// The `value` sub-attribute of every instance of `members`.
    pub fn member_ids(&self) -> Vec<String> {
        instance_values(&self.core, MEMBERS)
    }

    /// The `value` sub-attribute of every instance of `groups`.
    pub fn group_ids(&self) -> Vec<String> {
        instance_values(&self.core, GROUPS)
    }
}

/// All values of `at` within one group.
pub(crate) fn values_in_group<'a>(group: &'a AtGroup, at: &AttrType) -> Vec<&'a Value> {
    match &at.parent {
        Some(parent) => group
            .complex(parent)
            .map(|ca| {
                ca.instances()
                    .filter_map(|(_, sub_attrs)| sub_attrs.get(&at.norm_name))
                    .flat_map(|sa| sa.values.iter())
                    .collect()
            })
            .unwrap_or_default(),
        None => group
            .simple(&at.norm_name)
            .map(|sa| sa.values.iter().collect())
            .unwrap_or_default(),
    }
}

fn remove_read_only_from(group: &mut AtGroup, sc: &Schema) {
    for name in group.names() {
        let Some(at) = sc.attribute(&name) else {
            continue;
        };
        if at.is_read_only() {
            if name != SCHEMAS {
                group.remove(&name);
            }
            continue;
        }

        if let Some(ca) = group.complex_mut(&name) {
            for key in ca.keys() {
                if let Some(sub_attrs) = ca.instance_mut(key) {
                    sub_attrs.retain(|sub, _| {
                        at.sub_attribute(sub).is_none_or(|sat| !sat.is_read_only())
                    });
                    if sub_attrs.is_empty() {
                        ca.remove_instance(key);
                    }
                }
            }
            if ca.is_empty() {
                group.remove(&name);
            }
        }
    }
}

fn check_required_in_group(group: &AtGroup, sc: &Schema) -> ScimResult<()> {
    for path in &sc.required_ats {
        let missing = match path.split_once('.') {
            Some((parent, sub)) => group
                .complex(parent)
                .is_some_and(|ca| ca.instances().any(|(_, sub_attrs)| !sub_attrs.contains_key(sub))),
            None => !group.contains(path),
        };
        if missing {
            return Err(ScimError::bad_request(format!(
                "Required attribute {} of schema {} is missing from the resource",
                path, sc.id
            )));
        }
    }
    Ok(())
}

fn group_to_json(group: &AtGroup, sc: &Schema) -> Map<String, JsonValue> {
    let mut obj = Map::new();
    for (name, attr) in group.iter() {
        let Some(at) = sc.attribute(name) else {
            continue;
        };
        if at.returned == Returned::Never {
            continue;
        }
        let json = match attr {
            Attribute::Simple(sa) => simple_to_json(sa, at),
            Attribute::Complex(ca) => {
                let mut instances: Vec<JsonValue> = ca
                    .instances()
                    .map(|(_, sub_attrs)| sub_attributes_to_json(sub_attrs, at))
                    .collect();
                if at.multi_valued {
                    JsonValue::Array(instances)
                } else if instances.is_empty() {
                    continue;
                } else {
                    instances.swap_remove(0)
                }
            }
        };
        obj.insert(at.name.clone(), json);
    }
    obj
}

fn sub_attributes_to_json(sub_attrs: &SubAttributes, parent: &AttrType) -> JsonValue {
    let mut obj = Map::new();
    for (name, sa) in sub_attrs {
        if let Some(sat) = parent.sub_attribute(name) {
            if sat.returned != Returned::Never {
                obj.insert(sat.name.clone(), simple_to_json(sa, sat));
            }
        }
    }
    JsonValue::Object(obj)
}

fn simple_to_json(sa: &SimpleAttribute, at: &AttrType) -> JsonValue {
    if at.multi_valued {
        JsonValue::Array(sa.values.iter().map(|v| v.to_json(at)).collect())
    } else {
        sa.first().map(|v| v.to_json(at)).unwrap_or(JsonValue::Null)
    }
}

fn has_value_in(group: &AtGroup, attr: &str, id: &str) -> bool {
    group
        .complex(attr)
        .is_some_and(|ca| ca.has_value(&Value::from(id)))
}

fn remove_value_in(group: &mut AtGroup, attr: &str, id: &str) -> Option<SubAttributes> {
    let ca = group.complex_mut(attr)?;
    let key = ca.find_value(&Value::from(id))?;
    let removed = ca.remove_instance(key);
    if ca.is_empty() {
        group.remove(attr);
    }
    removed
}

fn instance_values(group: &AtGroup, attr: &str) -> Vec<String> {
    group
        .complex(attr)
        .map(|ca| {
            ca.instances()
                .filter_map(|(_, sub_attrs)| sub_attrs.get(VALUE))
                .filter_map(SimpleAttribute::first)
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
