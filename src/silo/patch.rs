//! Application of patch operations to a resource.
//!
//! Operations are applied to an in-memory copy of the stored resource. The
//! silo then derives index changes and group side effects by comparing the
//! copy with the stored state, so nothing here touches the store.

use log::debug;
use serde_json::{Map, Value as JsonValue};

use crate::error::{ScimError, ScimResult, ScimType};
use crate::patch::{ParsedPath, PatchOp, PatchOpKind};
use crate::resource::attribute::{PRIMARY, VALUE, is_primary};
use crate::resource::parse::{parse_complex, parse_simple, parse_sub_attributes};
use crate::resource::resource::{MEMBERS, SCHEMAS};
use crate::resource::{AtGroup, Attribute, ComplexAttribute, Resource, SimpleAttribute, SubAttributes, Value};
use crate::schema::{AttrType, ResourceType};

/// Applies the operations of one patch request to a resource.
pub struct Patcher<'a> {
    rt: &'a ResourceType,
    rs: &'a mut Resource,
    changed: bool,
}

impl<'a> Patcher<'a> {
    pub fn new(rt: &'a ResourceType, rs: &'a mut Resource) -> Self {
        Self {
            rt,
            rs,
            changed: false,
        }
    }

    /// Whether any applied operation changed the resource.
    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn apply_all(&mut self, ops: &[PatchOp]) -> ScimResult<bool> {
        for op in ops {
            self.apply(op)?;
        }
        if self.changed {
            self.rs.ext.retain(|_, group| !group.is_empty());
            self.rs.update_schemas(self.rt);
        }
        Ok(self.changed)
    }

    pub fn apply(&mut self, op: &PatchOp) -> ScimResult<()> {
        debug!("Applying patch {} operation {}", op.op, op.index);
        match (op.op, &op.path) {
            (PatchOpKind::Remove, Some(path)) => self.remove(op, path),
            (PatchOpKind::Remove, None) => Err(ScimError::bad_request_with(
                ScimType::NoTarget,
                format!("No path is given for the remove operation {}", op.index),
            )),
            (kind, path) => {
                let value = op.value.as_ref().ok_or_else(|| {
                    ScimError::bad_request_with(
                        ScimType::InvalidValue,
                        format!("No value is given for the {} operation {}", kind, op.index),
                    )
                })?;
                match path {
                    None => self.apply_object(kind, value, op.index),
                    Some(path) if path.is_ext_container => self.apply_extension(kind, path, value, op.index),
                    Some(path) if path.sub_attr.is_some() => self.apply_sub_attribute(kind, path, value, op.index),
                    Some(path) => self.apply_attribute(kind, path, value, op.index),
                }
            }
        }
    }

    fn mark(&mut self, changed: bool) {
        self.changed |= changed;
    }

    /// Add or replace without a path: the value is a partial resource.
    fn apply_object(&mut self, kind: PatchOpKind, value: &JsonValue, index: usize) -> ScimResult<()> {
        let obj = as_object(value, index)?;
        let incoming = Resource::from_object(self.rt, obj)?;

        let groups: Vec<(String, AtGroup)> = std::iter::once((self.rt.schema.clone(), incoming.core))
            .chain(incoming.ext)
            .collect();
        for (urn, group) in groups {
            for (name, attr) in group.iter() {
                if name == SCHEMAS {
                    continue;
                }
                let at = self.attr_in(&urn, name)?;
                self.merge(kind, &urn, at, attr.clone())?;
            }
        }
        Ok(())
    }

    /// Add or replace a whole extension container.
    fn apply_extension(
        &mut self,
        kind: PatchOpKind,
        path: &ParsedPath,
        value: &JsonValue,
        index: usize,
    ) -> ScimResult<()> {
        let urn = path.urn(self.rt).to_string();
        let mut wrapped = Map::new();
        wrapped.insert(urn.clone(), JsonValue::Object(as_object(value, index)?.clone()));
        let mut incoming = Resource::from_object(self.rt, &wrapped)?;
        let group = incoming.ext.remove(&urn).unwrap_or_default();

        if kind == PatchOpKind::Replace {
            let existing: Vec<String> = self
                .rs
                .ext
                .get(&urn)
                .map(AtGroup::names)
                .unwrap_or_default();
            for name in existing.iter().filter(|name| !group.contains(name)) {
                let at = self.attr_in(&urn, name)?;
                if at.is_read_only() || at.is_immutable() {
                    continue;
                }
                if let Some(ext) = self.rs.ext.get_mut(&urn) {
                    let removed = ext.remove(name).is_some();
                    self.mark(removed);
                }
            }
        }

        for (name, attr) in group.iter() {
            let at = self.attr_in(&urn, name)?;
            self.merge(kind, &urn, at, attr.clone())?;
        }
        Ok(())
    }

    /// Add or replace a top-level attribute named by the path.
    fn apply_attribute(
        &mut self,
        kind: PatchOpKind,
        path: &ParsedPath,
        value: &JsonValue,
        index: usize,
    ) -> ScimResult<()> {
        let rt = self.rt;
        let urn = path.urn(rt).to_string();
        let at = path.attr_type(rt).ok_or_else(|| unknown_path(path))?;
        check_writable(kind, at)?;

        if at.is_simple() {
            return match parse_simple(at, &wrap_multi(at, value))? {
                Some(sa) => self.merge(kind, &urn, at, Attribute::Simple(sa)),
                None => Ok(()),
            };
        }

        if !at.multi_valued {
            let sub_attrs = parse_sub_attributes(at, value)?;
            return self.merge_single_complex(&urn, at, sub_attrs);
        }

        match value {
            JsonValue::Array(_) => {
                if kind == PatchOpKind::Replace && path.selector.is_some() {
                    return Err(ScimError::bad_request(format!(
                        "Cannot replace multi-valued attribute {} when a selector is present and an array of values is given in operation {}",
                        at.name, index
                    )));
                }
                match parse_complex(at, value)? {
                    Some(ca) => self.merge(kind, &urn, at, Attribute::Complex(ca)),
                    None if kind == PatchOpKind::Replace => {
                        self.check_removable(at)?;
                        let removed = self
                            .rs
                            .group_mut(rt, &urn)
                            .and_then(|group| group.remove(&at.norm_name))
                            .is_some();
                        self.mark(removed);
                        Ok(())
                    }
                    None => Ok(()),
                }
            }
            _ => {
                let sub_attrs = parse_sub_attributes(at, value)?;
                if sub_attrs.is_empty() {
                    return Ok(());
                }
                match (kind, &path.selector) {
                    (PatchOpKind::Replace, Some(_)) => {
                        self.merge_into_selected(path, &urn, at, sub_attrs, index)
                    }
                    (PatchOpKind::Replace, None) => {
                        let mut ca = ComplexAttribute::new(at.norm_name.clone());
                        ca.add_instance(sub_attrs);
                        self.merge(kind, &urn, at, Attribute::Complex(ca))
                    }
                    _ => {
                        let mut ca = ComplexAttribute::new(at.norm_name.clone());
                        ca.add_instance(sub_attrs);
                        self.merge(PatchOpKind::Add, &urn, at, Attribute::Complex(ca))
                    }
                }
            }
        }
    }

    /// Add or replace a sub-attribute in the targeted instances.
    fn apply_sub_attribute(
        &mut self,
        kind: PatchOpKind,
        path: &ParsedPath,
        value: &JsonValue,
        index: usize,
    ) -> ScimResult<()> {
        let rt = self.rt;
        let urn = path.urn(rt).to_string();
        let parent = path.attr_type(rt).ok_or_else(|| unknown_path(path))?;
        let sat = path.sub_attr_type(rt).ok_or_else(|| unknown_path(path))?;
        check_writable(kind, parent)?;
        check_writable(kind, sat)?;

        let Some(sa) = parse_simple(sat, &wrap_multi(sat, value))? else {
            return Ok(());
        };
        let sets_primary = sat.norm_name == PRIMARY && sa.first() == Some(&Value::Bool(true));

        let group = self.rs.group_or_insert(rt, &urn);
        if !group.contains(&parent.norm_name) {
            group.insert(ComplexAttribute::new(parent.norm_name.clone()));
        }
        let ca = group.complex_mut(&parent.norm_name).ok_or_else(|| {
            ScimError::internal(format!("attribute {} is not a complex attribute", parent.name))
        })?;

        let targets: Vec<u64> = match &path.selector {
            Some(selector) => {
                let keys: Vec<u64> = selector.find(ca).into_iter().collect();
                if keys.is_empty() {
                    return Err(no_target(path, index));
                }
                keys
            }
            None if ca.is_empty() => vec![ca.add_instance(SubAttributes::new())],
            None if kind == PatchOpKind::Replace && parent.multi_valued => ca.keys(),
            None => ca.first().map(|(key, _)| vec![key]).unwrap_or_default(),
        };

        let mut changed = false;
        if sets_primary {
            if targets.len() > 1 {
                return Err(ScimError::bad_request(format!(
                    "Cannot set the primary flag on more than one instance of {} in operation {}",
                    parent.name, index
                )));
            }
            changed |= unset_primary_except(ca, &targets);
        }

        for key in targets {
            let Some(sub_attrs) = ca.instance_mut(key) else {
                continue;
            };
            match sub_attrs.get_mut(&sat.norm_name) {
                None => {
                    sub_attrs.insert(sat.norm_name.clone(), sa.clone());
                    changed = true;
                }
                Some(existing) => {
                    let modified = if kind == PatchOpKind::Add && sat.multi_valued {
                        append_distinct(existing, &sa)
                    } else if existing.same_values(&sa) {
                        false
                    } else {
                        existing.values = sa.values.clone();
                        true
                    };
                    if modified && sat.is_immutable() {
                        return Err(ScimError::mutability(format!(
                            "Cannot modify immutable attribute {}.{}",
                            parent.name, sat.name
                        )));
                    }
                    changed |= modified;
                }
            }
        }

        self.mark(changed);
        Ok(())
    }

    /// Merge one parsed attribute into the resource.
    fn merge(&mut self, kind: PatchOpKind, urn: &str, at: &AttrType, attr: Attribute) -> ScimResult<()> {
        check_writable(kind, at)?;
        let members = self.is_members(at);
        let rt = self.rt;
        let group = self.rs.group_or_insert(rt, urn);
        if !group.contains(&at.norm_name) {
            group.insert(attr);
            self.mark(true);
            return Ok(());
        }

        let existing = group
            .get_mut(&at.norm_name)
            .ok_or_else(|| ScimError::internal(format!("attribute {} vanished", at.name)))?;
        let changed = match (existing, attr) {
            (Attribute::Simple(existing), Attribute::Simple(sa)) => {
                if kind == PatchOpKind::Add && at.multi_valued {
                    append_distinct(existing, &sa)
                } else if existing.same_values(&sa) {
                    false
                } else {
                    existing.values = sa.values;
                    true
                }
            }
            (Attribute::Complex(existing), Attribute::Complex(ca)) => {
                if !at.multi_valued {
                    let incoming = ca.first().map(|(_, sub_attrs)| sub_attrs.clone()).unwrap_or_default();
                    merge_sub_attributes(existing, incoming)
                } else if kind == PatchOpKind::Add {
                    append_instances(existing, &ca, members)
                } else if members && same_member_values(existing, &ca) {
                    false
                } else if same_instances(existing, &ca) {
                    false
                } else {
                    *existing = ca;
                    true
                }
            }
            _ => {
                return Err(ScimError::internal(format!(
                    "attribute {} does not match its type",
                    at.name
                )));
            }
        };

        if changed && at.is_immutable() {
            return Err(ScimError::mutability(format!(
                "Cannot modify immutable attribute {}, a value already exists",
                at.name
            )));
        }
        self.mark(changed);
        Ok(())
    }

    fn merge_single_complex(&mut self, urn: &str, at: &AttrType, sub_attrs: SubAttributes) -> ScimResult<()> {
        if sub_attrs.is_empty() {
            return Ok(());
        }
        let mut ca = ComplexAttribute::new(at.norm_name.clone());
        ca.add_instance(sub_attrs);
        self.merge(PatchOpKind::Add, urn, at, Attribute::Complex(ca))
    }

    fn merge_into_selected(
        &mut self,
        path: &ParsedPath,
        urn: &str,
        at: &AttrType,
        sub_attrs: SubAttributes,
        index: usize,
    ) -> ScimResult<()> {
        let Some(selector) = &path.selector else {
            return Ok(());
        };
        let ca = self
            .rs
            .group_mut(self.rt, urn)
            .and_then(|group| group.complex_mut(&at.norm_name))
            .ok_or_else(|| no_target(path, index))?;
        let targets: Vec<u64> = selector.find(ca).into_iter().collect();
        if targets.is_empty() {
            return Err(no_target(path, index));
        }

        let mut changed = false;
        if is_primary(&sub_attrs) {
            if targets.len() > 1 {
                return Err(ScimError::bad_request(format!(
                    "Cannot set the primary flag on more than one instance of {} in operation {}",
                    at.name, index
                )));
            }
            changed |= unset_primary_except(ca, &targets);
        }
        for key in targets {
            if let Some(instance) = ca.instance_mut(key) {
                changed |= merge_into(instance, &sub_attrs);
            }
        }
        self.mark(changed);
        Ok(())
    }

    fn remove(&mut self, op: &PatchOp, path: &ParsedPath) -> ScimResult<()> {
        let rt = self.rt;
        let urn = path.urn(rt).to_string();

        if path.is_ext_container {
            if rt.required_extensions().any(|required| required == urn) {
                return Err(ScimError::mutability(format!(
                    "Cannot remove the required extension {}",
                    urn
                )));
            }
            let removed = self.rs.ext.remove(&urn).is_some();
            self.mark(removed);
            return Ok(());
        }

        let at = path.attr_type(rt).ok_or_else(|| unknown_path(path))?;
        let target = path.sub_attr_type(rt).unwrap_or(at);
        for candidate in [at, target] {
            self.check_removable(candidate)?;
        }

        let Some(group) = self.rs.group_mut(rt, &urn) else {
            return Ok(());
        };

        let changed = match (&path.sub_attr, &path.selector) {
            (Some(sub), selector) => {
                let Some(ca) = group.complex_mut(&at.norm_name) else {
                    return Ok(());
                };
                let targets: Vec<u64> = match selector {
                    Some(selector) => {
                        let keys: Vec<u64> = selector.find(ca).into_iter().collect();
                        if keys.is_empty() {
                            return Err(no_target(path, op.index));
                        }
                        keys
                    }
                    None => ca.keys(),
                };
                let mut changed = false;
                for key in targets {
                    let emptied = match ca.instance_mut(key) {
                        Some(sub_attrs) => {
                            changed |= sub_attrs.remove(sub).is_some();
                            sub_attrs.is_empty()
                        }
                        None => false,
                    };
                    if emptied {
                        ca.remove_instance(key);
                    }
                }
                if ca.is_empty() {
                    group.remove(&at.norm_name);
                }
                changed
            }
            (None, Some(selector)) => {
                let Some(attr) = group.get_mut(&at.norm_name) else {
                    return Ok(());
                };
                let Some(ca) = attr.as_complex_mut() else {
                    return Err(ScimError::bad_request(format!(
                        "The attribute {} of the selector {} in operation {} is not a complex attribute",
                        at.name, path.text, op.index
                    )));
                };
                let keys = selector.find(ca);
                if keys.is_empty() {
                    return Err(no_target(path, op.index));
                }
                for key in keys {
                    ca.remove_instance(key);
                }
                if ca.is_empty() {
                    group.remove(&at.norm_name);
                }
                true
            }
            (None, None) => group.remove(&at.norm_name).is_some(),
        };

        if group.is_empty() && urn != rt.schema {
            self.rs.ext.remove(&urn);
        }
        self.mark(changed);
        Ok(())
    }

    fn check_removable(&self, at: &AttrType) -> ScimResult<()> {
        if at.is_read_only() || at.is_immutable() || at.required {
            let mutability = if at.required { "required" } else { at.mutability.as_str() };
            return Err(ScimError::mutability(format!(
                "Cannot remove {} attribute {} from resource {}",
                mutability,
                at.name,
                self.rs.id().unwrap_or_default()
            )));
        }
        Ok(())
    }

    fn attr_in(&self, urn: &str, name: &str) -> ScimResult<&'a AttrType> {
        self.rt
            .schema(urn)
            .and_then(|sc| sc.attribute(name))
            .ok_or_else(|| {
                ScimError::bad_request_with(
                    ScimType::InvalidPath,
                    format!("Attribute {} is not found in the schema {}", name, urn),
                )
            })
    }

    fn is_members(&self, at: &AttrType) -> bool {
        at.norm_name == MEMBERS && at.parent.is_none() && self.rt.name == "Group"
    }
}

fn as_object(value: &JsonValue, index: usize) -> ScimResult<&Map<String, JsonValue>> {
    value.as_object().ok_or_else(|| {
        ScimError::bad_request_with(
            ScimType::InvalidValue,
            format!("Invalid value type given in the patch operation {}, expected an object", index),
        )
    })
}

fn unknown_path(path: &ParsedPath) -> ScimError {
    ScimError::bad_request_with(ScimType::InvalidPath, format!("Unknown attribute path {}", path.text))
}

fn no_target(path: &ParsedPath, index: usize) -> ScimError {
    ScimError::bad_request_with(
        ScimType::NoTarget,
        format!(
            "The selector {} present in the path of operation {} didn't match any attribute",
            path.text, index
        ),
    )
}

fn check_writable(kind: PatchOpKind, at: &AttrType) -> ScimResult<()> {
    if at.is_read_only() {
        return Err(ScimError::mutability(format!(
            "Cannot {} read-only attribute {}",
            kind, at.name
        )));
    }
    Ok(())
}

/// A lone value given for a multivalued simple attribute is a one-element array.
fn wrap_multi(at: &AttrType, value: &JsonValue) -> JsonValue {
    if at.multi_valued && !value.is_array() {
        JsonValue::Array(vec![value.clone()])
    } else {
        value.clone()
    }
}

fn append_distinct(existing: &mut SimpleAttribute, incoming: &SimpleAttribute) -> bool {
    let mut changed = false;
    for value in &incoming.values {
        if !existing.contains(value) {
            existing.values.push(value.clone());
            changed = true;
        }
    }
    changed
}

/// Append the instances of `incoming` that are not already present. A
/// primary incoming instance clears the flag on the existing ones. Members
/// are identified by their value alone.
fn append_instances(existing: &mut ComplexAttribute, incoming: &ComplexAttribute, by_value: bool) -> bool {
    let fresh: Vec<SubAttributes> = incoming
        .instances()
        .filter(|(_, sub_attrs)| !existing.contains_instance(sub_attrs))
        .filter(|(_, sub_attrs)| {
            !by_value
                || sub_attrs
                    .get(VALUE)
                    .and_then(SimpleAttribute::first)
                    .is_none_or(|value| !existing.has_value(value))
        })
        .map(|(_, sub_attrs)| sub_attrs.clone())
        .collect();
    if fresh.is_empty() {
        return false;
    }
    if fresh.iter().any(is_primary) {
        existing.unset_primary();
    }
    for sub_attrs in fresh {
        existing.add_instance(sub_attrs);
    }
    true
}

fn same_instances(a: &ComplexAttribute, b: &ComplexAttribute) -> bool {
    a.len() == b.len() && b.instances().all(|(_, sub_attrs)| a.contains_instance(sub_attrs))
}

/// Members carry a generated `$ref` and `type`, so they compare by value.
fn same_member_values(existing: &ComplexAttribute, incoming: &ComplexAttribute) -> bool {
    let values = |ca: &ComplexAttribute| -> Vec<Value> {
        ca.instances()
            .filter_map(|(_, sub_attrs)| sub_attrs.get(VALUE).and_then(SimpleAttribute::first).cloned())
            .collect()
    };
    let (ours, theirs) = (values(existing), values(incoming));
    ours.len() == existing.len()
        && theirs.len() == incoming.len()
        && theirs.iter().all(|value| ours.contains(value))
        && ours.iter().all(|value| theirs.contains(value))
}

fn merge_sub_attributes(existing: &mut ComplexAttribute, incoming: SubAttributes) -> bool {
    match existing.first_mut() {
        Some(target) => merge_into(target, &incoming),
        None => {
            existing.add_instance(incoming);
            true
        }
    }
}

fn merge_into(target: &mut SubAttributes, incoming: &SubAttributes) -> bool {
    if incoming.iter().all(|(name, sa)| target.get(name).is_some_and(|t| t.same_values(sa))) {
        return false;
    }
    for (name, sa) in incoming {
        target.insert(name.clone(), sa.clone());
    }
    true
}

fn unset_primary_except(ca: &mut ComplexAttribute, keep: &[u64]) -> bool {
    let mut changed = false;
    for (key, sub_attrs) in ca.instances_mut() {
        if keep.contains(&key) {
            continue;
        }
        if let Some(sa) = sub_attrs.get_mut(PRIMARY) {
            if sa.first() == Some(&Value::Bool(true)) {
                sa.values = vec![Value::Bool(false)];
                changed = true;
            }
        }
    }
    changed
}
