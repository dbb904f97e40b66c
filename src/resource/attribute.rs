//! Simple and complex attributes and the groups that hold them.
//!
//! Attributes carry their normalized name only. The descriptor
//! ([`AttrType`](crate::schema::AttrType)) is resolved on demand through the
//! owning resource type, which keeps stored records free of schema data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::value::Value;

/// Name of the sub-attribute that flags the preferred instance.
pub const PRIMARY: &str = "primary";

/// Name of the sub-attribute holding an instance's main value.
pub const VALUE: &str = "value";

/// An attribute with one or more scalar values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleAttribute {
    pub name: String,
    pub values: Vec<Value>,
}

impl SimpleAttribute {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn single(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(name, vec![value.into()])
    }

    pub fn first(&self) -> Option<&Value> {
        self.values.first()
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.values.contains(value)
    }

    /// Order-insensitive, case-sensitive equality of the value sets.
    pub fn same_values(&self, other: &SimpleAttribute) -> bool {
        self.values.len() == other.values.len()
            && self.values.iter().all(|v| other.values.contains(v))
    }
}

/// Sub-attributes of one complex attribute instance, keyed by normalized name.
pub type SubAttributes = BTreeMap<String, SimpleAttribute>;

/// An attribute made of one or more instances of sub-attributes.
///
/// Instances are keyed by a per-attribute counter. Keys are never reused, so
/// removing or selecting an instance never shifts the others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexAttribute {
    pub name: String,
    instances: BTreeMap<u64, SubAttributes>,
    next_key: u64,
}

impl ComplexAttribute {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instances: BTreeMap::new(),
            next_key: 0,
        }
    }

    /// Append an instance and return its key.
    pub fn add_instance(&mut self, sub_attrs: SubAttributes) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        self.instances.insert(key, sub_attrs);
        key
    }

    pub fn instance(&self, key: u64) -> Option<&SubAttributes> {
        self.instances.get(&key)
    }

    pub fn instance_mut(&mut self, key: u64) -> Option<&mut SubAttributes> {
        self.instances.get_mut(&key)
    }

    pub fn remove_instance(&mut self, key: u64) -> Option<SubAttributes> {
        self.instances.remove(&key)
    }

    pub fn instances(&self) -> impl Iterator<Item = (u64, &SubAttributes)> {
        self.instances.iter().map(|(k, v)| (*k, v))
    }

    pub fn instances_mut(&mut self) -> impl Iterator<Item = (u64, &mut SubAttributes)> {
        self.instances.iter_mut().map(|(k, v)| (*k, v))
    }

    pub fn keys(&self) -> Vec<u64> {
        self.instances.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// The first instance in key order.
    pub fn first(&self) -> Option<(u64, &SubAttributes)> {
        self.instances.iter().next().map(|(k, v)| (*k, v))
    }

    pub fn first_mut(&mut self) -> Option<&mut SubAttributes> {
        self.instances.values_mut().next()
    }

    /// First value of the named sub-attribute in the first instance.
    pub fn value_of(&self, sub_attr: &str) -> Option<&Value> {
        self.first()
            .and_then(|(_, sub_attrs)| sub_attrs.get(sub_attr))
            .and_then(|sa| sa.first())
    }

    /// Whether any instance has `primary = true`.
    pub fn has_primary(&self) -> bool {
        self.instances.values().any(is_primary)
    }

    /// Clear `primary` on every instance, returning whether anything changed.
    pub fn unset_primary(&mut self) -> bool {
        let mut changed = false;
        for sub_attrs in self.instances.values_mut() {
            if let Some(sa) = sub_attrs.get_mut(PRIMARY) {
                if sa.first() == Some(&Value::Bool(true)) {
                    sa.values = vec![Value::Bool(false)];
                    changed = true;
                }
            }
        }
        changed
    }

    /// Key of the first instance whose `value` sub-attribute equals `value`.
    pub fn find_value(&self, value: &Value) -> Option<u64> {
        self.instances
            .iter()
            .find(|(_, sub_attrs)| {
                sub_attrs
                    .get(VALUE)
                    .and_then(|sa| sa.first())
                    .is_some_and(|v| v == value)
            })
            .map(|(k, _)| *k)
    }

    pub fn has_value(&self, value: &Value) -> bool {
        self.find_value(value).is_some()
    }

    /// Whether an instance with exactly these sub-attribute values exists.
    pub fn contains_instance(&self, candidate: &SubAttributes) -> bool {
        self.instances
            .values()
            .any(|existing| same_sub_attributes(existing, candidate))
    }
}

/// Whether the instance is flagged primary.
pub fn is_primary(sub_attrs: &SubAttributes) -> bool {
    sub_attrs
        .get(PRIMARY)
        .and_then(|sa| sa.first())
        .is_some_and(|v| *v == Value::Bool(true))
}

/// Equality of two instances, ignoring value order within each sub-attribute.
pub fn same_sub_attributes(a: &SubAttributes, b: &SubAttributes) -> bool {
    a.len() == b.len()
        && a.iter()
            .all(|(name, sa)| b.get(name).is_some_and(|other| sa.same_values(other)))
}

/// Either kind of attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attribute {
    Simple(SimpleAttribute),
    Complex(ComplexAttribute),
}

impl Attribute {
    pub fn name(&self) -> &str {
        match self {
            Attribute::Simple(sa) => &sa.name,
            Attribute::Complex(ca) => &ca.name,
        }
    }

    pub fn as_simple(&self) -> Option<&SimpleAttribute> {
        match self {
            Attribute::Simple(sa) => Some(sa),
            Attribute::Complex(_) => None,
        }
    }

    pub fn as_complex(&self) -> Option<&ComplexAttribute> {
        match self {
            Attribute::Complex(ca) => Some(ca),
            Attribute::Simple(_) => None,
        }
    }

    pub fn as_simple_mut(&mut self) -> Option<&mut SimpleAttribute> {
        match self {
            Attribute::Simple(sa) => Some(sa),
            Attribute::Complex(_) => None,
        }
    }

    pub fn as_complex_mut(&mut self) -> Option<&mut ComplexAttribute> {
        match self {
            Attribute::Complex(ca) => Some(ca),
            Attribute::Simple(_) => None,
        }
    }
}

impl From<SimpleAttribute> for Attribute {
    fn from(sa: SimpleAttribute) -> Self {
        Attribute::Simple(sa)
    }
}

impl From<ComplexAttribute> for Attribute {
    fn from(ca: ComplexAttribute) -> Self {
        Attribute::Complex(ca)
    }
}

/// All attributes of a resource that belong to one schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AtGroup {
    attrs: BTreeMap<String, Attribute>,
}

impl AtGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attrs.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attrs.get_mut(name)
    }

    pub fn simple(&self, name: &str) -> Option<&SimpleAttribute> {
        self.get(name).and_then(Attribute::as_simple)
    }

    pub fn simple_mut(&mut self, name: &str) -> Option<&mut SimpleAttribute> {
        self.get_mut(name).and_then(Attribute::as_simple_mut)
    }

    pub fn complex(&self, name: &str) -> Option<&ComplexAttribute> {
        self.get(name).and_then(Attribute::as_complex)
    }

    pub fn complex_mut(&mut self, name: &str) -> Option<&mut ComplexAttribute> {
        self.get_mut(name).and_then(Attribute::as_complex_mut)
    }

    /// Insert an attribute, replacing any attribute with the same name.
    pub fn insert(&mut self, attr: impl Into<Attribute>) -> Option<Attribute> {
        let attr = attr.into();
        self.attrs.insert(attr.name().to_string(), attr)
    }

    pub fn remove(&mut self, name: &str) -> Option<Attribute> {
        self.attrs.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Attribute)> {
        self.attrs.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.attrs.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}
