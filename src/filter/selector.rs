//! Selection of complex attribute instances by a value filter.
//!
//! A patch path such as `emails[type eq "work"].value` carries a filter that
//! picks instances of `emails`. The [`Selector`] evaluates such a filter over
//! each instance separately and yields the keys of the matching instances.

use std::collections::BTreeSet;

use super::evaluator::compare;
use super::{FilterNode, Op, parse_filter};
use crate::error::ScimResult;
use crate::resource::{ComplexAttribute, SubAttributes};
use crate::schema::ResourceType;

/// A bound value filter over the instances of one complex attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    node: FilterNode,
    text: String,
}

impl Selector {
    /// Parse and bind a selector such as `emails[type eq "work"]`.
    ///
    /// Attributes that do not exist in `rt` are NotFound.
    pub fn parse(text: &str, rt: &ResourceType) -> ScimResult<Selector> {
        let node = parse_filter(text)?;
        Self::from_node(node, text, rt)
    }

    pub fn from_node(mut node: FilterNode, text: &str, rt: &ResourceType) -> ScimResult<Selector> {
        node.bind_strict(rt)?;
        Ok(Selector {
            node,
            text: text.to_string(),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn node(&self) -> &FilterNode {
        &self.node
    }

    /// Keys of the instances of `ca` that match.
    pub fn find(&self, ca: &ComplexAttribute) -> BTreeSet<u64> {
        find(&self.node, ca)
    }
}

fn find(node: &FilterNode, ca: &ComplexAttribute) -> BTreeSet<u64> {
    match node.op {
        Op::And => {
            let mut children = node.children.iter();
            let Some(first) = children.next() else {
                return BTreeSet::new();
            };
            children.fold(find(first, ca), |acc, child| {
                if acc.is_empty() {
                    return acc;
                }
                let keys = find(child, ca);
                acc.intersection(&keys).copied().collect()
            })
        }
        Op::Or => node
            .children
            .iter()
            .flat_map(|child| find(child, ca))
            .collect(),
        Op::Not => {
            let excluded = node
                .children
                .first()
                .map(|child| find(child, ca))
                .unwrap_or_default();
            ca.keys()
                .into_iter()
                .filter(|key| !excluded.contains(key))
                .collect()
        }
        _ => ca
            .instances()
            .filter(|(_, sub_attrs)| instance_matches(node, sub_attrs))
            .map(|(key, _)| key)
            .collect(),
    }
}

fn instance_matches(node: &FilterNode, sub_attrs: &SubAttributes) -> bool {
    let Some(at) = node.at_type() else {
        return false;
    };
    let present = sub_attrs.get(&at.norm_name);

    if node.op == Op::Pr {
        return present.is_some_and(|sa| !sa.values.is_empty());
    }

    let Some(sa) = present else {
        // an empty literal also selects instances lacking the sub-attribute
        return node.value.as_deref().is_none_or(str::is_empty);
    };
    let Some(expected) = node.norm_value() else {
        return node.value.as_deref().is_none_or(str::is_empty)
            && sa.values.iter().any(|v| v.as_str().is_some_and(str::is_empty));
    };
    sa.values
        .iter()
        .any(|value| compare(node.op, &value.normalized(at), expected, at))
}
