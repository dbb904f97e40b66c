//! Evaluation of bound filters against resources.

use std::cmp::Ordering;

use super::{FilterNode, Op};
use crate::resource::resource::values_in_group;
use crate::resource::{Resource, Value};
use crate::schema::{AttrType, ResourceType};

/// Whether `rs` matches the bound filter `node`.
///
/// Unbound leaves never match. A leaf on a multivalued attribute, or on a
/// sub-attribute of a multivalued parent, matches when any value matches.
pub fn evaluate(node: &FilterNode, rs: &Resource, rt: &ResourceType) -> bool {
    match node.op {
        Op::And => node.children.iter().all(|child| evaluate(child, rs, rt)),
        Op::Or => node.children.iter().any(|child| evaluate(child, rs, rt)),
        Op::Not => node
            .children
            .first()
            .is_some_and(|child| !evaluate(child, rs, rt)),
        Op::Pr => is_present(node, rs, rt),
        _ => compare_leaf(node, rs, rt),
    }
}

fn is_present(node: &FilterNode, rs: &Resource, rt: &ResourceType) -> bool {
    let (Some(at), Some(urn)) = (node.at_type(), node.schema_urn()) else {
        return false;
    };
    if node.count() == Some(0) {
        return false;
    }
    let Some(group) = rs.group(rt, urn) else {
        return false;
    };
    if at.is_complex() {
        return group
            .complex(&at.norm_name)
            .is_some_and(|ca| !ca.is_empty());
    }
    !values_in_group(group, at).is_empty()
}

fn compare_leaf(node: &FilterNode, rs: &Resource, rt: &ResourceType) -> bool {
    let (Some(at), Some(urn)) = (node.at_type(), node.schema_urn()) else {
        return false;
    };
    if at.is_complex() || node.count() == Some(0) {
        return false;
    }
    let Some(expected) = node.norm_value() else {
        return false;
    };
    let Some(group) = rs.group(rt, urn) else {
        return false;
    };
    values_in_group(group, at)
        .into_iter()
        .any(|value| compare(node.op, &value.normalized(at), expected, at))
}

/// Apply a comparison operator to a normalized value and a normalized literal.
pub(crate) fn compare(op: Op, value: &Value, expected: &Value, at: &AttrType) -> bool {
    match (value, expected) {
        (Value::Str(v), Value::Str(e)) => match op {
            Op::Co => v.contains(e.as_str()),
            Op::Sw => v.starts_with(e.as_str()),
            Op::Ew => v.ends_with(e.as_str()),
            _ => ordered(op, v.cmp(e)),
        },
        (Value::Bool(v), Value::Bool(e)) => match op {
            Op::Eq => v == e,
            Op::Ne => v != e,
            _ => false,
        },
        (Value::Int(v), Value::Int(e)) => ordered(op, v.cmp(e)),
        (Value::Bytes(v), Value::Bytes(e)) => match op {
            Op::Eq => v == e,
            Op::Ne => v != e,
            Op::Sw => v.starts_with(e),
            Op::Ew => v.ends_with(e),
            Op::Co => e.is_empty() || v.windows(e.len()).any(|w| w == e.as_slice()),
            _ => false,
        },
        _ if !at.is_string_like() => match (value.as_f64(), expected.as_f64()) {
            (Some(v), Some(e)) => v.partial_cmp(&e).is_some_and(|ord| ordered(op, ord)),
            _ => false,
        },
        _ => false,
    }
}

fn ordered(op: Op, ord: Ordering) -> bool {
    match op {
        Op::Eq => ord == Ordering::Equal,
        Op::Ne => ord != Ordering::Equal,
        Op::Gt => ord == Ordering::Greater,
        Op::Lt => ord == Ordering::Less,
        Op::Ge => ord != Ordering::Less,
        Op::Le => ord != Ordering::Greater,
        _ => false,
    }
}
