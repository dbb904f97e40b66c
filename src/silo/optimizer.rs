//! Index-driven candidate selection for searches.
//!
//! The optimizer first annotates every node of a bound filter with the number
//! of candidates the indexes predict for it, then gathers candidate ids when
//! the whole filter is a single indexable leaf. Candidates are only a
//! superset: every one of them is still evaluated against the full filter.

use std::cmp::Reverse;

use log::debug;

use super::index::IndexSet;
use crate::filter::{FilterNode, Op};
use crate::storage::Bucket;

/// Count of a node that can only be answered by scanning every resource.
pub const FULL_SCAN: u64 = u64::MAX;

/// Annotate `node` and its children with predicted candidate counts and
/// reorder the children of AND (ascending) and OR (descending) nodes.
pub fn estimate(node: &mut FilterNode, indexes: &IndexSet, root: &Bucket) -> u64 {
    let count = match node.op {
        Op::Eq => leaf_count(node, indexes, root),
        Op::Pr => presence_count(node, indexes, root),
        Op::Not => {
            for child in node.children.iter_mut() {
                estimate(child, indexes, root);
            }
            FULL_SCAN
        }
        Op::And => {
            let counts: Vec<u64> = node
                .children
                .iter_mut()
                .map(|child| estimate(child, indexes, root))
                .collect();
            node.children.sort_by_key(|child| child.count().unwrap_or(FULL_SCAN));
            if counts.contains(&FULL_SCAN) {
                FULL_SCAN
            } else {
                counts.into_iter().min().unwrap_or(FULL_SCAN)
            }
        }
        Op::Or => {
            let counts: Vec<u64> = node
                .children
                .iter_mut()
                .map(|child| estimate(child, indexes, root))
                .collect();
            node.children
                .sort_by_key(|child| Reverse(child.count().unwrap_or(FULL_SCAN)));
            counts
                .into_iter()
                .try_fold(0u64, |sum, count| match count {
                    FULL_SCAN => None,
                    count => sum.checked_add(count),
                })
                .unwrap_or(FULL_SCAN)
        }
        _ => FULL_SCAN,
    };

    node.set_count(count);
    count
}

fn leaf_count(node: &FilterNode, indexes: &IndexSet, root: &Bucket) -> u64 {
    let (Some(at), Some(value)) = (node.at_type(), node.norm_value()) else {
        return FULL_SCAN;
    };
    match indexes.get(&at.norm_path()) {
        Some(idx) => idx.key_count(root, value),
        None => FULL_SCAN,
    }
}

fn presence_count(node: &FilterNode, indexes: &IndexSet, root: &Bucket) -> u64 {
    let Some(at) = node.at_type() else {
        return FULL_SCAN;
    };
    let path = at.norm_path();
    if !indexes.contains(&path) {
        return FULL_SCAN;
    }
    indexes.presence().key_count_raw(root, path.as_bytes())
}

/// Candidate ids for an estimated filter, or `None` when a full scan is needed.
pub fn candidates(node: &FilterNode, indexes: &IndexSet, root: &Bucket) -> Option<Vec<String>> {
    let count = node.count()?;
    if !node.is_leaf() || count == FULL_SCAN {
        return None;
    }

    let at = node.at_type()?;
    let path = at.norm_path();
    let rids = match node.op {
        Op::Eq => indexes.get(&path)?.get_rids(root, node.norm_value()?),
        Op::Pr => indexes.presence().get_rids_raw(root, path.as_bytes()),
        _ => return None,
    };
    debug!("Using index of {} for {} candidates", path, rids.len());
    Some(rids)
}
