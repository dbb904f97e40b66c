//! SCIM filter language.
//!
//! Filters are parsed once into a [`FilterNode`] tree, then bound to a
//! resource type with [`FilterNode::bind`], which resolves attribute paths and
//! converts every literal to a normalized [`Value`]. A bound tree is evaluated
//! against whole resources by [`evaluator::evaluate`] and against the instances
//! of one complex attribute by a [`selector::Selector`].
//!
//! ```rust
//! use scim_silo::filter::{Op, parse_filter};
//!
//! let node = parse_filter(r#"userName eq "bjensen" and not (title pr)"#).unwrap();
//! assert_eq!(node.op, Op::And);
//! assert_eq!(node.children[0].name, "username");
//! ```

pub mod evaluator;
mod parser;
pub mod selector;

use std::fmt;

use crate::error::{ScimError, ScimResult};
use crate::resource::Value;
use crate::schema::{AttrType, ResourceType};

pub use evaluator::evaluate;
pub use parser::parse_filter;
pub use selector::Selector;

/// Filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Eq,
    Ne,
    Co,
    Sw,
    Ew,
    Gt,
    Lt,
    Ge,
    Le,
    Pr,
    Not,
    Or,
    And,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Eq => "eq",
            Op::Ne => "ne",
            Op::Co => "co",
            Op::Sw => "sw",
            Op::Ew => "ew",
            Op::Gt => "gt",
            Op::Lt => "lt",
            Op::Ge => "ge",
            Op::Le => "le",
            Op::Pr => "pr",
            Op::Not => "not",
            Op::Or => "or",
            Op::And => "and",
        }
    }

    /// Parse an operator keyword, ignoring case.
    pub fn from_keyword(keyword: &str) -> Option<Op> {
        let op = match keyword.to_ascii_lowercase().as_str() {
            "eq" => Op::Eq,
            "ne" => Op::Ne,
            "co" => Op::Co,
            "sw" => Op::Sw,
            "ew" => Op::Ew,
            "gt" => Op::Gt,
            "lt" => Op::Lt,
            "ge" => Op::Ge,
            "le" => Op::Le,
            "pr" => Op::Pr,
            "not" => Op::Not,
            "or" => Op::Or,
            "and" => Op::And,
            _ => return None,
        };
        Some(op)
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, Op::And | Op::Or)
    }

    pub fn is_comparison(&self) -> bool {
        !matches!(self, Op::Pr | Op::Not | Op::Or | Op::And)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node of a parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterNode {
    pub op: Op,
    /// Lowercase attribute path, empty for logical and NOT nodes
    pub name: String,
    /// The literal as written, without quotes
    pub value: Option<String>,
    pub children: Vec<FilterNode>,
    urn: Option<String>,
    at: Option<AttrType>,
    norm_value: Option<Value>,
    count: Option<u64>,
}

impl FilterNode {
    pub fn leaf(op: Op, name: impl Into<String>, value: Option<String>) -> Self {
        Self {
            op,
            name: name.into(),
            value,
            children: Vec::new(),
            urn: None,
            at: None,
            norm_value: None,
            count: None,
        }
    }

    pub fn branch(op: Op, children: Vec<FilterNode>) -> Self {
        Self {
            op,
            name: String::new(),
            value: None,
            children,
            urn: None,
            at: None,
            norm_value: None,
            count: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty() && !self.op.is_logical() && self.op != Op::Not
    }

    /// Resolve attribute paths against `rt` and normalize literals.
    ///
    /// Unknown paths stay unbound and never match. A literal that cannot be
    /// converted to the attribute's type is an invalidFilter error. Any
    /// memoized counts are cleared.
    pub fn bind(&mut self, rt: &ResourceType) -> ScimResult<()> {
        self.count = None;
        if !self.is_leaf() {
            for child in self.children.iter_mut() {
                child.bind(rt)?;
            }
            return Ok(());
        }

        self.urn = None;
        self.at = None;
        self.norm_value = None;
        if let Some((urn, at)) = rt.resolve(&self.name) {
            self.norm_value = normalize_literal(self.op, self.value.as_deref(), at)?;
            self.urn = Some(urn.to_string());
            self.at = Some(at.clone());
        }
        Ok(())
    }

    /// Bind a selector expression, where unknown attributes are NotFound.
    pub(crate) fn bind_strict(&mut self, rt: &ResourceType) -> ScimResult<()> {
        self.bind(rt)?;
        self.check_bound(rt)
    }

    fn check_bound(&self, rt: &ResourceType) -> ScimResult<()> {
        if self.is_leaf() {
            if self.at.is_none() {
                return Err(ScimError::not_found(format!(
                    "Attribute {} present in the path selector is not found in the resource type {}",
                    self.name, rt.name
                )));
            }
            return Ok(());
        }
        self.children.iter().try_for_each(|child| child.check_bound(rt))
    }

    /// The bound attribute descriptor, if the path resolved.
    pub fn at_type(&self) -> Option<&AttrType> {
        self.at.as_ref()
    }

    /// URN of the schema owning the bound attribute.
    pub fn schema_urn(&self) -> Option<&str> {
        self.urn.as_deref()
    }

    /// The literal converted to the attribute's type and normalized.
    pub fn norm_value(&self) -> Option<&Value> {
        self.norm_value.as_ref()
    }

    /// The memoized candidate count.
    pub fn count(&self) -> Option<u64> {
        self.count
    }

    pub(crate) fn set_count(&mut self, count: u64) {
        self.count = Some(count);
    }
}

fn normalize_literal(op: Op, literal: Option<&str>, at: &AttrType) -> ScimResult<Option<Value>> {
    if !op.is_comparison() || at.is_complex() {
        return Ok(None);
    }
    match literal {
        Some(lit) if !lit.is_empty() => {
            Ok(Some(Value::from_literal(at, lit)?.normalized(at)))
        }
        _ => Ok(None),
    }
}

impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            Op::Not => match self.children.first() {
                Some(child) => write!(f, "not ({})", child),
                None => f.write_str("not ()"),
            },
            Op::And | Op::Or => {
                for (i, child) in self.children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", self.op)?;
                    }
                    if child.op.is_logical() {
                        write!(f, "({})", child)?;
                    } else {
                        write!(f, "{}", child)?;
                    }
                }
                Ok(())
            }
            Op::Pr => write!(f, "{} pr", self.name),
            _ => write!(
                f,
                "{} {} \"{}\"",
                self.name,
                self.op,
                self.value.as_deref().unwrap_or_default()
            ),
        }
    }
}
