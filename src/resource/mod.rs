//! SCIM resource model.
//!
//! This module provides the in-memory and stored representation of SCIM
//! resources, independent of any wire format.
//!
//! # Key Components
//!
//! * [`Value`] - closed set of typed attribute values
//! * [`SimpleAttribute`] / [`ComplexAttribute`] - attributes with normalized names
//! * [`AtGroup`] - the attributes of one schema
//! * [`Resource`] - core group plus extension groups, with JSON parse and render

pub mod attribute;
pub mod parse;
pub mod resource;
pub mod value;


pub use attribute::{AtGroup, Attribute, ComplexAttribute, SimpleAttribute, SubAttributes};
pub use resource::Resource;
pub use value::Value;
