//! Schema definitions for SCIM resources.
//!
//! This module parses and validates RFC 7643 schemas and resource types and
//! resolves attribute paths to immutable [`AttrType`] descriptors.
//!
//! # Key Types
//!
//! - [`Schema`] - schema definition with attributes and classification sets
//! - [`ResourceType`] - endpoint binding of a main schema and its extensions
//! - [`SchemaRegistry`] - the set of schemas and resource types a silo serves
//!
//! # Examples
//!
//! ```rust
//! use scim_silo::schema::SchemaRegistry;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = SchemaRegistry::with_embedded_schemas()?;
//! let user = registry.resource_type("User").expect("embedded");
//! assert!(user.get_at_type("name.givenName").is_some());
//! assert!(user.get_at_type("name.nickname").is_none());
//! # Ok(())
//! # }
//! ```

pub mod embedded;
pub mod registry;
pub mod resource_type;
pub mod types;


pub use registry::SchemaRegistry;
pub use resource_type::{ResourceType, SchemaExtension};
pub use types::{ATTR_DELIM, AttrType, AttributeType, Mutability, Returned, Schema, Uniqueness, URN_DELIM};
