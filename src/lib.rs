//! Embedded SCIM 2.0 resource store for Rust.
//!
//! Stores SCIM resources (RFC 7643) in a transactional bucket store, keeps
//! secondary indexes over configured attributes, evaluates RFC 7644 filters
//! with an index-aware optimizer and applies PATCH requests, keeping Group
//! membership and User back-links consistent.
//!
//! # Core Components
//!
//! - [`Silo`] - the store facade running every operation in one transaction
//! - [`SchemaRegistry`] - schemas and resource types, with embedded defaults
//! - [`Resource`] - the typed resource model with JSON parse and render
//! - [`filter`] - filter parsing, evaluation and value selectors
//! - [`PatchRequest`] - validated PATCH requests
//!
//! # Quick Start
//!
//! ```rust
//! use scim_silo::context::{CreateContext, PatchContext};
//! use scim_silo::{PatchRequest, Resource, SchemaRegistry, Silo, SiloConfig};
//! use serde_json::json;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let silo = Silo::open(None, SiloConfig::default(), SchemaRegistry::with_embedded_schemas()?)?;
//!
//! let device = Resource::parse(silo.registry(), &json!({
//!     "schemas": ["urn:keydap:params:scim:schemas:core:2.0:Device"],
//!     "serialNumber": "S-1"
//! }))?;
//! let device = silo.insert(CreateContext::new(device))?;
//! let id = device.id().unwrap_or_default().to_string();
//!
//! let rt = silo.registry().resource_type("Device").ok_or("no Device type")?;
//! let request = PatchRequest::parse(&json!({
//!     "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
//!     "Operations": [{"op": "add", "value": {"rating": 1}}]
//! }), rt)?;
//! let patched = silo.patch(PatchContext::new("Device", id, request))?;
//! assert_ne!(patched.version(), device.version());
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod config;
pub mod context;
pub mod csn;
pub mod error;
pub mod filter;
pub mod patch;
pub mod resource;
pub mod schema;
pub mod silo;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::{ResourceConf, SiloConfig};
pub use csn::{Csn, CsnGenerator};
pub use error::{ScimError, ScimResult, ScimType};
pub use filter::{FilterNode, parse_filter};
pub use patch::{PatchOp, PatchOpKind, PatchRequest};
pub use resource::{Resource, Value};
pub use schema::{ResourceType, Schema, SchemaRegistry};
pub use silo::Silo;
