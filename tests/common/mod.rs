//! Common test utilities for silo integration testing.
//!
//! This module provides macros, builders and helpers shared by the
//! integration tests: opening silos, creating resources from JSON bodies
//! and building patch requests.

use scim_silo::context::{CreateContext, GetContext, PatchContext};
use scim_silo::patch::PATCH_OP_SCHEMA;
use scim_silo::{PatchRequest, Resource, SchemaRegistry, ScimResult, Silo, SiloConfig};
use serde_json::{Value, json};
use std::path::Path;

pub mod fixtures;

/// Route `log` output through the test harness. Safe to call repeatedly.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// An in-memory silo with the embedded schemas and default indexes.
pub fn open_silo() -> Silo {
    open_silo_with(SiloConfig::default())
}

pub fn open_silo_with(config: SiloConfig) -> Silo {
    init_logging();
    let registry = SchemaRegistry::with_embedded_schemas().expect("embedded schemas must load");
    Silo::open(None, config, registry).expect("in-memory silo must open")
}

/// A file-backed silo at `path`.
pub fn open_silo_at(path: &Path, config: SiloConfig) -> Silo {
    init_logging();
    let registry = SchemaRegistry::with_embedded_schemas().expect("embedded schemas must load");
    Silo::open(Some(path), config, registry).expect("file-backed silo must open")
}

/// Parse and insert a resource body, returning the stored resource.
pub fn create(silo: &Silo, body: &Value) -> Resource {
    try_create(silo, body).expect("resource must be created")
}

pub fn try_create(silo: &Silo, body: &Value) -> ScimResult<Resource> {
    let rs = Resource::parse(silo.registry(), body)?;
    silo.insert(CreateContext::new(rs))
}

pub fn fetch(silo: &Silo, rt_name: &str, id: &str) -> Resource {
    silo.get(GetContext::new(rt_name, id)).expect("resource must exist")
}

pub fn id_of(rs: &Resource) -> String {
    rs.id().expect("stored resources carry an id").to_string()
}

/// Wrap operations into a PatchOp message body.
pub fn patch_body(operations: Value) -> Value {
    json!({
        "schemas": [PATCH_OP_SCHEMA],
        "Operations": operations
    })
}

pub fn patch_context(silo: &Silo, rt_name: &str, id: &str, operations: Value) -> PatchContext {
    let rt = silo.registry().resource_type(rt_name).expect("resource type must exist");
    let request = PatchRequest::parse(&patch_body(operations), rt).expect("patch request must parse");
    PatchContext::new(rt_name, id, request)
}

/// Parse and apply a patch without a version check.
pub fn patch(silo: &Silo, rt_name: &str, id: &str, operations: Value) -> ScimResult<Resource> {
    silo.patch(patch_context(silo, rt_name, id, operations))
}

/// Render a stored resource for assertions on its JSON form.
pub fn render(silo: &Silo, rs: &Resource) -> Value {
    let rt = silo
        .registry()
        .resource_type(&rs.type_name)
        .expect("resource type must exist");
    rs.to_json(rt)
}

/// Assert that a result failed with the given HTTP status, and optionally
/// the given `scimType`.
#[macro_export]
macro_rules! assert_scim_error {
    ($result:expr, $status:expr) => {
        match $result {
            Err(err) => assert_eq!(
                err.status(),
                $status,
                "Expected status {}, got error {:?}",
                $status,
                err
            ),
            Ok(_) => panic!("Expected an error with status {}, but the operation succeeded", $status),
        }
    };
    ($result:expr, $status:expr, $scim_type:expr) => {
        match $result {
            Err(err) => {
                assert_eq!(err.status(), $status, "Unexpected status for error {:?}", err);
                assert_eq!(err.scim_type(), Some($scim_type), "Unexpected scimType for error {:?}", err);
            }
            Ok(_) => panic!(
                "Expected an error with status {} and scimType {:?}, but the operation succeeded",
                $status, $scim_type
            ),
        }
    };
}

/// Custom assertion macro for specific error messages
#[macro_export]
macro_rules! assert_error_message_contains {
    ($result:expr, $substring:expr) => {
        match $result {
            Err(err) => assert!(
                err.to_string().contains($substring),
                "Error message '{}' does not contain '{}'",
                err.to_string(),
                $substring
            ),
            Ok(_) => panic!("Expected error containing '{}', but the operation succeeded", $substring),
        }
    };
}

/// Assert that every index of the silo agrees with the stored resources.
#[macro_export]
macro_rules! assert_consistent {
    ($silo:expr) => {
        assert!(
            $silo.is_consistent().expect("consistency check must run"),
            "Indexes disagree with the stored resources"
        )
    };
}
