//! Server-unique attributes.

use crate::common::builders::{DeviceBuilder, UserBuilder};
use crate::common::{create, id_of, open_silo, patch, try_create};
use crate::{assert_consistent, assert_error_message_contains, assert_scim_error};
use scim_silo::{ScimType, Value};
use serde_json::json;

#[test]
fn test_duplicate_user_name_conflicts() {
    let silo = open_silo();
    let first = create(&silo, &UserBuilder::new("bob").build());

    let result = try_create(&silo, &UserBuilder::new("bob").build());
    assert_scim_error!(&result, 409, ScimType::Uniqueness);
    assert_error_message_contains!(&result, "bob");

    assert_eq!(silo.lookup_index("User", "userName", &Value::from("bob")), vec![id_of(&first)]);
    assert_eq!(silo.count("User"), 1);
    assert_consistent!(silo);
}

#[test]
fn test_user_name_uniqueness_ignores_case() {
    let silo = open_silo();
    create(&silo, &UserBuilder::new("bob").build());
    assert_scim_error!(try_create(&silo, &UserBuilder::new("BOB").build()), 409, ScimType::Uniqueness);
}

#[test]
fn test_serial_number_conflict_on_patch() {
    let silo = open_silo();
    let first = id_of(&create(&silo, &DeviceBuilder::new("SN-1").build()));
    let second = create(&silo, &DeviceBuilder::new("SN-2").build());
    let second_id = id_of(&second);

    let result = patch(
        &silo,
        "Device",
        &second_id,
        json!([{"op": "replace", "path": "serialNumber", "value": "SN-1"}]),
    );
    assert_scim_error!(result, 409, ScimType::Uniqueness);

    assert_eq!(silo.lookup_index("Device", "serialNumber", &Value::from("SN-1")), vec![first]);
    assert_eq!(silo.lookup_index("Device", "serialNumber", &Value::from("SN-2")), vec![second_id]);
    assert_consistent!(silo);
}

#[test]
fn test_patch_keeping_own_unique_value_is_allowed() {
    let silo = open_silo();
    let id = id_of(&create(&silo, &UserBuilder::new("bob").build()));

    let patched = patch(
        &silo,
        "User",
        &id,
        json!([{"op": "replace", "value": {"userName": "bob", "displayName": "Bob"}}]),
    )
    .unwrap();
    assert_eq!(id_of(&patched), id);
    assert_eq!(id_of(&silo.get_user_by_name("bob").unwrap()), id);
}

#[test]
fn test_renamed_user_frees_old_name() {
    let silo = open_silo();
    let id = id_of(&create(&silo, &UserBuilder::new("bob").build()));
    patch(&silo, "User", &id, json!([{"op": "replace", "path": "userName", "value": "robert"}])).unwrap();

    assert_scim_error!(silo.get_user_by_name("bob"), 404);
    let other = create(&silo, &UserBuilder::new("bob").build());
    assert_ne!(id_of(&other), id);
    assert_consistent!(silo);
}
