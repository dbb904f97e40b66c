//! Insert, get and delete round trips.

use crate::common::builders::{DeviceBuilder, UserBuilder};
use crate::common::fixtures::test_fixtures;
use crate::common::{create, fetch, id_of, open_silo, render, try_create};
use crate::{assert_consistent, assert_scim_error};
use scim_silo::context::{DeleteContext, GetContext};
use scim_silo::{Value, silo::USER};
use serde_json::json;

#[test]
fn test_insert_assigns_id_and_meta() {
    let silo = open_silo();
    let user = create(&silo, &UserBuilder::new_full().build());

    let id = id_of(&user);
    assert!(uuid::Uuid::parse_str(&id).is_ok(), "id {} is not a UUID", id);
    assert!(user.version().is_some());
    assert!(user.created().is_some());
    assert_eq!(user.created(), user.last_modified());

    let body = render(&silo, &user);
    assert_eq!(body["meta"]["resourceType"], "User");
    assert_eq!(body["userName"], "bjensen@example.com");
    assert_eq!(silo.count(USER), 1);
}

#[test]
fn test_client_supplied_id_and_meta_are_ignored() {
    let silo = open_silo();
    let body = UserBuilder::new("bjensen")
        .with_attribute("id", json!("client-chosen"))
        .with_attribute("meta", json!({"version": "W/\"1\""}))
        .build();

    let user = create(&silo, &body);
    assert_ne!(id_of(&user), "client-chosen");
    assert_ne!(user.version(), Some("W/\"1\""));
}

#[test]
fn test_get_returns_stored_resource() {
    let silo = open_silo();
    let device = create(&silo, &test_fixtures::device_full("11"));
    let id = id_of(&device);

    let loaded = fetch(&silo, "Device", &id);
    assert_eq!(loaded, device);

    let rt = silo.registry().resource_type("Device").unwrap();
    assert_eq!(loaded.values_at(rt, "rating"), vec![&Value::Int(1)]);
    assert_eq!(loaded.values_at(rt, "location.latitude"), vec![&Value::Str("1.1".into())]);
}

#[test]
fn test_get_unknown_id_is_not_found() {
    let silo = open_silo();
    let result = silo.get(GetContext::new("User", "no-such-id"));
    assert_scim_error!(result, 404);
}

#[test]
fn test_missing_required_attribute_is_rejected() {
    let silo = open_silo();
    let mut body = DeviceBuilder::new("1").build();
    body.as_object_mut().unwrap().remove("serialNumber");

    let result = try_create(&silo, &body);
    assert_scim_error!(result, 400);
    assert_eq!(silo.count("Device"), 0);
}

#[test]
fn test_unknown_attribute_is_rejected() {
    let silo = open_silo();
    let body = UserBuilder::new("bjensen").with_attribute("shoeSize", json!(42)).build();
    assert_scim_error!(try_create(&silo, &body), 400);
}

#[test]
fn test_delete_removes_resource_and_index_entries() {
    let silo = open_silo();
    let device = create(&silo, &test_fixtures::device_full("11"));
    let id = id_of(&device);
    assert_eq!(silo.lookup_index("Device", "serialNumber", &Value::from("11")), vec![id.clone()]);

    silo.delete(DeleteContext::new("Device", &id)).unwrap();

    assert_scim_error!(silo.get(GetContext::new("Device", &id)), 404);
    assert!(silo.lookup_index("Device", "serialNumber", &Value::from("11")).is_empty());
    assert!(silo.lookup_index("Device", "manufacturer", &Value::from("keydap")).is_empty());
    assert_eq!(silo.count("Device"), 0);
    assert_consistent!(silo);
}

#[test]
fn test_delete_twice_is_not_found() {
    let silo = open_silo();
    let id = id_of(&create(&silo, &UserBuilder::new("bjensen").build()));

    silo.delete(DeleteContext::new("User", &id)).unwrap();
    assert_scim_error!(silo.delete(DeleteContext::new("User", &id)), 404);
}

#[test]
fn test_deleted_serial_number_can_be_reused() {
    let silo = open_silo();
    let first = create(&silo, &DeviceBuilder::new("SN-1").build());
    silo.delete(DeleteContext::new("Device", id_of(&first))).unwrap();

    let second = create(&silo, &DeviceBuilder::new("SN-1").build());
    assert_eq!(
        silo.lookup_index("Device", "serialNumber", &Value::from("SN-1")),
        vec![id_of(&second)]
    );
}
