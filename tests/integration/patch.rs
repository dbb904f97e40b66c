//! PATCH semantics through the silo.

use crate::common::builders::{DeviceBuilder, UserBuilder};
use crate::common::fixtures::test_fixtures;
use crate::common::{create, fetch, id_of, open_silo, patch, patch_context};
use crate::{assert_consistent, assert_scim_error};
use scim_silo::{ScimType, Value};
use serde_json::json;

#[test]
fn test_replace_moves_index_entries() {
    let silo = open_silo();
    let device = create(
        &silo,
        &DeviceBuilder::new("11").with_rating(1).with_price(7.2).build(),
    );
    let id = id_of(&device);

    let patched = patch(
        &silo,
        "Device",
        &id,
        json!([{"op": "replace", "value": {"rating": 2, "price": 9.2}}]),
    )
    .unwrap();

    let loaded = fetch(&silo, "Device", &id);
    assert_eq!(loaded, patched);
    let rt = silo.registry().resource_type("Device").unwrap();
    assert_eq!(loaded.values_at(rt, "rating"), vec![&Value::Int(2)]);
    assert_eq!(loaded.values_at(rt, "price"), vec![&Value::Float(9.2)]);

    assert!(silo.lookup_index("Device", "price", &Value::Float(7.2)).is_empty());
    assert_eq!(silo.lookup_index("Device", "price", &Value::Float(9.2)), vec![id.clone()]);
    assert!(silo.lookup_index("Device", "rating", &Value::Int(1)).is_empty());
    assert_eq!(silo.lookup_index("Device", "rating", &Value::Int(2)), vec![id]);
    assert_consistent!(silo);
}

#[test]
fn test_patch_bumps_version_and_last_modified() {
    let silo = open_silo();
    let device = create(&silo, &DeviceBuilder::new("11").build());
    let id = id_of(&device);

    let patched = patch(&silo, "Device", &id, json!([{"op": "add", "path": "rating", "value": 5}])).unwrap();

    assert_ne!(patched.version(), device.version());
    assert!(patched.last_modified() >= device.last_modified());
    assert_eq!(patched.created(), device.created());
}

#[test]
fn test_patch_without_change_keeps_version() {
    let silo = open_silo();
    let device = create(&silo, &DeviceBuilder::new("11").with_rating(3).build());
    let id = id_of(&device);

    let patched = patch(&silo, "Device", &id, json!([{"op": "replace", "path": "rating", "value": 3}])).unwrap();
    assert_eq!(patched.version(), device.version());
    assert_eq!(fetch(&silo, "Device", &id), device);
}

#[test]
fn test_stale_if_match_is_rejected_without_mutation() {
    let silo = open_silo();
    let device = create(&silo, &DeviceBuilder::new("11").with_rating(1).build());
    let id = id_of(&device);
    patch(&silo, "Device", &id, json!([{"op": "replace", "path": "rating", "value": 2}])).unwrap();

    let stale = device.version().unwrap().to_string();
    let ctx = patch_context(&silo, "Device", &id, json!([{"op": "replace", "path": "rating", "value": 9}]))
        .with_if_match(stale);
    assert_scim_error!(silo.patch(ctx), 412);

    let rt = silo.registry().resource_type("Device").unwrap();
    assert_eq!(fetch(&silo, "Device", &id).values_at(rt, "rating"), vec![&Value::Int(2)]);
}

#[test]
fn test_matching_if_match_is_accepted() {
    let silo = open_silo();
    let device = create(&silo, &DeviceBuilder::new("11").build());
    let id = id_of(&device);

    let ctx = patch_context(&silo, "Device", &id, json!([{"op": "add", "path": "rating", "value": 4}]))
        .with_if_match(device.version().unwrap());
    let patched = silo.patch(ctx).unwrap();
    assert_ne!(patched.version(), device.version());
}

#[test]
fn test_failed_operation_leaves_resource_untouched() {
    let silo = open_silo();
    let device = create(&silo, &test_fixtures::device_full("11"));
    let id = id_of(&device);

    // the second operation fails, so the first must not be applied either
    let result = patch(
        &silo,
        "Device",
        &id,
        json!([
            {"op": "replace", "path": "rating", "value": 4},
            {"op": "replace", "path": "macId", "value": "00:00:00:00:00:00"}
        ]),
    );
    assert_scim_error!(result, 400, ScimType::Mutability);
    assert_eq!(fetch(&silo, "Device", &id), device);
    assert_eq!(silo.lookup_index("Device", "rating", &Value::Int(1)), vec![id]);
}

#[test]
fn test_remove_required_attribute_is_rejected() {
    let silo = open_silo();
    let id = id_of(&create(&silo, &DeviceBuilder::new("11").build()));

    let result = patch(&silo, "Device", &id, json!([{"op": "remove", "path": "serialNumber"}]));
    assert_scim_error!(result, 400, ScimType::Mutability);
}

#[test]
fn test_remove_with_unmatched_selector_is_no_target() {
    let silo = open_silo();
    let id = id_of(&create(&silo, &test_fixtures::device_full("11")));

    let result = patch(
        &silo,
        "Device",
        &id,
        json!([{"op": "remove", "path": "photos[value eq \"missing.jpg\"]"}]),
    );
    assert_scim_error!(result, 400, ScimType::NoTarget);
}

#[test]
fn test_remove_selected_instance_updates_index() {
    let silo = open_silo();
    let id = id_of(&create(&silo, &test_fixtures::device_full("11")));

    patch(&silo, "Device", &id, json!([{"op": "remove", "path": "photos[value eq \"xyz.jpg\"]"}])).unwrap();

    assert!(silo.lookup_index("Device", "photos.value", &Value::from("xyz.jpg")).is_empty());
    assert_eq!(silo.lookup_index("Device", "photos.value", &Value::from("abc.jpg")), vec![id]);
    assert_consistent!(silo);
}

#[test]
fn test_primary_is_exclusive_after_patch() {
    let silo = open_silo();
    let id = id_of(&create(&silo, &test_fixtures::device_full("11")));

    let patched = patch(
        &silo,
        "Device",
        &id,
        json!([{"op": "replace", "path": "photos[value eq \"xyz.jpg\"].primary", "value": true}]),
    )
    .unwrap();

    let photos = patched.core.complex("photos").unwrap();
    let primaries: Vec<_> = photos
        .instances()
        .filter(|(_, sub_attrs)| scim_silo::resource::attribute::is_primary(sub_attrs))
        .map(|(_, sub_attrs)| sub_attrs["value"].first().cloned())
        .collect();
    assert_eq!(primaries, vec![Some(Value::from("xyz.jpg"))]);
}

#[test]
fn test_extension_attributes_can_be_patched() {
    let silo = open_silo();
    let id = id_of(&create(&silo, &UserBuilder::new("bjensen").build()));
    let urn = "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User";

    let patched = patch(
        &silo,
        "User",
        &id,
        json!([{"op": "add", "path": format!("{}:employeeNumber", urn), "value": "701984"}]),
    )
    .unwrap();
    assert!(patched.schema_ids().contains(&urn));

    let patched = patch(&silo, "User", &id, json!([{"op": "remove", "path": urn}])).unwrap();
    assert!(!patched.schema_ids().contains(&urn));
    assert!(patched.ext.is_empty());
}

#[test]
fn test_patch_unknown_resource_is_not_found() {
    let silo = open_silo();
    let result = patch(&silo, "Device", "missing", json!([{"op": "add", "path": "rating", "value": 1}]));
    assert_scim_error!(result, 404);
}

#[test]
fn test_read_only_groups_of_user_cannot_be_patched() {
    let silo = open_silo();
    let id = id_of(&create(&silo, &UserBuilder::new("bjensen").build()));

    let result = patch(&silo, "User", &id, json!([{"op": "add", "path": "groups", "value": [{"value": "g1"}]}]));
    assert_scim_error!(result, 400, ScimType::Mutability);
}
