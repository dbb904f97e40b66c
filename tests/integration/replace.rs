//! PUT semantics through the silo.

use crate::common::builders::{DeviceBuilder, GroupBuilder, UserBuilder};
use crate::common::{create, fetch, id_of, open_silo};
use crate::{assert_consistent, assert_scim_error};
use scim_silo::context::ReplaceContext;
use scim_silo::{Resource, ScimResult, ScimType, Silo, Value};
use serde_json::{Value as JsonValue, json};

fn replace(silo: &Silo, id: &str, mut body: JsonValue, if_match: Option<String>) -> ScimResult<Resource> {
    body["id"] = json!(id);
    let rs = Resource::parse(silo.registry(), &body)?;
    silo.replace(ReplaceContext::new(rs, if_match))
}

#[test]
fn test_replace_drops_absent_attributes() {
    let silo = open_silo();
    let device = create(
        &silo,
        &DeviceBuilder::new("11").with_manufacturer("keydap").with_rating(1).build(),
    );
    let id = id_of(&device);

    let replaced = replace(&silo, &id, DeviceBuilder::new("11").with_price(3.5).build(), None).unwrap();

    let rt = silo.registry().resource_type("Device").unwrap();
    assert!(replaced.values_at(rt, "manufacturer").is_empty());
    assert!(replaced.values_at(rt, "rating").is_empty());
    assert_eq!(replaced.values_at(rt, "price"), vec![&Value::Float(3.5)]);
    assert_eq!(replaced.created(), device.created());
    assert_ne!(replaced.version(), device.version());
    assert_eq!(fetch(&silo, "Device", &id), replaced);

    assert!(silo.lookup_index("Device", "manufacturer", &Value::from("keydap")).is_empty());
    assert_consistent!(silo);
}

#[test]
fn test_replace_keeps_immutable_value() {
    let silo = open_silo();
    let id = id_of(&create(&silo, &DeviceBuilder::new("11").with_mac_id("AA:BB").build()));

    let same = replace(&silo, &id, DeviceBuilder::new("11").with_mac_id("AA:BB").build(), None);
    assert!(same.is_ok());

    let changed = replace(&silo, &id, DeviceBuilder::new("11").with_mac_id("CC:DD").build(), None);
    assert_scim_error!(changed, 400, ScimType::Mutability);
}

#[test]
fn test_replace_with_stale_version_fails() {
    let silo = open_silo();
    let device = create(&silo, &DeviceBuilder::new("11").build());
    let id = id_of(&device);

    let fresh = device.version().map(str::to_string);
    let first = replace(&silo, &id, DeviceBuilder::new("11").with_rating(2).build(), fresh.clone()).unwrap();
    assert_ne!(first.version().map(str::to_string), fresh);

    let second = replace(&silo, &id, DeviceBuilder::new("11").with_rating(3).build(), fresh);
    assert_scim_error!(second, 412);
}

#[test]
fn test_replace_unique_value_taken_by_another() {
    let silo = open_silo();
    create(&silo, &UserBuilder::new("alice").build());
    let bob = id_of(&create(&silo, &UserBuilder::new("bob").build()));

    let result = replace(&silo, &bob, UserBuilder::new("Alice").build(), None);
    assert_scim_error!(result, 409, ScimType::Uniqueness);
    assert_eq!(silo.get_user_by_name("bob").map(|u| id_of(&u)).unwrap(), bob);
}

#[test]
fn test_replace_unknown_id_is_not_found() {
    let silo = open_silo();
    assert_scim_error!(replace(&silo, "missing", DeviceBuilder::new("1").build(), None), 404);
}

#[test]
fn test_replace_group_members_updates_back_links() {
    let silo = open_silo();
    let alice = id_of(&create(&silo, &UserBuilder::new("alice").build()));
    let bob = id_of(&create(&silo, &UserBuilder::new("bob").build()));
    let group = id_of(&create(&silo, &GroupBuilder::new("admins").with_member(&alice).build()));

    replace(&silo, &group, GroupBuilder::new("admins").with_member(&bob).build(), None).unwrap();

    assert!(fetch(&silo, "User", &alice).group_ids().is_empty());
    assert_eq!(fetch(&silo, "User", &bob).group_ids(), vec![group.clone()]);
    assert_eq!(fetch(&silo, "Group", &group).member_ids(), vec![bob]);
    assert_consistent!(silo);
}
