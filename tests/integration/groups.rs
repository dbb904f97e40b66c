//! Group membership and the User `groups` back-links.

use crate::common::builders::{GroupBuilder, UserBuilder};
use crate::common::fixtures::rfc_examples;
use crate::common::{create, fetch, id_of, open_silo, open_silo_with, patch, try_create};
use crate::{assert_consistent, assert_scim_error};
use scim_silo::config::ResourceConf;
use scim_silo::context::{DeleteContext, GetContext, ModifyGroupsOfUserRequest};
use scim_silo::{Silo, SiloConfig, Value};
use serde_json::json;

fn user(silo: &Silo, name: &str) -> String {
    id_of(&create(silo, &UserBuilder::new(name).build()))
}

/// Every membership is mirrored by a back-link and vice versa.
fn assert_bidirectional(silo: &Silo, user_ids: &[&str], group_ids: &[&str]) {
    for gid in group_ids {
        let group = fetch(silo, "Group", gid);
        for uid in user_ids {
            let user = fetch(silo, "User", uid);
            assert_eq!(
                group.has_member(uid),
                user.is_member_of(gid),
                "membership of user {} in group {} is one-sided",
                uid,
                gid
            );
        }
    }
}

#[test]
fn test_insert_group_links_members() {
    let silo = open_silo();
    let alice = user(&silo, "alice");
    let group = create(&silo, &GroupBuilder::new("Tour Guides").with_member(&alice).build());
    let gid = id_of(&group);

    let rt = silo.registry().resource_type("Group").unwrap();
    assert_eq!(group.values_at(rt, "members.type"), vec![&Value::from("User")]);
    assert_eq!(
        group.values_at(rt, "members.$ref"),
        vec![&Value::from(format!("/Users/{}", alice))]
    );

    let alice_rs = fetch(&silo, "User", &alice);
    assert_eq!(alice_rs.group_ids(), vec![gid.clone()]);
    let user_rt = silo.registry().resource_type("User").unwrap();
    assert_eq!(alice_rs.values_at(user_rt, "groups.display"), vec![&Value::from("Tour Guides")]);
    assert_eq!(alice_rs.values_at(user_rt, "groups.type"), vec![&Value::from("Group")]);
    assert_eq!(
        silo.lookup_index("User", "groups.value", &Value::from(gid.as_str())),
        vec![alice]
    );
    assert_consistent!(silo);
}

#[test]
fn test_missing_member_is_rejected() {
    let silo = open_silo();
    let result = try_create(&silo, &GroupBuilder::new("ghosts").with_member("no-such-user").build());
    assert_scim_error!(result, 404);
    assert_eq!(silo.count("Group"), 0);
}

#[test]
fn test_duplicate_members_are_collapsed() {
    let silo = open_silo();
    let alice = user(&silo, "alice");
    let group = create(
        &silo,
        &GroupBuilder::new("dups").with_member(&alice).with_member(&alice).build(),
    );
    assert_eq!(group.member_ids(), vec![alice.clone()]);
    assert_eq!(fetch(&silo, "User", &alice).group_ids().len(), 1);
}

#[test]
fn test_patch_add_existing_member_is_noop() {
    let silo = open_silo();
    let alice = user(&silo, "alice");
    let group = create(&silo, &GroupBuilder::new("admins").with_member(&alice).build());
    let gid = id_of(&group);

    let patched = patch(&silo, "Group", &gid, rfc_examples::add_member_operation(&alice)).unwrap();

    assert_eq!(patched.member_ids(), vec![alice.clone()]);
    assert_eq!(patched.version(), group.version());
    assert_eq!(fetch(&silo, "User", &alice).group_ids(), vec![gid]);
}

#[test]
fn test_patch_add_and_remove_members() {
    let silo = open_silo();
    let alice = user(&silo, "alice");
    let bob = user(&silo, "bob");
    let gid = id_of(&create(&silo, &GroupBuilder::new("admins").with_member(&alice).build()));

    patch(&silo, "Group", &gid, rfc_examples::add_member_operation(&bob)).unwrap();
    assert_bidirectional(&silo, &[&alice, &bob], &[&gid]);
    assert!(fetch(&silo, "User", &bob).is_member_of(&gid));

    patch(&silo, "Group", &gid, rfc_examples::remove_member_operation(&alice)).unwrap();
    assert_bidirectional(&silo, &[&alice, &bob], &[&gid]);
    assert!(!fetch(&silo, "User", &alice).is_member_of(&gid));
    assert!(fetch(&silo, "User", &alice).group_ids().is_empty());
    assert_consistent!(silo);
}

#[test]
fn test_patch_replace_members() {
    let silo = open_silo();
    let alice = user(&silo, "alice");
    let bob = user(&silo, "bob");
    let gid = id_of(&create(&silo, &GroupBuilder::new("admins").with_member(&alice).build()));

    patch(
        &silo,
        "Group",
        &gid,
        json!([{"op": "replace", "path": "members", "value": [{"value": bob}]}]),
    )
    .unwrap();

    assert_eq!(fetch(&silo, "Group", &gid).member_ids(), vec![bob.clone()]);
    assert_bidirectional(&silo, &[&alice, &bob], &[&gid]);
}

#[test]
fn test_repeated_members_replace_keeps_version() {
    let silo = open_silo();
    let alice = user(&silo, "alice");
    let bob = user(&silo, "bob");
    let gid = id_of(&create(&silo, &GroupBuilder::new("admins").with_member(&alice).build()));

    let replace = json!([{"op": "replace", "path": "members", "value": [{"value": bob}]}]);
    let first = patch(&silo, "Group", &gid, replace.clone()).unwrap();
    let second = patch(&silo, "Group", &gid, replace).unwrap();
    assert_eq!(second.version(), first.version());
    assert_eq!(second.last_modified(), first.last_modified());

    // the path-less form and a duplicated member change nothing either
    let third = patch(
        &silo,
        "Group",
        &gid,
        json!([{"op": "replace", "value": {"members": [{"value": bob}, {"value": bob}]}}]),
    )
    .unwrap();
    assert_eq!(third.version(), first.version());
    assert_eq!(fetch(&silo, "Group", &gid).member_ids(), vec![bob.clone()]);
    assert_bidirectional(&silo, &[&alice, &bob], &[&gid]);
}

#[test]
fn test_patch_remove_all_members() {
    let silo = open_silo();
    let alice = user(&silo, "alice");
    let bob = user(&silo, "bob");
    let gid = id_of(&create(
        &silo,
        &GroupBuilder::new("admins").with_member(&alice).with_member(&bob).build(),
    ));

    patch(&silo, "Group", &gid, json!([{"op": "remove", "path": "members"}])).unwrap();

    assert!(fetch(&silo, "Group", &gid).member_ids().is_empty());
    assert!(fetch(&silo, "User", &alice).group_ids().is_empty());
    assert!(fetch(&silo, "User", &bob).group_ids().is_empty());
    assert_consistent!(silo);
}

#[test]
fn test_deleting_user_strips_memberships() {
    let silo = open_silo();
    let alice = user(&silo, "alice");
    let bob = user(&silo, "bob");
    let group = create(
        &silo,
        &GroupBuilder::new("admins").with_member(&alice).with_member(&bob).build(),
    );
    let gid = id_of(&group);

    silo.delete(DeleteContext::new("User", &alice)).unwrap();

    let group_after = fetch(&silo, "Group", &gid);
    assert_eq!(group_after.member_ids(), vec![bob]);
    assert_eq!(group_after.version(), group.version());
    assert!(silo.lookup_index("Group", "members.value", &Value::from(alice.as_str())).is_empty());
    assert_consistent!(silo);
}

#[test]
fn test_deleting_group_unlinks_users() {
    let silo = open_silo();
    let alice = user(&silo, "alice");
    let gid = id_of(&create(&silo, &GroupBuilder::new("admins").with_member(&alice).build()));

    silo.delete(DeleteContext::new("Group", &gid)).unwrap();

    assert!(fetch(&silo, "User", &alice).group_ids().is_empty());
    assert!(silo.lookup_index("User", "groups.value", &Value::from(gid.as_str())).is_empty());
    assert_consistent!(silo);
}

#[test]
fn test_deleting_group_deletes_nested_groups() {
    let silo = open_silo();
    let alice = user(&silo, "alice");
    let child = id_of(&create(&silo, &GroupBuilder::new("child").with_member(&alice).build()));
    let parent = id_of(&create(&silo, &GroupBuilder::new("parent").with_group_member(&child).build()));

    silo.delete(DeleteContext::new("Group", &parent)).unwrap();

    assert_scim_error!(silo.get(GetContext::new("Group", &child)), 404);
    assert!(fetch(&silo, "User", &alice).group_ids().is_empty());
    assert_eq!(silo.count("Group"), 0);
    assert_consistent!(silo);
}

#[test]
fn test_deleting_nested_group_strips_it_from_parent() {
    let silo = open_silo();
    let child = id_of(&create(&silo, &GroupBuilder::new("child").build()));
    let parent = id_of(&create(&silo, &GroupBuilder::new("parent").with_group_member(&child).build()));

    silo.delete(DeleteContext::new("Group", &child)).unwrap();

    assert!(fetch(&silo, "Group", &parent).member_ids().is_empty());
}

#[test]
fn test_memberships_without_members_index() {
    let mut config = SiloConfig::default();
    config.resources.retain(|conf| conf.name != "Group");
    config.resources.push(ResourceConf::new("Group", &[]));
    let silo = open_silo_with(config);

    let alice = user(&silo, "alice");
    let gid = id_of(&create(&silo, &GroupBuilder::new("admins").with_member(&alice).build()));
    assert!(silo.lookup_index("Group", "members.value", &Value::from(alice.as_str())).is_empty());

    silo.delete(DeleteContext::new("User", &alice)).unwrap();
    assert!(fetch(&silo, "Group", &gid).member_ids().is_empty());
}

#[test]
fn test_modify_groups_of_user() {
    let silo = open_silo();
    let alice = user(&silo, "alice");
    let admins = id_of(&create(&silo, &GroupBuilder::new("admins").build()));
    let staff = id_of(&create(&silo, &GroupBuilder::new("staff").with_member(&alice).build()));
    let before = fetch(&silo, "User", &alice);

    let updated = silo
        .modify_groups_of_user(
            ModifyGroupsOfUserRequest::new(&alice)
                .add_to(&admins)
                .remove_from(&staff)
                .add_to("no-such-group")
                .with_user_version(before.version().unwrap()),
        )
        .unwrap();

    assert_eq!(updated.group_ids(), vec![admins.clone()]);
    assert_ne!(updated.version(), before.version());
    assert_eq!(fetch(&silo, "User", &alice), updated);
    assert!(fetch(&silo, "Group", &admins).has_member(&alice));
    assert!(!fetch(&silo, "Group", &staff).has_member(&alice));
    assert_bidirectional(&silo, &[&alice], &[&admins, &staff]);
    assert_consistent!(silo);
}

#[test]
fn test_modify_groups_of_user_without_change_keeps_version() {
    let silo = open_silo();
    let alice = user(&silo, "alice");
    let admins = id_of(&create(&silo, &GroupBuilder::new("admins").with_member(&alice).build()));
    let before = fetch(&silo, "User", &alice);

    let updated = silo
        .modify_groups_of_user(ModifyGroupsOfUserRequest::new(&alice).add_to(&admins))
        .unwrap();
    assert_eq!(updated.version(), before.version());
}

#[test]
fn test_modify_groups_of_user_checks_version() {
    let silo = open_silo();
    let alice = user(&silo, "alice");
    let admins = id_of(&create(&silo, &GroupBuilder::new("admins").build()));

    let result = silo.modify_groups_of_user(
        ModifyGroupsOfUserRequest::new(&alice)
            .add_to(&admins)
            .with_user_version("stale"),
    );
    assert_scim_error!(result, 412);
    assert!(!fetch(&silo, "Group", &admins).has_member(&alice));
}

#[test]
fn test_modify_groups_of_missing_user_is_not_found() {
    let silo = open_silo();
    let result = silo.modify_groups_of_user(ModifyGroupsOfUserRequest::new("missing"));
    assert_scim_error!(result, 404);
}
