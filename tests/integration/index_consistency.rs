//! Property-Based Testing for Index Consistency
//!
//! Random sequences of inserts, patches and deletes, with deliberate
//! uniqueness conflicts among them, must leave every index agreeing with
//! the stored resources and every membership mirrored by a back-link.

use crate::common::builders::{DeviceBuilder, GroupBuilder, UserBuilder};
use crate::common::{id_of, open_silo, patch, try_create};
use proptest::prelude::*;
use scim_silo::context::DeleteContext;
use scim_silo::{Resource, Silo};
use serde_json::json;

/// One step of a generated scenario. Targets index into the ids created so far.
#[derive(Debug, Clone)]
enum Step {
    InsertDevice { serial: u8, maker: u8, rating: i64 },
    SetRating { target: usize, rating: i64 },
    RemoveManufacturer { target: usize },
    DeleteDevice { target: usize },
    InsertUser { name: u8 },
    InsertGroup { members: Vec<usize> },
    AddMember { group: usize, user: usize },
    RemoveMember { group: usize, user: usize },
    DeleteUser { target: usize },
    DeleteGroup { target: usize },
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0u8..6, 0u8..3, 0i64..5).prop_map(|(serial, maker, rating)| Step::InsertDevice { serial, maker, rating }),
        (any::<usize>(), 0i64..5).prop_map(|(target, rating)| Step::SetRating { target, rating }),
        any::<usize>().prop_map(|target| Step::RemoveManufacturer { target }),
        any::<usize>().prop_map(|target| Step::DeleteDevice { target }),
        (0u8..6).prop_map(|name| Step::InsertUser { name }),
        prop::collection::vec(any::<usize>(), 0..3).prop_map(|members| Step::InsertGroup { members }),
        (any::<usize>(), any::<usize>()).prop_map(|(group, user)| Step::AddMember { group, user }),
        (any::<usize>(), any::<usize>()).prop_map(|(group, user)| Step::RemoveMember { group, user }),
        any::<usize>().prop_map(|target| Step::DeleteUser { target }),
        any::<usize>().prop_map(|target| Step::DeleteGroup { target }),
    ]
}

#[derive(Default)]
struct Ids {
    devices: Vec<String>,
    users: Vec<String>,
    groups: Vec<String>,
}

fn pick(ids: &[String], i: usize) -> Option<String> {
    if ids.is_empty() {
        None
    } else {
        Some(ids[i % ids.len()].clone())
    }
}

/// Run a step, ignoring expected failures such as conflicts or missing ids.
fn run(silo: &Silo, ids: &mut Ids, step: &Step) {
    let keep = |rs: Resource, into: &mut Vec<String>| into.push(id_of(&rs));
    match step {
        Step::InsertDevice { serial, maker, rating } => {
            let body = DeviceBuilder::new(&format!("SN-{}", serial))
                .with_manufacturer(&format!("maker{}", maker))
                .with_rating(*rating)
                .build();
            if let Ok(rs) = try_create(silo, &body) {
                keep(rs, &mut ids.devices);
            }
        }
        Step::SetRating { target, rating } => {
            if let Some(id) = pick(&ids.devices, *target) {
                let _ = patch(silo, "Device", &id, json!([{"op": "replace", "path": "rating", "value": rating}]));
            }
        }
        Step::RemoveManufacturer { target } => {
            if let Some(id) = pick(&ids.devices, *target) {
                let _ = patch(silo, "Device", &id, json!([{"op": "remove", "path": "manufacturer"}]));
            }
        }
        Step::DeleteDevice { target } => {
            if let Some(id) = pick(&ids.devices, *target) {
                let _ = silo.delete(DeleteContext::new("Device", &id));
                ids.devices.retain(|d| *d != id);
            }
        }
        Step::InsertUser { name } => {
            if let Ok(rs) = try_create(silo, &UserBuilder::new(&format!("user{}", name)).build()) {
                keep(rs, &mut ids.users);
            }
        }
        Step::InsertGroup { members } => {
            let mut builder = GroupBuilder::new("group");
            for member in members {
                if let Some(uid) = pick(&ids.users, *member) {
                    builder = builder.with_member(&uid);
                }
            }
            if let Ok(rs) = try_create(silo, &builder.build()) {
                keep(rs, &mut ids.groups);
            }
        }
        Step::AddMember { group, user } => {
            if let (Some(gid), Some(uid)) = (pick(&ids.groups, *group), pick(&ids.users, *user)) {
                let _ = patch(silo, "Group", &gid, json!([{"op": "add", "path": "members", "value": [{"value": uid}]}]));
            }
        }
        Step::RemoveMember { group, user } => {
            if let (Some(gid), Some(uid)) = (pick(&ids.groups, *group), pick(&ids.users, *user)) {
                let path = format!("members[value eq \"{}\"]", uid);
                let _ = patch(silo, "Group", &gid, json!([{"op": "remove", "path": path}]));
            }
        }
        Step::DeleteUser { target } => {
            if let Some(id) = pick(&ids.users, *target) {
                let _ = silo.delete(DeleteContext::new("User", &id));
                ids.users.retain(|u| *u != id);
            }
        }
        Step::DeleteGroup { target } => {
            if let Some(id) = pick(&ids.groups, *target) {
                let _ = silo.delete(DeleteContext::new("Group", &id));
                ids.groups.retain(|g| *g != id);
            }
        }
    }
}

fn memberships_are_mirrored(silo: &Silo, ids: &Ids) -> bool {
    use scim_silo::context::GetContext;

    for gid in &ids.groups {
        let Ok(group) = silo.get(GetContext::new("Group", gid)) else {
            continue;
        };
        for uid in &ids.users {
            let Ok(user) = silo.get(GetContext::new("User", uid)) else {
                continue;
            };
            if group.has_member(uid) != user.is_member_of(gid) {
                return false;
            }
        }
    }
    true
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_indexes_match_stored_resources(steps in prop::collection::vec(step_strategy(), 1..40)) {
        let silo = open_silo();
        let mut ids = Ids::default();
        for step in &steps {
            run(&silo, &mut ids, step);
        }

        prop_assert!(silo.is_consistent().unwrap());
        prop_assert!(memberships_are_mirrored(&silo, &ids));
        prop_assert_eq!(silo.count("Device"), ids.devices.len());
        prop_assert_eq!(silo.count("User"), ids.users.len());
    }
}
