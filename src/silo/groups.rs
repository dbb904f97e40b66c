//! Group membership side effects.
//!
//! A User that is a member of a Group carries a `groups` back-link to it.
//! Every write that changes `members` keeps both sides in agreement inside
//! the transaction of the primary mutation.

use std::collections::BTreeSet;

use log::{debug, warn};

use super::{GROUP, Silo, USER, load, store_record};
use crate::context::ModifyGroupsOfUserRequest;
use crate::error::{ScimError, ScimResult};
use crate::resource::attribute::VALUE;
use crate::resource::resource::{GROUPS, MEMBERS};
use crate::resource::{ComplexAttribute, Resource, SimpleAttribute, SubAttributes, Value};
use crate::schema::ResourceType;
use crate::storage::{Bucket, WriteTxn};

const REF: &str = "$ref";
const TYPE: &str = "type";
const DISPLAY: &str = "display";
const DISPLAY_NAME: &str = "displayname";

/// `(id, resource type name)` of every member of a group.
pub(super) fn member_refs(group: &Resource) -> Vec<(String, String)> {
    let Some(members) = group.core.complex(MEMBERS) else {
        return Vec::new();
    };
    members
        .instances()
        .filter_map(|(_, sub_attrs)| {
            let id = sub_attrs.get(VALUE)?.first()?.as_str()?.to_string();
            let type_name = sub_attrs
                .get(TYPE)
                .and_then(SimpleAttribute::first)
                .and_then(Value::as_str)
                .unwrap_or(USER)
                .to_string();
            Some((id, type_name))
        })
        .collect()
}

fn display_name(rs: &Resource) -> Option<String> {
    rs.core
        .simple(DISPLAY_NAME)
        .and_then(SimpleAttribute::first)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn reference(rt: &ResourceType, id: &str, type_name: &str, display: Option<String>) -> SubAttributes {
    let mut sub_attrs = SubAttributes::new();
    let mut put = |sa: SimpleAttribute| {
        sub_attrs.insert(sa.name.clone(), sa);
    };
    put(SimpleAttribute::single(VALUE, id));
    put(SimpleAttribute::single(REF, format!("{}/{}", rt.endpoint, id)));
    put(SimpleAttribute::single(TYPE, type_name));
    if let Some(display) = display {
        put(SimpleAttribute::single(DISPLAY, display));
    }
    sub_attrs
}

fn add_instance(rs: &mut Resource, attr: &str, sub_attrs: SubAttributes) {
    if !rs.core.contains(attr) {
        rs.core.insert(ComplexAttribute::new(attr));
    }
    if let Some(ca) = rs.core.complex_mut(attr) {
        ca.add_instance(sub_attrs);
    }
}

impl Silo {
    /// Validate the `members` of a group about to be stored and bring the
    /// `groups` back-links of its users in line with them.
    ///
    /// Duplicate members are dropped. Each member gets its `$ref` and
    /// `type` set. Users that joined gain a back-link and users that left
    /// (compared to `old`) lose theirs.
    pub(super) fn sync_members(
        &self,
        txn: &mut WriteTxn<'_>,
        group: &mut Resource,
        old: Option<&Resource>,
    ) -> ScimResult<()> {
        let gid = group.id().unwrap_or_default().to_string();
        let display = display_name(group);

        let mut current = Vec::new();
        if let Some(members) = group.core.complex_mut(MEMBERS) {
            let mut seen = BTreeSet::new();
            for key in members.keys() {
                let (id, type_name) = {
                    let Some(sub_attrs) = members.instance(key) else {
                        continue;
                    };
                    let id = sub_attrs
                        .get(VALUE)
                        .and_then(SimpleAttribute::first)
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .ok_or_else(|| {
                            ScimError::bad_request(format!(
                                "A member of the group {} has no value",
                                gid
                            ))
                        })?;
                    let type_name = sub_attrs
                        .get(TYPE)
                        .and_then(SimpleAttribute::first)
                        .and_then(Value::as_str)
                        .unwrap_or(USER)
                        .to_string();
                    (id, type_name)
                };

                if !seen.insert(id.clone()) {
                    debug!("Dropping duplicate member {} of group {}", id, gid);
                    members.remove_instance(key);
                    continue;
                }

                let member_rt = self
                    .registry
                    .resource_types()
                    .find(|rt| rt.name.eq_ignore_ascii_case(&type_name))
                    .ok_or_else(|| {
                        ScimError::not_found(format!(
                            "Unknown resource type {} of the member {}",
                            type_name, id
                        ))
                    })?;
                if member_rt.name == GROUP && id == gid {
                    return Err(ScimError::bad_request(format!(
                        "The group {} cannot be a member of itself",
                        gid
                    )));
                }
                if load(txn.root(), &member_rt.name, &id)?.is_none() {
                    return Err(ScimError::resource_not_found(&member_rt.name, &id));
                }

                if let Some(sub_attrs) = members.instance_mut(key) {
                    sub_attrs.insert(
                        REF.to_string(),
                        SimpleAttribute::single(REF, format!("{}/{}", member_rt.endpoint, id)),
                    );
                    sub_attrs.insert(
                        TYPE.to_string(),
                        SimpleAttribute::single(TYPE, member_rt.name.as_str()),
                    );
                }
                current.push((id, member_rt.name.clone()));
            }
        }

        let previous: BTreeSet<String> = old.map(Resource::member_ids).unwrap_or_default().into_iter().collect();
        for (id, type_name) in &current {
            if type_name == USER && !previous.contains(id) {
                self.link_user(txn, id, &gid, display.clone())?;
            }
        }

        let current: BTreeSet<&String> = current.iter().map(|(id, _)| id).collect();
        for id in previous.iter().filter(|id| !current.contains(id)) {
            self.unlink_user(txn, id, &gid)?;
        }
        Ok(())
    }

    /// Add the back-link to `gid` to the user `uid` unless it is present.
    fn link_user(&self, txn: &mut WriteTxn<'_>, uid: &str, gid: &str, display: Option<String>) -> ScimResult<()> {
        let user_rt = self.resource_type(USER)?;
        let group_rt = self.resource_type(GROUP)?;
        let mut user = load(txn.root(), USER, uid)?.ok_or_else(|| ScimError::resource_not_found(USER, uid))?;
        if user.is_member_of(gid) {
            return Ok(());
        }

        let old = user.clone();
        add_instance(&mut user, GROUPS, reference(&group_rt, gid, GROUP, display));
        self.index_set(USER)?
            .update(txn, &user_rt, uid, Some(&old), Some(&user))?;
        debug!("Linked user {} to group {}", uid, gid);
        store_record(txn, &user)
    }

    /// Drop the back-link to `gid` from the user `uid`, if both exist.
    fn unlink_user(&self, txn: &mut WriteTxn<'_>, uid: &str, gid: &str) -> ScimResult<()> {
        let Some(mut user) = load(txn.root(), USER, uid)? else {
            return Ok(());
        };
        let old = user.clone();
        if user.remove_member_of(gid).is_none() {
            return Ok(());
        }

        let user_rt = self.resource_type(USER)?;
        self.index_set(USER)?
            .update(txn, &user_rt, uid, Some(&old), Some(&user))?;
        debug!("Unlinked user {} from group {}", uid, gid);
        store_record(txn, &user)
    }

    /// Ids of the groups listing `member_id` in their `members`.
    fn groups_with_member(&self, root: &Bucket, member_id: &str) -> ScimResult<Vec<String>> {
        let Some(indexes) = self.indexes.get(GROUP) else {
            return Ok(Vec::new());
        };
        if let Some(idx) = indexes.get("members.value") {
            return Ok(idx.get_rids(root, &Value::from(member_id)));
        }

        let Some(records) = root.bucket(GROUP.as_bytes()) else {
            return Ok(Vec::new());
        };
        let mut gids = Vec::new();
        for (_, bytes) in records.iter() {
            let group = super::decode(bytes)?;
            if group.has_member(member_id) {
                gids.extend(group.id().map(str::to_string));
            }
        }
        Ok(gids)
    }

    /// Remove a deleted resource from every group it was a member of.
    ///
    /// The versions of the touched groups are left as they are.
    pub(super) fn strip_from_groups(&self, txn: &mut WriteTxn<'_>, member_id: &str) -> ScimResult<()> {
        let gids = self.groups_with_member(txn.root(), member_id)?;
        if gids.is_empty() {
            return Ok(());
        }
        let group_rt = self.resource_type(GROUP)?;
        let indexes = self.index_set(GROUP)?;
        for gid in gids {
            let Some(mut group) = load(txn.root(), GROUP, &gid)? else {
                continue;
            };
            let old = group.clone();
            if group.remove_member(member_id).is_some() {
                indexes.update(txn, &group_rt, &gid, Some(&old), Some(&group))?;
                store_record(txn, &group)?;
                debug!("Removed member {} from group {}", member_id, gid);
            }
        }
        Ok(())
    }

    /// Release the members of a deleted group: users lose their back-link
    /// and nested groups are deleted along with it.
    pub(super) fn release_members(&self, txn: &mut WriteTxn<'_>, group: &Resource) -> ScimResult<()> {
        let gid = group.id().unwrap_or_default();
        for (id, type_name) in member_refs(group) {
            if type_name == GROUP {
                let group_rt = self.resource_type(GROUP)?;
                match self.remove_resource(txn, &group_rt, &id) {
                    Ok(_) | Err(ScimError::NotFound { .. }) => {}
                    Err(e) => return Err(e),
                }
            } else if type_name == USER {
                self.unlink_user(txn, &id, gid)?;
            }
        }
        Ok(())
    }

    /// Add a user to some groups and remove it from others.
    ///
    /// Groups that do not exist are skipped. The user's version is bumped
    /// when anything changed, the groups keep theirs.
    pub fn modify_groups_of_user(&self, req: ModifyGroupsOfUserRequest) -> ScimResult<Resource> {
        let _guard = self.patch_lock.lock();
        let user_rt = self.resource_type(USER)?;
        let group_rt = self.resource_type(GROUP)?;
        let group_indexes = self.index_set(GROUP)?;
        let uid = req.user_id.as_str();

        let mut txn = self.store.write();
        let mut user = load(txn.root(), USER, uid)?.ok_or_else(|| ScimError::resource_not_found(USER, uid))?;
        check_version(&user, req.user_version.as_deref())?;
        let old_user = user.clone();
        let mut changed = false;

        for gid in &req.remove_gids {
            let Some(mut group) = load(txn.root(), GROUP, gid)? else {
                warn!("Group {} not found, user {} is not removed from it", gid, uid);
                continue;
            };
            changed |= user.remove_member_of(gid).is_some();
            let old_group = group.clone();
            if group.remove_member(uid).is_some() {
                group_indexes.update(&mut txn, &group_rt, gid, Some(&old_group), Some(&group))?;
                store_record(&mut txn, &group)?;
                changed = true;
            }
        }

        for gid in &req.add_gids {
            let Some(mut group) = load(txn.root(), GROUP, gid)? else {
                warn!("Group {} not found, user {} is not added to it", gid, uid);
                continue;
            };
            if !group.has_member(uid) {
                let old_group = group.clone();
                add_instance(&mut group, MEMBERS, reference(&user_rt, uid, USER, None));
                group_indexes.update(&mut txn, &group_rt, gid, Some(&old_group), Some(&group))?;
                store_record(&mut txn, &group)?;
                changed = true;
            }
            if !user.is_member_of(gid) {
                add_instance(&mut user, GROUPS, reference(&group_rt, gid, GROUP, display_name(&group)));
                changed = true;
            }
        }

        if !changed {
            debug!("Memberships of user {} are unchanged [request {}]", uid, req.op_ctx.request_id);
            txn.rollback();
            return Ok(user);
        }

        user.update_last_mod_time(&self.csn.next_csn());
        self.index_set(USER)?
            .update(&mut txn, &user_rt, uid, Some(&old_user), Some(&user))?;
        store_record(&mut txn, &user)?;
        txn.commit()?;
        debug!("Updated memberships of user {} [request {}]", uid, req.op_ctx.request_id);
        Ok(user)
    }
}

/// A given version must equal the stored one. No version skips the check.
pub fn check_version(rs: &Resource, if_match: Option<&str>) -> ScimResult<()> {
    match if_match {
        Some(expected) if rs.version() != Some(expected) => Err(ScimError::precondition_failed(format!(
            "The given version {} of the resource {} doesn't match the stored version",
            expected,
            rs.id().unwrap_or_default()
        ))),
        _ => Ok(()),
    }
}

