//! The storage facade.
//!
//! A [`Silo`] owns the schema registry, the bucket store and the indexes of
//! every resource type, and runs every operation inside one store
//! transaction.
//!
//! # Example Usage
//!
//! ```rust
//! use scim_silo::config::SiloConfig;
//! use scim_silo::context::{CreateContext, GetContext};
//! use scim_silo::resource::Resource;
//! use scim_silo::schema::SchemaRegistry;
//! use scim_silo::silo::Silo;
//! use serde_json::json;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = SchemaRegistry::with_embedded_schemas()?;
//! let silo = Silo::open(None, SiloConfig::default(), registry)?;
//!
//! let body = json!({
//!     "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
//!     "userName": "bjensen"
//! });
//! let user = Resource::parse(silo.registry(), &body)?;
//! let created = silo.insert(CreateContext::new(user))?;
//!
//! let id = created.id().unwrap_or_default();
//! let fetched = silo.get(GetContext::new("User", id))?;
//! assert_eq!(fetched.version(), created.version());
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

mod groups;
pub mod index;
pub mod optimizer;
mod patch;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use tokio::sync::mpsc::Sender;
use uuid::Uuid;

use crate::config::SiloConfig;
use crate::context::{CreateContext, DeleteContext, GetContext, PatchContext, ReplaceContext, SearchContext};
use crate::csn::{Csn, CsnGenerator};
use crate::error::{ScimError, ScimResult};
use crate::filter::{FilterNode, evaluate};
use crate::resource::attribute::same_sub_attributes;
use crate::resource::resource::MEMBERS;
use crate::resource::{AtGroup, Attribute, Resource, Value};
use crate::schema::{ResourceType, Schema, SchemaRegistry};
use crate::storage::{Bucket, StorageError, Store, WriteTxn};

pub use groups::check_version;
pub use index::{Index, IndexSet};
pub use patch::Patcher;

use index::{COUNTS_BUCKET, PRESENCE_INDEX};

/// Name of the user resource type.
pub const USER: &str = "User";

/// Name of the group resource type.
pub const GROUP: &str = "Group";

pub(crate) fn decode(bytes: &[u8]) -> ScimResult<Resource> {
    Ok(bincode::deserialize::<Resource>(bytes).map_err(StorageError::from)?)
}

fn encode(rs: &Resource) -> ScimResult<Vec<u8>> {
    Ok(bincode::serialize(rs).map_err(StorageError::from)?)
}

/// Load the record `id` of the resource type `rt_name`.
pub(crate) fn load(root: &Bucket, rt_name: &str, id: &str) -> ScimResult<Option<Resource>> {
    root.bucket(rt_name.as_bytes())
        .and_then(|records| records.get(id.as_bytes()))
        .map(decode)
        .transpose()
}

pub(crate) fn store_record(txn: &mut WriteTxn<'_>, rs: &Resource) -> ScimResult<()> {
    let id = rs
        .id()
        .ok_or_else(|| ScimError::internal(format!("a {} resource without id cannot be stored", rs.type_name)))?;
    let bytes = encode(rs)?;
    txn.existing_bucket_mut(rs.type_name.as_bytes())?
        .put(id.as_bytes(), bytes)?;
    Ok(())
}

pub(crate) fn delete_record(txn: &mut WriteTxn<'_>, rt_name: &str, id: &str) -> ScimResult<bool> {
    Ok(txn.existing_bucket_mut(rt_name.as_bytes())?.delete(id.as_bytes())?)
}

/// Build the index descriptors of a resource type: every unique attribute
/// and every configured field. Unknown and complex fields are skipped.
fn index_set_for(rt: &ResourceType, fields: &[String]) -> IndexSet {
    let mut set = IndexSet::new(&rt.name);
    for field in rt.unique_ats.iter().chain(fields) {
        let Some((urn, at)) = rt.resolve(field) else {
            warn!("Unknown index field {} of resource type {}, skipping", field, rt.name);
            continue;
        };
        if at.is_complex() {
            warn!("Complex attribute {} of resource type {} cannot be indexed, skipping", field, rt.name);
            continue;
        }
        if at.norm_path() == PRESENCE_INDEX || set.contains(&at.norm_path()) {
            continue;
        }
        debug!("Indexing {} of resource type {}", at.norm_path(), rt.name);
        set.insert(Index::new(&rt.name, urn, at));
    }
    set
}

/// An embedded SCIM resource store.
pub struct Silo {
    registry: SchemaRegistry,
    config: SiloConfig,
    store: Store,
    indexes: BTreeMap<String, IndexSet>,
    csn: CsnGenerator,
    patch_lock: Mutex<()>,
}

impl Silo {
    /// Open a silo, persisted at `path` when given and in memory otherwise.
    ///
    /// Buckets are created for every resource type and index. Indexes that
    /// did not exist before are built from the stored resources, buckets
    /// that belong to no resource type or index are dropped.
    pub fn open(path: Option<&Path>, config: SiloConfig, registry: SchemaRegistry) -> ScimResult<Silo> {
        let store = Store::open(path)?;
        let mut indexes = BTreeMap::new();

        let mut txn = store.write();
        txn.create_bucket_if_not_exists(COUNTS_BUCKET)?;
        let mut known: BTreeSet<Vec<u8>> = BTreeSet::new();
        known.insert(COUNTS_BUCKET.to_vec());

        for rt in registry.resource_types() {
            txn.create_bucket_if_not_exists(rt.name.as_bytes())?;
            known.insert(rt.name.as_bytes().to_vec());

            let set = index_set_for(rt, config.index_fields(&rt.name));
            let mut fresh = IndexSet::new(&rt.name);
            for idx in set.iter() {
                if txn.bucket(idx.bucket_name().as_bytes()).is_none() {
                    txn.create_bucket(idx.bucket_name().as_bytes())?;
                    fresh.insert(idx.clone());
                }
            }
            txn.create_bucket_if_not_exists(set.presence().bucket_name().as_bytes())?;
            known.extend(set.bucket_names().map(|name| name.as_bytes().to_vec()));
            let pruned = set.prune_presence(&mut txn)?;
            if pruned > 0 {
                info!("Removed {} presence entries of dropped indexes of {}", pruned, rt.name);
            }

            if fresh.iter().next().is_some() {
                let records = txn
                    .bucket(rt.name.as_bytes())
                    .map(|records| records.iter().map(|(_, bytes)| decode(bytes)).collect::<ScimResult<Vec<_>>>())
                    .transpose()?
                    .unwrap_or_default();
                if !records.is_empty() {
                    info!("Building new indexes of {} over {} resources", rt.name, records.len());
                }
                for rs in &records {
                    let rid = rs.id().unwrap_or_default();
                    fresh.update(&mut txn, rt, rid, None, Some(rs))?;
                }
            }

            indexes.insert(rt.name.clone(), set);
        }

        for name in txn.bucket_names() {
            if known.contains(&name) {
                continue;
            }
            warn!("Deleting bucket {} that is no longer used", String::from_utf8_lossy(&name));
            txn.delete_bucket(&name)?;
            txn.existing_bucket_mut(COUNTS_BUCKET)?.delete(&name)?;
        }
        txn.commit()?;

        info!(
            "Opened silo {} with {} resource types",
            path.map(|p| p.display().to_string()).unwrap_or_else(|| "in memory".to_string()),
            indexes.len()
        );
        Ok(Silo {
            csn: CsnGenerator::new(config.server_id),
            registry,
            config,
            store,
            indexes,
            patch_lock: Mutex::new(()),
        })
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SiloConfig {
        &self.config
    }

    /// The indexes of a resource type.
    pub fn indexes(&self, rt_name: &str) -> Option<&IndexSet> {
        self.indexes.get(rt_name)
    }

    /// Issue a new change sequence number.
    pub fn csn(&self) -> Csn {
        self.csn.next_csn()
    }

    fn resource_type(&self, name: &str) -> ScimResult<Arc<ResourceType>> {
        self.registry
            .resource_type(name)
            .cloned()
            .ok_or_else(|| ScimError::not_found(format!("Unknown resource type {}", name)))
    }

    fn index_set(&self, name: &str) -> ScimResult<&IndexSet> {
        self.indexes
            .get(name)
            .ok_or_else(|| ScimError::internal(format!("No indexes are set up for resource type {}", name)))
    }

    /// Store a new resource and return it with its id and meta.
    ///
    /// Read-only attributes of the incoming resource are discarded.
    pub fn insert(&self, ctx: CreateContext) -> ScimResult<Resource> {
        let CreateContext { resource: mut rs, op_ctx } = ctx;
        let rt = self.resource_type(&rs.type_name)?;
        let indexes = self.index_set(&rt.name)?;

        rs.remove_read_only(&rt);
        let rid = Uuid::new_v4().to_string();
        rs.set_id(rid.clone());
        rs.check_missing_required(&rt)?;

        let mut txn = self.store.write();
        indexes.check_unique(txn.root(), &rt, &rs, &rid)?;
        rs.add_meta(&rt, &self.csn.next_csn());
        rs.update_schemas(&rt);

        if rt.name == GROUP {
            self.sync_members(&mut txn, &mut rs, None)?;
        }
        indexes.update(&mut txn, &rt, &rid, None, Some(&rs))?;
        store_record(&mut txn, &rs)?;
        txn.commit()?;

        info!("Inserted {} {} [request {}]", rt.name, rid, op_ctx.request_id);
        Ok(rs)
    }

    pub fn get(&self, ctx: GetContext) -> ScimResult<Resource> {
        let rt = self.resource_type(&ctx.resource_type)?;
        let snapshot = self.store.read();
        trace!("Fetching {} {} [request {}]", rt.name, ctx.id, ctx.op_ctx.request_id);
        load(snapshot.root(), &rt.name, &ctx.id)?.ok_or_else(|| ScimError::resource_not_found(&rt.name, &ctx.id))
    }

    /// Replace a stored resource with the incoming one.
    ///
    /// Read-only attributes keep their stored values, immutable ones must
    /// not change once set. Everything else takes the incoming state,
    /// including removal of what the incoming resource lacks.
    pub fn replace(&self, ctx: ReplaceContext) -> ScimResult<Resource> {
        let ReplaceContext {
            resource: mut incoming,
            if_match,
            op_ctx,
        } = ctx;
        let rt = self.resource_type(&incoming.type_name)?;
        let indexes = self.index_set(&rt.name)?;
        let rid = incoming
            .id()
            .map(str::to_string)
            .ok_or_else(|| ScimError::bad_request("The resource to replace has no id"))?;
        incoming.remove_read_only(&rt);
        incoming.check_missing_required(&rt)?;

        let mut txn = self.store.write();
        let existing = load(txn.root(), &rt.name, &rid)?.ok_or_else(|| ScimError::resource_not_found(&rt.name, &rid))?;
        check_version(&existing, if_match.as_deref())?;

        let mut updated = replaced(&rt, &existing, &incoming)?;
        updated.update_schemas(&rt);
        if rt.name == GROUP {
            self.sync_members(&mut txn, &mut updated, Some(&existing))?;
        }
        updated.update_last_mod_time(&self.csn.next_csn());
        indexes.update(&mut txn, &rt, &rid, Some(&existing), Some(&updated))?;
        store_record(&mut txn, &updated)?;
        txn.commit()?;

        info!("Replaced {} {} [request {}]", rt.name, rid, op_ctx.request_id);
        Ok(updated)
    }

    /// Apply a patch request. A request that changes nothing leaves the
    /// stored resource and its version untouched.
    pub fn patch(&self, ctx: PatchContext) -> ScimResult<Resource> {
        let _guard = self.patch_lock.lock();
        let rt = self.resource_type(&ctx.resource_type)?;
        let indexes = self.index_set(&rt.name)?;

        let mut txn = self.store.write();
        let existing = load(txn.root(), &rt.name, &ctx.id)?
            .ok_or_else(|| ScimError::resource_not_found(&rt.name, &ctx.id))?;
        check_version(&existing, ctx.if_match.as_deref())?;

        let mut updated = existing.clone();
        let changed = Patcher::new(&rt, &mut updated).apply_all(&ctx.request.operations)?;
        if !changed {
            debug!("Patch left {} {} unchanged [request {}]", rt.name, ctx.id, ctx.op_ctx.request_id);
            txn.rollback();
            return Ok(existing);
        }

        if rt.name == GROUP && existing.core.get(MEMBERS) != updated.core.get(MEMBERS) {
            self.sync_members(&mut txn, &mut updated, Some(&existing))?;
        }
        updated.update_last_mod_time(&self.csn.next_csn());
        indexes.update(&mut txn, &rt, &ctx.id, Some(&existing), Some(&updated))?;
        store_record(&mut txn, &updated)?;
        txn.commit()?;

        info!("Patched {} {} [request {}]", rt.name, ctx.id, ctx.op_ctx.request_id);
        Ok(updated)
    }

    /// Delete a resource along with its index entries and memberships.
    pub fn delete(&self, ctx: DeleteContext) -> ScimResult<()> {
        let rt = self.resource_type(&ctx.resource_type)?;
        let mut txn = self.store.write();
        self.remove_resource(&mut txn, &rt, &ctx.id)?;
        txn.commit()?;
        info!("Deleted {} {} [request {}]", rt.name, ctx.id, ctx.op_ctx.request_id);
        Ok(())
    }

    fn remove_resource(&self, txn: &mut WriteTxn<'_>, rt: &ResourceType, id: &str) -> ScimResult<Resource> {
        let rs = load(txn.root(), &rt.name, id)?.ok_or_else(|| ScimError::resource_not_found(&rt.name, id))?;
        self.index_set(&rt.name)?.update(txn, rt, id, Some(&rs), None)?;
        delete_record(txn, &rt.name, id)?;

        self.strip_from_groups(txn, id)?;
        if rt.name == GROUP {
            self.release_members(txn, &rs)?;
        }
        debug!("Removed {} {}", rt.name, id);
        Ok(rs)
    }

    /// Stream the resources of the requested types matching the filter.
    ///
    /// Runs on one snapshot. Must be called from a blocking context since
    /// results are sent with `blocking_send`. A dropped receiver ends the
    /// search early without an error.
    pub fn search(&self, ctx: SearchContext, tx: Sender<Resource>) -> ScimResult<()> {
        let snapshot = self.store.read();
        let mut sent = 0usize;
        for name in &ctx.resource_types {
            let rt = self.resource_type(name)?;
            let proceed = self.scan(snapshot.root(), &rt, &ctx.filter, |rs| {
                if tx.blocking_send(rs).is_err() {
                    return false;
                }
                sent += 1;
                true
            })?;
            if !proceed {
                debug!("Search receiver dropped after {} results [request {}]", sent, ctx.op_ctx.request_id);
                return Ok(());
            }
        }
        debug!("Search sent {} results [request {}]", sent, ctx.op_ctx.request_id);
        Ok(())
    }

    /// Collect the resources of one type matching the filter.
    pub fn find_resources(&self, filter: &FilterNode, rt_name: &str) -> ScimResult<Vec<Resource>> {
        let rt = self.resource_type(rt_name)?;
        let snapshot = self.store.read();
        let mut found = Vec::new();
        self.scan(snapshot.root(), &rt, filter, |rs| {
            found.push(rs);
            true
        })?;
        Ok(found)
    }

    /// Evaluate `filter` against the candidates of one resource type and
    /// hand every match to `emit`, which returns false to stop. Returns
    /// false when stopped.
    fn scan(
        &self,
        root: &Bucket,
        rt: &ResourceType,
        filter: &FilterNode,
        mut emit: impl FnMut(Resource) -> bool,
    ) -> ScimResult<bool> {
        let indexes = self.index_set(&rt.name)?;
        let Some(records) = root.bucket(rt.name.as_bytes()) else {
            return Ok(true);
        };

        let mut filter = filter.clone();
        filter.bind(rt)?;
        let count = optimizer::estimate(&mut filter, indexes, root);
        trace!("Estimated {} candidates of {} for the filter", count, rt.name);

        let mut consider = |bytes: &[u8]| -> ScimResult<bool> {
            let rs = decode(bytes)?;
            if evaluate(&filter, &rs, rt) {
                return Ok(emit(rs));
            }
            Ok(true)
        };

        match optimizer::candidates(&filter, indexes, root) {
            Some(rids) => {
                for rid in rids {
                    if let Some(bytes) = records.get(rid.as_bytes()) {
                        if !consider(bytes)? {
                            return Ok(false);
                        }
                    }
                }
            }
            None => {
                for (_, bytes) in records.iter() {
                    if !consider(bytes)? {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }

    /// Stream every resource of a type. Same calling rules as [`Silo::search`].
    pub fn read_all_of_type(&self, rt_name: &str, tx: Sender<Resource>) -> ScimResult<()> {
        let rt = self.resource_type(rt_name)?;
        let snapshot = self.store.read();
        let Some(records) = snapshot.bucket(rt.name.as_bytes()) else {
            return Ok(());
        };
        for (_, bytes) in records.iter() {
            if tx.blocking_send(decode(bytes)?).is_err() {
                debug!("Receiver of {} resources dropped", rt.name);
                break;
            }
        }
        Ok(())
    }

    /// Find a user by `userName`, ignoring case.
    pub fn get_user_by_name(&self, username: &str) -> ScimResult<Resource> {
        let rt = self.resource_type(USER)?;
        let snapshot = self.store.read();
        let root = snapshot.root();
        let rid = self
            .index_set(USER)?
            .get("username")
            .and_then(|idx| idx.get_rid(root, &Value::from(username)));
        let user = match rid {
            Some(rid) => load(root, &rt.name, &rid)?,
            None => None,
        };
        user.ok_or_else(|| ScimError::not_found(format!("User with userName {} not found", username)))
    }

    /// Ids stored under `value` in the index of `path`, empty when the
    /// path is not indexed.
    pub fn lookup_index(&self, rt_name: &str, path: &str, value: &Value) -> Vec<String> {
        let snapshot = self.store.read();
        self.indexes
            .get(rt_name)
            .and_then(|set| set.get(&path.to_ascii_lowercase()))
            .map(|idx| idx.get_rids(snapshot.root(), value))
            .unwrap_or_default()
    }

    /// Whether every index agrees with the stored resources.
    pub fn is_consistent(&self) -> ScimResult<bool> {
        let snapshot = self.store.read();
        let root = snapshot.root();
        for (name, indexes) in &self.indexes {
            let rt = self.resource_type(name)?;
            let records = root
                .bucket(name.as_bytes())
                .map(|records| records.iter().map(|(_, bytes)| decode(bytes)).collect::<ScimResult<Vec<_>>>())
                .transpose()?
                .unwrap_or_default();
            if !indexes.is_consistent_with(root, &rt, records.iter()) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Names of the index buckets of a resource type, `{type}:{path}`.
    pub fn index_bucket_names(&self, rt_name: &str) -> Vec<String> {
        self.indexes
            .get(rt_name)
            .map(|set| set.bucket_names().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Number of stored resources of a type.
    pub fn count(&self, rt_name: &str) -> usize {
        self.store
            .read()
            .bucket(rt_name.as_bytes())
            .map(Bucket::len)
            .unwrap_or(0)
    }
}

/// The stored state after replacing `existing` with `incoming`.
fn replaced(rt: &ResourceType, existing: &Resource, incoming: &Resource) -> ScimResult<Resource> {
    let mut result = existing.clone();
    let schemas = std::iter::once(rt.main_schema()).chain(rt.extension_schemas());
    for sc in schemas {
        let urn = sc.id.as_str();
        let Some(new_group) = incoming.group(rt, urn) else {
            result.ext.remove(urn);
            continue;
        };
        replace_group(sc, existing.group(rt, urn), new_group, result.group_or_insert(rt, urn))?;
        if urn != rt.schema && result.ext.get(urn).is_some_and(AtGroup::is_empty) {
            result.ext.remove(urn);
        }
    }
    Ok(result)
}

fn replace_group(sc: &Schema, old: Option<&AtGroup>, new: &AtGroup, target: &mut AtGroup) -> ScimResult<()> {
    for at in &sc.attributes {
        if at.is_read_only() {
            continue;
        }
        let old_attr = old.and_then(|group| group.get(&at.norm_name));
        let new_attr = new.get(&at.norm_name);
        match (old_attr, new_attr) {
            (Some(old_attr), Some(new_attr)) if at.is_immutable() => {
                if !same_attribute(old_attr, new_attr) {
                    return Err(ScimError::mutability(format!(
                        "Cannot replace the value of immutable attribute {}",
                        at.name
                    )));
                }
            }
            (Some(_), None) if at.is_immutable() => {}
            (_, Some(new_attr)) => {
                target.insert(new_attr.clone());
            }
            (_, None) => {
                target.remove(&at.norm_name);
            }
        }
    }
    Ok(())
}

fn same_attribute(a: &Attribute, b: &Attribute) -> bool {
    match (a, b) {
        (Attribute::Simple(a), Attribute::Simple(b)) => a.same_values(b),
        (Attribute::Complex(a), Attribute::Complex(b)) => {
            a.len() == b.len()
                && b.instances().all(|(_, sub_attrs)| {
                    a.instances().any(|(_, existing)| same_sub_attributes(existing, sub_attrs))
                })
        }
        _ => false,
    }
}

