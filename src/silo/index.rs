//! Secondary indexes over stored resources.
//!
//! Every index owns one top-level bucket named `{resourceType}:{path}`.
//! A unique index maps an encoded value to the id of the single resource
//! holding it. A duplicate-key index maps an encoded value to a nested bucket
//! of resource ids, with a per-value counter stored under the empty key.
//! The `counts` bucket tracks the total number of tuples of every index.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, trace};

use crate::error::{ScimError, ScimResult};
use crate::resource::resource::{ID, values_in_group};
use crate::resource::{Resource, Value};
use crate::schema::{AttrType, AttributeType, ResourceType};
use crate::storage::{Bucket, StorageResult, WriteTxn};

/// Bucket holding the total tuple count of every index.
pub const COUNTS_BUCKET: &[u8] = b"counts";

/// Name of the presence index of every resource type.
pub const PRESENCE_INDEX: &str = "presence_system";

/// Delimiter between the resource type and the index name in bucket names.
pub const RES_INDEX_DELIM: char = ':';

const KEY_COUNT: &[u8] = b"";
const DUP_KEY_MARKER: &[u8] = &[0];

/// Descriptor of one index.
#[derive(Debug, Clone)]
pub struct Index {
    name: String,
    bucket: String,
    urn: String,
    unique: bool,
    at: AttrType,
}

impl Index {
    /// An index over the values of `at`, owned by the schema `urn`.
    pub fn new(resource_type: &str, urn: &str, at: &AttrType) -> Self {
        let name = at.norm_path();
        Self {
            bucket: format!("{}{}{}", resource_type, RES_INDEX_DELIM, name),
            name,
            urn: urn.to_string(),
            unique: at.is_unique(),
            at: at.clone(),
        }
    }

    /// The presence index, keyed by the normalized path of indexed attributes.
    pub fn presence(resource_type: &str) -> Self {
        let mut at = AttrType::new(PRESENCE_INDEX, AttributeType::String);
        at.multi_valued = true;
        Self {
            name: PRESENCE_INDEX.to_string(),
            bucket: format!("{}{}{}", resource_type, RES_INDEX_DELIM, PRESENCE_INDEX),
            urn: String::new(),
            unique: false,
            at,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn at_type(&self) -> &AttrType {
        &self.at
    }

    /// Order-preserving key for a value of the indexed attribute.
    pub fn encode(&self, value: &Value) -> Vec<u8> {
        match value {
            Value::Str(s) if self.at.case_exact => s.as_bytes().to_vec(),
            Value::Str(s) => s.to_lowercase().into_bytes(),
            Value::Bool(b) => vec![u8::from(*b)],
            Value::Int(i) => encode_i64(*i),
            Value::Float(f) => encode_f64(*f),
            Value::Bytes(b) => b.clone(),
        }
    }

    /// Insert the tuple `(value, rid)`. Returns whether the index changed.
    ///
    /// A unique index silently overwrites, so callers check first.
    pub fn add(&self, txn: &mut WriteTxn<'_>, value: &Value, rid: &str) -> StorageResult<bool> {
        self.add_key(txn, &self.encode(value), rid)
    }

    pub fn remove(&self, txn: &mut WriteTxn<'_>, value: &Value, rid: &str) -> StorageResult<bool> {
        self.remove_key(txn, &self.encode(value), rid)
    }

    pub(crate) fn add_key(&self, txn: &mut WriteTxn<'_>, key: &[u8], rid: &str) -> StorageResult<bool> {
        trace!("adding value {:?} of resource {} to index {}", key, rid, self.bucket);
        let bucket = txn.existing_bucket_mut(self.bucket.as_bytes())?;

        let added = if self.unique {
            let previous = bucket.get(key).map(<[u8]>::to_vec);
            bucket.put(key, rid.as_bytes().to_vec())?;
            previous.is_none()
        } else {
            let ids = bucket.create_bucket_if_not_exists(key)?;
            if ids.contains(rid.as_bytes()) {
                false
            } else {
                ids.put(rid.as_bytes(), DUP_KEY_MARKER.to_vec())?;
                let count = read_u64(ids.get(KEY_COUNT)) + 1;
                ids.put(KEY_COUNT, count.to_be_bytes().to_vec())?;
                true
            }
        };

        if added {
            self.bump_total(txn, 1)?;
        }
        Ok(added)
    }

    pub(crate) fn remove_key(&self, txn: &mut WriteTxn<'_>, key: &[u8], rid: &str) -> StorageResult<bool> {
        trace!("removing value {:?} of resource {} from index {}", key, rid, self.bucket);
        let bucket = txn.existing_bucket_mut(self.bucket.as_bytes())?;

        let removed = if self.unique {
            if bucket.get(key) == Some(rid.as_bytes()) {
                bucket.delete(key)?
            } else {
                false
            }
        } else {
            let Some(ids) = bucket.bucket_mut(key) else {
                return Ok(false);
            };
            if !ids.delete(rid.as_bytes())? {
                return Ok(false);
            }
            let count = read_u64(ids.get(KEY_COUNT)).saturating_sub(1);
            if count == 0 {
                bucket.delete_bucket(key)?;
                debug!("Deleted the last id of a key in the index {}", self.bucket);
            } else {
                ids.put(KEY_COUNT, count.to_be_bytes().to_vec())?;
            }
            true
        };

        if removed {
            self.bump_total(txn, -1)?;
        }
        Ok(removed)
    }

    fn bump_total(&self, txn: &mut WriteTxn<'_>, delta: i64) -> StorageResult<()> {
        let counts = txn.existing_bucket_mut(COUNTS_BUCKET)?;
        let total = read_u64(counts.get(self.bucket.as_bytes()));
        let total = if delta < 0 {
            total.saturating_sub(delta.unsigned_abs())
        } else {
            total.saturating_add(delta.unsigned_abs())
        };
        counts.put(self.bucket.as_bytes(), total.to_be_bytes().to_vec())
    }

    /// Number of resources holding `value`.
    pub fn key_count(&self, root: &Bucket, value: &Value) -> u64 {
        self.key_count_raw(root, &self.encode(value))
    }

    pub(crate) fn key_count_raw(&self, root: &Bucket, key: &[u8]) -> u64 {
        let Some(bucket) = root.bucket(self.bucket.as_bytes()) else {
            return 0;
        };
        if self.unique {
            u64::from(bucket.contains(key))
        } else {
            bucket
                .bucket(key)
                .map(|ids| read_u64(ids.get(KEY_COUNT)))
                .unwrap_or(0)
        }
    }

    /// The id of the resource holding `value` in a unique index.
    pub fn get_rid(&self, root: &Bucket, value: &Value) -> Option<String> {
        self.get_rid_raw(root, &self.encode(value))
    }

    fn get_rid_raw(&self, root: &Bucket, key: &[u8]) -> Option<String> {
        let bucket = root.bucket(self.bucket.as_bytes())?;
        if self.unique {
            bucket
                .get(key)
                .map(|rid| String::from_utf8_lossy(rid).into_owned())
        } else {
            self.get_rids_raw(root, key).into_iter().next()
        }
    }

    /// The ids of every resource holding `value`.
    pub fn get_rids(&self, root: &Bucket, value: &Value) -> Vec<String> {
        self.get_rids_raw(root, &self.encode(value))
    }

    pub(crate) fn get_rids_raw(&self, root: &Bucket, key: &[u8]) -> Vec<String> {
        let Some(bucket) = root.bucket(self.bucket.as_bytes()) else {
            return Vec::new();
        };
        if self.unique {
            return bucket
                .get(key)
                .map(|rid| vec![String::from_utf8_lossy(rid).into_owned()])
                .unwrap_or_default();
        }
        bucket
            .bucket(key)
            .map(|ids| {
                ids.iter()
                    .filter(|(rid, _)| !rid.is_empty())
                    .map(|(rid, _)| String::from_utf8_lossy(rid).into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether any resource holds `value`.
    pub fn has_val(&self, root: &Bucket, value: &Value) -> bool {
        self.key_count(root, value) > 0
    }

    /// Whether the tuple `(value, rid)` exists.
    pub fn has_key_and_val(&self, root: &Bucket, value: &Value, rid: &str) -> bool {
        let key = self.encode(value);
        let Some(bucket) = root.bucket(self.bucket.as_bytes()) else {
            return false;
        };
        if self.unique {
            bucket.get(&key) == Some(rid.as_bytes())
        } else {
            bucket
                .bucket(&key)
                .is_some_and(|ids| ids.contains(rid.as_bytes()))
        }
    }

    /// Total number of tuples in the index.
    pub fn total_count(&self, root: &Bucket) -> u64 {
        root.bucket(COUNTS_BUCKET)
            .map(|counts| read_u64(counts.get(self.bucket.as_bytes())))
            .unwrap_or(0)
    }

    /// Encoded keys of every value `rs` holds for this index.
    fn keys_of<'a>(&self, rs: &'a Resource, rt: &ResourceType) -> BTreeMap<Vec<u8>, &'a Value> {
        let Some(group) = rs.group(rt, &self.urn) else {
            return BTreeMap::new();
        };
        values_in_group(group, &self.at)
            .into_iter()
            .map(|value| (self.encode(value), value))
            .collect()
    }
}

/// The indexes of one resource type.
#[derive(Debug, Clone)]
pub struct IndexSet {
    indexes: BTreeMap<String, Index>,
    presence: Index,
}

impl IndexSet {
    pub fn new(resource_type: &str) -> Self {
        Self {
            indexes: BTreeMap::new(),
            presence: Index::presence(resource_type),
        }
    }

    pub fn insert(&mut self, index: Index) {
        self.indexes.insert(index.name.clone(), index);
    }

    /// The index over the normalized attribute path, if any.
    pub fn get(&self, path: &str) -> Option<&Index> {
        self.indexes.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.indexes.contains_key(path)
    }

    pub fn presence(&self) -> &Index {
        &self.presence
    }

    pub fn iter(&self) -> impl Iterator<Item = &Index> {
        self.indexes.values()
    }

    /// Bucket names of every index including presence.
    pub fn bucket_names(&self) -> impl Iterator<Item = &str> {
        self.indexes
            .values()
            .map(Index::bucket_name)
            .chain(std::iter::once(self.presence.bucket_name()))
    }

    /// Bring the indexes from the state of `old` to the state of `new`.
    ///
    /// Insert passes no `old`, delete passes no `new`. Only the tuples that
    /// differ are touched. Adding a value of a unique attribute that another
    /// resource already holds is a Conflict with scimType `uniqueness`.
    pub fn update(
        &self,
        txn: &mut WriteTxn<'_>,
        rt: &ResourceType,
        rid: &str,
        old: Option<&Resource>,
        new: Option<&Resource>,
    ) -> ScimResult<()> {
        for idx in self.indexes.values() {
            let old_keys = old.map(|rs| idx.keys_of(rs, rt)).unwrap_or_default();
            let new_keys = new.map(|rs| idx.keys_of(rs, rt)).unwrap_or_default();

            for key in old_keys.keys().filter(|key| !new_keys.contains_key(*key)) {
                idx.remove_key(txn, key, rid)?;
            }

            for (key, value) in new_keys.iter().filter(|(key, _)| !old_keys.contains_key(*key)) {
                if idx.unique {
                    if let Some(holder) = idx.get_rid_raw(txn.root(), key) {
                        if holder != rid {
                            return Err(ScimError::uniqueness(format!(
                                "Uniqueness violation, value {} of attribute {} already exists",
                                value, idx.at.name
                            )));
                        }
                    }
                }
                idx.add_key(txn, key, rid)?;
            }

            if idx.name == ID {
                continue;
            }
            let presence_key = idx.name.as_bytes();
            match (old_keys.is_empty(), new_keys.is_empty()) {
                (false, true) => {
                    self.presence.remove_key(txn, presence_key, rid)?;
                }
                (true, false) => {
                    self.presence.add_key(txn, presence_key, rid)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Drop presence entries of attributes that are no longer indexed.
    /// Returns the number of removed tuples.
    pub fn prune_presence(&self, txn: &mut WriteTxn<'_>) -> StorageResult<usize> {
        let stale: Vec<Vec<u8>> = match txn.root().bucket(self.presence.bucket.as_bytes()) {
            Some(bucket) => bucket
                .bucket_names()
                .into_iter()
                .filter(|key| {
                    std::str::from_utf8(key).map_or(true, |name| !self.indexes.contains_key(name))
                })
                .collect(),
            None => return Ok(0),
        };

        let mut removed = 0;
        for key in stale {
            for rid in self.presence.get_rids_raw(txn.root(), &key) {
                if self.presence.remove_key(txn, &key, &rid)? {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Conflicts `rs` would cause in the unique indexes, as an error.
    pub fn check_unique(&self, root: &Bucket, rt: &ResourceType, rs: &Resource, rid: &str) -> ScimResult<()> {
        for idx in self.indexes.values().filter(|idx| idx.unique) {
            for (key, value) in idx.keys_of(rs, rt) {
                if idx.get_rid_raw(root, &key).is_some_and(|holder| holder != rid) {
                    return Err(ScimError::uniqueness(format!(
                        "Uniqueness violation, value {} of attribute {} already exists",
                        value, idx.at.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Whether the indexes hold exactly the tuples derived from `resources`.
    pub fn is_consistent_with<'a>(
        &self,
        root: &Bucket,
        rt: &ResourceType,
        resources: impl IntoIterator<Item = &'a Resource> + Clone,
    ) -> bool {
        for idx in self.indexes.values() {
            let mut expected: BTreeSet<(Vec<u8>, String)> = BTreeSet::new();
            let mut present: BTreeSet<String> = BTreeSet::new();
            for rs in resources.clone() {
                let Some(rid) = rs.id() else {
                    return false;
                };
                let keys = idx.keys_of(rs, rt);
                if !keys.is_empty() {
                    present.insert(rid.to_string());
                }
                expected.extend(keys.into_keys().map(|key| (key, rid.to_string())));
            }

            let actual = stored_tuples(root, idx);
            if actual != expected || idx.total_count(root) != expected.len() as u64 {
                debug!("index {} is not consistent with the stored resources", idx.bucket);
                return false;
            }

            if idx.name != ID {
                let with_presence: BTreeSet<String> = self
                    .presence
                    .get_rids_raw(root, idx.name.as_bytes())
                    .into_iter()
                    .collect();
                if with_presence != present {
                    debug!("presence of {} is not consistent with the stored resources", idx.name);
                    return false;
                }
            }
        }
        true
    }
}

fn stored_tuples(root: &Bucket, idx: &Index) -> BTreeSet<(Vec<u8>, String)> {
    let Some(bucket) = root.bucket(idx.bucket.as_bytes()) else {
        return BTreeSet::new();
    };
    if idx.unique {
        bucket
            .iter()
            .map(|(key, rid)| (key.to_vec(), String::from_utf8_lossy(rid).into_owned()))
            .collect()
    } else {
        bucket
            .buckets()
            .flat_map(|(key, ids)| {
                ids.iter()
                    .filter(|(rid, _)| !rid.is_empty())
                    .map(move |(rid, _)| (key.to_vec(), String::from_utf8_lossy(rid).into_owned()))
            })
            .collect()
    }
}

fn read_u64(bytes: Option<&[u8]>) -> u64 {
    bytes
        .and_then(|b| <[u8; 8]>::try_from(b).ok())
        .map(u64::from_be_bytes)
        .unwrap_or(0)
}

/// Big-endian two's complement with the sign bit flipped, so that byte order
/// matches numeric order.
pub fn encode_i64(value: i64) -> Vec<u8> {
    ((value as u64) ^ (1 << 63)).to_be_bytes().to_vec()
}

/// IEEE 754 bits transformed so that byte order matches numeric order.
pub fn encode_f64(value: f64) -> Vec<u8> {
    let bits = value.to_bits();
    let ordered = if bits >> 63 == 1 { !bits } else { bits | (1 << 63) };
    ordered.to_be_bytes().to_vec()
}
