//! Ordered buckets of byte keys.
//!
//! A bucket maps byte keys either to values or to nested buckets. Nested
//! buckets sit behind an `Arc` so that a write transaction only copies the
//! path from the root down to the buckets it actually changes.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::errors::{StorageError, StorageResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Entry {
    Value(Vec<u8>),
    Bucket(Arc<Bucket>),
}

/// An ordered collection of key/value pairs and nested buckets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    entries: BTreeMap<Vec<u8>, Entry>,
}

impl Bucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value stored at `key`. Nested buckets are not values.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        match self.entries.get(key) {
            Some(Entry::Value(value)) => Some(value.as_slice()),
            _ => None,
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        matches!(self.entries.get(key), Some(Entry::Value(_)))
    }

    /// Store `value` at `key`, overwriting any previous value.
    pub fn put(&mut self, key: &[u8], value: impl Into<Vec<u8>>) -> StorageResult<()> {
        if self.is_bucket(key) == Some(true) {
            return Err(StorageError::incompatible(key));
        }
        self.entries.insert(key.to_vec(), Entry::Value(value.into()));
        Ok(())
    }

    /// Remove the value at `key`, returning whether it existed.
    pub fn delete(&mut self, key: &[u8]) -> StorageResult<bool> {
        match self.is_bucket(key) {
            Some(true) => Err(StorageError::incompatible(key)),
            Some(false) => {
                self.entries.remove(key);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Iterate over the values in key order, skipping nested buckets.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        self.entries.iter().filter_map(|(key, entry)| match entry {
            Entry::Value(value) => Some((key.as_slice(), value.as_slice())),
            Entry::Bucket(_) => None,
        })
    }

    /// Number of values, not counting nested buckets.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bucket(&self, name: &[u8]) -> Option<&Bucket> {
        match self.entries.get(name) {
            Some(Entry::Bucket(bucket)) => Some(bucket.as_ref()),
            _ => None,
        }
    }

    /// Mutable access to a nested bucket, copying it first if it is shared
    /// with a snapshot.
    pub fn bucket_mut(&mut self, name: &[u8]) -> Option<&mut Bucket> {
        match self.entries.get_mut(name) {
            Some(Entry::Bucket(bucket)) => Some(Arc::make_mut(bucket)),
            _ => None,
        }
    }

    pub fn create_bucket(&mut self, name: &[u8]) -> StorageResult<&mut Bucket> {
        match self.is_bucket(name) {
            Some(true) => return Err(StorageError::bucket_exists(name)),
            Some(false) => return Err(StorageError::incompatible(name)),
            None => {}
        }
        self.entries
            .insert(name.to_vec(), Entry::Bucket(Arc::new(Bucket::new())));
        self.bucket_mut(name)
            .ok_or_else(|| StorageError::bucket_not_found(name))
    }

    pub fn create_bucket_if_not_exists(&mut self, name: &[u8]) -> StorageResult<&mut Bucket> {
        match self.is_bucket(name) {
            Some(true) => self
                .bucket_mut(name)
                .ok_or_else(|| StorageError::bucket_not_found(name)),
            Some(false) => Err(StorageError::incompatible(name)),
            None => self.create_bucket(name),
        }
    }

    pub fn delete_bucket(&mut self, name: &[u8]) -> StorageResult<()> {
        match self.is_bucket(name) {
            Some(true) => {
                self.entries.remove(name);
                Ok(())
            }
            Some(false) => Err(StorageError::incompatible(name)),
            None => Err(StorageError::bucket_not_found(name)),
        }
    }

    fn is_bucket(&self, key: &[u8]) -> Option<bool> {
        self.entries
            .get(key)
            .map(|entry| matches!(entry, Entry::Bucket(_)))
    }

    /// Names of the nested buckets in key order.
    pub fn bucket_names(&self) -> Vec<Vec<u8>> {
        self.entries
            .iter()
            .filter(|(_, entry)| matches!(entry, Entry::Bucket(_)))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Iterate over the nested buckets in key order.
    pub fn buckets(&self) -> impl Iterator<Item = (&[u8], &Bucket)> + '_ {
        self.entries.iter().filter_map(|(key, entry)| match entry {
            Entry::Bucket(bucket) => Some((key.as_slice(), bucket.as_ref())),
            Entry::Value(_) => None,
        })
    }
}
