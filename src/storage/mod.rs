//! Embedded transactional key/value storage.
//!
//! The store keeps a tree of [`Bucket`]s. Every silo table (resources,
//! indexes, counters) is a top-level bucket, and duplicate-key indexes nest
//! one bucket per indexed value.
//!
//! # Example Usage
//!
//! ```rust
//! use scim_silo::storage::Store;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::in_memory();
//!
//! let mut txn = store.write();
//! txn.create_bucket(b"User")?.put(b"123", b"record".to_vec())?;
//! txn.commit()?;
//!
//! let snapshot = store.read();
//! assert_eq!(snapshot.bucket(b"User").and_then(|b| b.get(b"123")), Some(&b"record"[..]));
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod bucket;
pub mod errors;
pub mod store;

pub use bucket::Bucket;
pub use errors::{StorageError, StorageResult};
pub use store::{ReadTxn, Store, WriteTxn};
