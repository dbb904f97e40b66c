//! Errors raised by the key/value store.
//!
//! These errors describe failures of the store itself (I/O, encoding, bucket
//! layout) and know nothing about SCIM. The silo converts them into
//! internal SCIM errors.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A snapshot or record could not be encoded or decoded.
    #[error("storage codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// The named bucket does not exist.
    #[error("bucket '{0}' not found")]
    BucketNotFound(String),

    /// A bucket with the name already exists.
    #[error("bucket '{0}' already exists")]
    BucketExists(String),

    /// The key holds a value where a bucket was expected, or the reverse.
    #[error("incompatible value at key '{0}'")]
    IncompatibleValue(String),
}

impl StorageError {
    pub(crate) fn bucket_not_found(key: &[u8]) -> Self {
        Self::BucketNotFound(String::from_utf8_lossy(key).into_owned())
    }

    pub(crate) fn bucket_exists(key: &[u8]) -> Self {
        Self::BucketExists(String::from_utf8_lossy(key).into_owned())
    }

    pub(crate) fn incompatible(key: &[u8]) -> Self {
        Self::IncompatibleValue(String::from_utf8_lossy(key).into_owned())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
