//! Error types for silo operations.
//!
//! Every operation in this crate returns a [`ScimResult`]. The error kinds are
//! stable and caller-correctable conditions are kept apart from internal
//! failures so that an upstream protocol layer can map them to wire-level
//! status codes without inspecting messages.

use std::fmt;

/// SCIM error sub-type carried by bad-request and conflict errors.
///
/// These are the `scimType` values defined by RFC 7644 section 3.12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScimType {
    InvalidFilter,
    Uniqueness,
    Mutability,
    InvalidSyntax,
    InvalidPath,
    NoTarget,
    InvalidValue,
}

impl ScimType {
    /// The wire name of this sub-type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScimType::InvalidFilter => "invalidFilter",
            ScimType::Uniqueness => "uniqueness",
            ScimType::Mutability => "mutability",
            ScimType::InvalidSyntax => "invalidSyntax",
            ScimType::InvalidPath => "invalidPath",
            ScimType::NoTarget => "noTarget",
            ScimType::InvalidValue => "invalidValue",
        }
    }
}

impl fmt::Display for ScimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for silo operations.
#[derive(Debug, thiserror::Error)]
pub enum ScimError {
    /// Malformed resource, filter, patch request or an unknown path
    #[error("Bad request: {detail}")]
    BadRequest {
        detail: String,
        scim_type: Option<ScimType>,
    },

    /// Resource, schema, resource type or referenced member is absent
    #[error("Not found: {detail}")]
    NotFound { detail: String },

    /// A unique attribute value is already taken
    #[error("Conflict: {detail}")]
    Conflict {
        detail: String,
        scim_type: Option<ScimType>,
    },

    /// The supplied version does not match the stored version
    #[error("Precondition failed: {detail}")]
    PreconditionFailed { detail: String },

    /// Encoding failures, storage failures and other structural defects
    #[error("Internal server error: {detail}")]
    Internal { detail: String },
}

impl ScimError {
    /// Create a bad request error without a SCIM sub-type.
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::BadRequest {
            detail: detail.into(),
            scim_type: None,
        }
    }

    /// Create a bad request error with the given SCIM sub-type.
    pub fn bad_request_with(scim_type: ScimType, detail: impl Into<String>) -> Self {
        Self::BadRequest {
            detail: detail.into(),
            scim_type: Some(scim_type),
        }
    }

    /// Create an invalid filter error.
    pub fn invalid_filter(detail: impl Into<String>) -> Self {
        Self::bad_request_with(ScimType::InvalidFilter, detail)
    }

    /// Create a mutability error for illegal changes to read-only, immutable or required attributes.
    pub fn mutability(detail: impl Into<String>) -> Self {
        Self::bad_request_with(ScimType::Mutability, detail)
    }

    /// Create a not found error.
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::NotFound {
            detail: detail.into(),
        }
    }

    /// Create a not found error for a resource of the given type.
    pub fn resource_not_found(resource_type: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::not_found(format!("{} with ID {} not found", resource_type, id))
    }

    /// Create a uniqueness conflict error.
    pub fn uniqueness(detail: impl Into<String>) -> Self {
        Self::Conflict {
            detail: detail.into(),
            scim_type: Some(ScimType::Uniqueness),
        }
    }

    /// Create a precondition failed error.
    pub fn precondition_failed(detail: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            detail: detail.into(),
        }
    }

    /// Create an internal server error.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal {
            detail: detail.into(),
        }
    }

    /// HTTP status code conventionally associated with this error.
    pub fn status(&self) -> u16 {
        match self {
            ScimError::BadRequest { .. } => 400,
            ScimError::NotFound { .. } => 404,
            ScimError::Conflict { .. } => 409,
            ScimError::PreconditionFailed { .. } => 412,
            ScimError::Internal { .. } => 500,
        }
    }

    /// The SCIM sub-type, if any.
    pub fn scim_type(&self) -> Option<ScimType> {
        match self {
            ScimError::BadRequest { scim_type, .. } | ScimError::Conflict { scim_type, .. } => {
                *scim_type
            }
            _ => None,
        }
    }

    /// The human readable detail without the kind prefix.
    pub fn detail(&self) -> &str {
        match self {
            ScimError::BadRequest { detail, .. }
            | ScimError::NotFound { detail }
            | ScimError::Conflict { detail, .. }
            | ScimError::PreconditionFailed { detail }
            | ScimError::Internal { detail } => detail,
        }
    }
}

impl From<crate::storage::StorageError> for ScimError {
    fn from(err: crate::storage::StorageError) -> Self {
        ScimError::internal(format!("storage failure: {}", err))
    }
}

/// Result type for silo operations.
pub type ScimResult<T> = Result<T, ScimError>;
