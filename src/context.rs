//! Operation contexts passed to the [`Silo`](crate::silo::Silo).
//!
//! Every operation carries an [`OpContext`] identifying the request that
//! triggered it. The engine only uses it for logging.

use uuid::Uuid;

use crate::filter::FilterNode;
use crate::patch::PatchRequest;
use crate::resource::Resource;

/// Request tracking information for a single operation.
#[derive(Debug, Clone)]
pub struct OpContext {
    /// Unique identifier for this request
    pub request_id: String,
    /// Address of the client, when known
    pub client_ip: Option<String>,
    /// Session the request belongs to, when authenticated
    pub session_id: Option<String>,
}

impl OpContext {
    /// Create a context with a specific request ID.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            client_ip: None,
            session_id: None,
        }
    }

    /// Create a context with a generated request ID.
    pub fn with_generated_id() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn with_client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = Some(client_ip.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

impl Default for OpContext {
    fn default() -> Self {
        Self::with_generated_id()
    }
}

/// Insert a new resource.
#[derive(Debug, Clone)]
pub struct CreateContext {
    pub resource: Resource,
    pub op_ctx: OpContext,
}

impl CreateContext {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            op_ctx: OpContext::default(),
        }
    }
}

/// Fetch a resource by id.
#[derive(Debug, Clone)]
pub struct GetContext {
    pub id: String,
    /// Resource type name, e.g. `User`
    pub resource_type: String,
    pub op_ctx: OpContext,
}

impl GetContext {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            op_ctx: OpContext::default(),
        }
    }
}

/// Search one or more resource types with a filter.
#[derive(Debug, Clone)]
pub struct SearchContext {
    pub filter: FilterNode,
    /// Resource type names to search
    pub resource_types: Vec<String>,
    pub op_ctx: OpContext,
}

impl SearchContext {
    pub fn new(filter: FilterNode, resource_types: &[&str]) -> Self {
        Self {
            filter,
            resource_types: resource_types.iter().map(|s| s.to_string()).collect(),
            op_ctx: OpContext::default(),
        }
    }
}

/// Apply a patch request to a stored resource.
#[derive(Debug, Clone)]
pub struct PatchContext {
    pub id: String,
    pub resource_type: String,
    pub request: PatchRequest,
    /// Version the caller last saw, checked before any operation is applied
    pub if_match: Option<String>,
    pub op_ctx: OpContext,
}

impl PatchContext {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>, request: PatchRequest) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            request,
            if_match: None,
            op_ctx: OpContext::default(),
        }
    }

    pub fn with_if_match(mut self, version: impl Into<String>) -> Self {
        self.if_match = Some(version.into());
        self
    }
}

/// Replace a stored resource wholesale.
#[derive(Debug, Clone)]
pub struct ReplaceContext {
    /// Incoming resource, its id must already be set
    pub resource: Resource,
    /// Version the caller last saw
    pub if_match: Option<String>,
    pub op_ctx: OpContext,
}

impl ReplaceContext {
    pub fn new(resource: Resource, if_match: Option<String>) -> Self {
        Self {
            resource,
            if_match,
            op_ctx: OpContext::default(),
        }
    }
}

/// Delete a resource by id.
#[derive(Debug, Clone)]
pub struct DeleteContext {
    pub id: String,
    pub resource_type: String,
    pub op_ctx: OpContext,
}

impl DeleteContext {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            op_ctx: OpContext::default(),
        }
    }
}

/// Add a user to some groups and remove it from others in one transaction.
#[derive(Debug, Clone)]
pub struct ModifyGroupsOfUserRequest {
    pub user_id: String,
    pub add_gids: Vec<String>,
    pub remove_gids: Vec<String>,
    /// Version of the user the caller last saw
    pub user_version: Option<String>,
    pub op_ctx: OpContext,
}

impl ModifyGroupsOfUserRequest {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            add_gids: Vec::new(),
            remove_gids: Vec::new(),
            user_version: None,
            op_ctx: OpContext::default(),
        }
    }

    pub fn add_to(mut self, gid: impl Into<String>) -> Self {
        self.add_gids.push(gid.into());
        self
    }

    pub fn remove_from(mut self, gid: impl Into<String>) -> Self {
        self.remove_gids.push(gid.into());
        self
    }

    pub fn with_user_version(mut self, version: impl Into<String>) -> Self {
        self.user_version = Some(version.into());
        self
    }
}
