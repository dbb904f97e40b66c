//! Embedded schemas and resource types.
//!
//! The silo ships with the RFC 7643 User and Group schemas, the enterprise
//! User extension, and a Device schema, together with their resource types.
//! They let a [`SchemaRegistry`](super::SchemaRegistry) be built without any
//! schema files on disk.

/// URN of the core User schema.
pub const USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";
/// URN of the core Group schema.
pub const GROUP_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:Group";
/// URN of the enterprise User extension.
pub const ENTERPRISE_USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User";
/// URN of the Device schema.
pub const DEVICE_SCHEMA: &str = "urn:keydap:params:scim:schemas:core:2.0:Device";

/// Returns the core User schema as a JSON string.
pub fn core_user_schema() -> &'static str {
    r#"{
  "id": "urn:ietf:params:scim:schemas:core:2.0:User",
  "name": "User",
  "description": "User Account",
  "attributes": [
    {
      "name": "userName",
      "type": "string",
      "multiValued": false,
      "description": "Unique identifier for the User, typically used by the user to directly authenticate to the service provider.",
      "required": true,
      "caseExact": false,
      "mutability": "readWrite",
      "returned": "default",
      "uniqueness": "server"
    },
    {
      "name": "name",
      "type": "complex",
      "multiValued": false,
      "description": "The components of the user's real name.",
      "required": false,
      "subAttributes": [
        { "name": "formatted", "type": "string" },
        { "name": "familyName", "type": "string" },
        { "name": "givenName", "type": "string" },
        { "name": "middleName", "type": "string" },
        { "name": "honorificPrefix", "type": "string" },
        { "name": "honorificSuffix", "type": "string" }
      ],
      "mutability": "readWrite",
      "returned": "default",
      "uniqueness": "none"
    },
    {
      "name": "displayName",
      "type": "string",
      "description": "The name of the User, suitable for display to end-users."
    },
    {
      "name": "nickName",
      "type": "string",
      "description": "The casual way to address the user in real life."
    },
    {
      "name": "profileUrl",
      "type": "reference",
      "referenceTypes": ["external"],
      "description": "A fully qualified URL pointing to a page representing the User's online profile."
    },
    { "name": "title", "type": "string" },
    { "name": "userType", "type": "string" },
    { "name": "preferredLanguage", "type": "string" },
    { "name": "locale", "type": "string" },
    { "name": "timezone", "type": "string" },
    {
      "name": "active",
      "type": "boolean",
      "description": "A Boolean value indicating the User's administrative status."
    },
    {
      "name": "password",
      "type": "string",
      "description": "The User's cleartext password.",
      "mutability": "writeOnly",
      "returned": "never"
    },
    {
      "name": "emails",
      "type": "complex",
      "multiValued": true,
      "description": "Email addresses for the user.",
      "subAttributes": [
        { "name": "value", "type": "string" },
        { "name": "display", "type": "string" },
        {
          "name": "type",
          "type": "string",
          "canonicalValues": ["work", "home", "other"]
        },
        { "name": "primary", "type": "boolean" }
      ]
    },
    {
      "name": "phoneNumbers",
      "type": "complex",
      "multiValued": true,
      "description": "Phone numbers for the User.",
      "subAttributes": [
        { "name": "value", "type": "string" },
        { "name": "display", "type": "string" },
        { "name": "type", "type": "string" },
        { "name": "primary", "type": "boolean" }
      ]
    },
    {
      "name": "addresses",
      "type": "complex",
      "multiValued": true,
      "description": "A physical mailing address for this User.",
      "subAttributes": [
        { "name": "formatted", "type": "string" },
        { "name": "streetAddress", "type": "string" },
        { "name": "locality", "type": "string" },
        { "name": "region", "type": "string" },
        { "name": "postalCode", "type": "string" },
        { "name": "country", "type": "string" },
        { "name": "type", "type": "string" },
        { "name": "primary", "type": "boolean" }
      ]
    },
    {
      "name": "groups",
      "type": "complex",
      "multiValued": true,
      "description": "A list of groups to which the user belongs.",
      "mutability": "readOnly",
      "subAttributes": [
        {
          "name": "value",
          "type": "string",
          "caseExact": true,
          "mutability": "readOnly"
        },
        {
          "name": "$ref",
          "type": "reference",
          "referenceTypes": ["User", "Group"],
          "mutability": "readOnly"
        },
        { "name": "display", "type": "string", "mutability": "readOnly" },
        {
          "name": "type",
          "type": "string",
          "canonicalValues": ["direct", "indirect"],
          "mutability": "readOnly"
        }
      ]
    }
  ]
}"#
}

/// Returns the core Group schema as a JSON string.
pub fn core_group_schema() -> &'static str {
    r#"{
  "id": "urn:ietf:params:scim:schemas:core:2.0:Group",
  "name": "Group",
  "description": "Group",
  "attributes": [
    {
      "name": "displayName",
      "type": "string",
      "multiValued": false,
      "description": "A human-readable name for the Group.",
      "required": true,
      "caseExact": false,
      "mutability": "readWrite",
      "returned": "default",
      "uniqueness": "none"
    },
    {
      "name": "members",
      "type": "complex",
      "multiValued": true,
      "description": "A list of members of the Group.",
      "subAttributes": [
        {
          "name": "value",
          "type": "string",
          "caseExact": true,
          "mutability": "immutable"
        },
        {
          "name": "$ref",
          "type": "reference",
          "referenceTypes": ["User", "Group"],
          "mutability": "immutable"
        },
        {
          "name": "type",
          "type": "string",
          "canonicalValues": ["User", "Group"],
          "mutability": "immutable"
        },
        { "name": "display", "type": "string", "mutability": "readOnly" }
      ],
      "mutability": "readWrite",
      "returned": "default"
    }
  ]
}"#
}

/// Returns the enterprise User extension schema as a JSON string.
pub fn enterprise_user_schema() -> &'static str {
    r#"{
  "id": "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User",
  "name": "EnterpriseUser",
  "description": "Enterprise User",
  "attributes": [
    { "name": "employeeNumber", "type": "string" },
    { "name": "costCenter", "type": "string" },
    { "name": "organization", "type": "string" },
    { "name": "division", "type": "string" },
    { "name": "department", "type": "string" },
    {
      "name": "manager",
      "type": "complex",
      "description": "The User's manager.",
      "subAttributes": [
        { "name": "value", "type": "string", "caseExact": true },
        {
          "name": "$ref",
          "type": "reference",
          "referenceTypes": ["User"]
        },
        { "name": "displayName", "type": "string", "mutability": "readOnly" }
      ]
    }
  ]
}"#
}

/// Returns the Device schema as a JSON string.
pub fn device_schema() -> &'static str {
    r#"{
  "id": "urn:keydap:params:scim:schemas:core:2.0:Device",
  "name": "Device",
  "description": "A hardware device",
  "attributes": [
    { "name": "manufacturer", "type": "string" },
    {
      "name": "serialNumber",
      "type": "string",
      "required": true,
      "uniqueness": "server"
    },
    { "name": "rating", "type": "integer" },
    { "name": "price", "type": "decimal" },
    {
      "name": "macId",
      "type": "string",
      "caseExact": true,
      "mutability": "immutable"
    },
    { "name": "installedDate", "type": "dateTime" },
    { "name": "repairDates", "type": "dateTime", "multiValued": true },
    { "name": "firmware", "type": "binary" },
    {
      "name": "location",
      "type": "complex",
      "subAttributes": [
        { "name": "latitude", "type": "string" },
        { "name": "longitude", "type": "string" },
        { "name": "desc", "type": "string" }
      ]
    },
    {
      "name": "photos",
      "type": "complex",
      "multiValued": true,
      "subAttributes": [
        { "name": "value", "type": "string" },
        { "name": "primary", "type": "boolean" }
      ]
    }
  ]
}"#
}

/// Returns the User resource type as a JSON string.
pub fn user_resource_type() -> &'static str {
    r#"{
  "schemas": ["urn:ietf:params:scim:schemas:core:2.0:ResourceType"],
  "id": "User",
  "name": "User",
  "endpoint": "/Users",
  "description": "User Account",
  "schema": "urn:ietf:params:scim:schemas:core:2.0:User",
  "schemaExtensions": [
    {
      "schema": "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User",
      "required": false
    }
  ]
}"#
}

/// Returns the Group resource type as a JSON string.
pub fn group_resource_type() -> &'static str {
    r#"{
  "schemas": ["urn:ietf:params:scim:schemas:core:2.0:ResourceType"],
  "id": "Group",
  "name": "Group",
  "endpoint": "/Groups",
  "description": "Group",
  "schema": "urn:ietf:params:scim:schemas:core:2.0:Group"
}"#
}

/// Returns the Device resource type as a JSON string.
pub fn device_resource_type() -> &'static str {
    r#"{
  "schemas": ["urn:ietf:params:scim:schemas:core:2.0:ResourceType"],
  "id": "Device",
  "name": "Device",
  "endpoint": "/Devices",
  "description": "Device",
  "schema": "urn:keydap:params:scim:schemas:core:2.0:Device"
}"#
}

/// All embedded schemas.
pub fn schemas() -> [&'static str; 4] {
    [
        core_user_schema(),
        core_group_schema(),
        enterprise_user_schema(),
        device_schema(),
    ]
}

/// All embedded resource types.
pub fn resource_types() -> [&'static str; 3] {
    [
        user_resource_type(),
        group_resource_type(),
        device_resource_type(),
    ]
}
