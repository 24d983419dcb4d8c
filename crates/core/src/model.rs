//! Role and permission records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::guard::guard;
use crate::id::{PermissionId, RoleId};

/// A permission record.
///
/// Permissions have no intrinsic owner; attachment to roles and users lives
/// in external join records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    /// Human-facing display name.
    pub name: String,
    /// Canonical slug derived from `name`, unique, used as a lookup key.
    pub guard_name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A role record, optionally hydrated with its associated permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub guard_name: String,
    pub description: String,
    /// Associated permissions. Empty unless the lookup asked for eager
    /// loading; order carries no meaning.
    pub permissions: Vec<Permission>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for first-or-create of a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    pub guard_name: String,
    pub description: String,
}

impl NewRole {
    /// Build a payload with the guard token derived from the name.
    pub fn from_name(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            guard_name: guard(&name),
            name,
            description: description.into(),
        }
    }
}

/// Payload for first-or-create of a permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPermission {
    pub name: String,
    pub guard_name: String,
    pub description: String,
}

impl NewPermission {
    pub fn from_name(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            guard_name: guard(&name),
            name,
            description: description.into(),
        }
    }
}

/// Partial-field update for a role. `None` leaves the field untouched.
///
/// Renaming re-derives the guard token, since the token is a function of the
/// display name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Partial-field update for a permission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Collect the identifiers of a role slice.
pub fn role_ids(roles: &[Role]) -> Vec<RoleId> {
    roles.iter().map(|r| r.id).collect()
}

/// Collect the identifiers of a permission slice.
pub fn permission_ids(permissions: &[Permission]) -> Vec<PermissionId> {
    permissions.iter().map(|p| p.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_role_derives_guard_token() {
        let role = NewRole::from_name("Sales Manager", "manages sales");
        assert_eq!(role.guard_name, "sales-manager");
        assert_eq!(role.name, "Sales Manager");
    }

    #[test]
    fn new_permission_derives_guard_token() {
        let permission = NewPermission::from_name("create $#% contact", "");
        assert_eq!(permission.guard_name, "create-contact");
    }
}
