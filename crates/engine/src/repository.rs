//! Repository contracts consumed by the engine.
//!
//! These are mechanical data-access adapters over a relational store; all
//! decision logic lives in [`crate::Passport`]. Implementations must:
//!
//! - wrap every transport failure as `PassportError::Store` carrying the
//!   operation name (no retries, no further classification)
//! - execute multi-table mutations (replace, cascading delete) inside a
//!   single atomic unit so partial failure leaves no orphaned join rows
//! - treat `add*` join mutations as conflict-absorbing (adding an existing
//!   pair is a silent no-op)
//!
//! Paged `ids`-style queries issue two round trips (count, then page); the
//! two are **not** guaranteed to observe a consistent snapshot unless the
//! store's transaction isolation provides it. That weak-consistency window
//! is accepted, not worked around.

use async_trait::async_trait;

use passport_core::{
    NewPermission, NewRole, Pager, PassportResult, Permission, PermissionId, PermissionUpdate,
    Role, RoleId, RoleUpdate, UserId,
};

/// CRUD and membership queries over roles and the role-permission join.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Fetch one role by guard token. `NotFound` if absent.
    async fn get_by_guard(&self, guard: &str, with_permissions: bool) -> PassportResult<Role>;

    /// Fetch one role by identifier. `NotFound` if absent.
    async fn get_by_id(&self, id: RoleId, with_permissions: bool) -> PassportResult<Role>;

    /// Batch fetch by guard tokens. Unknown tokens are skipped, not errors.
    async fn get_by_guards(
        &self,
        guards: &[String],
        with_permissions: bool,
    ) -> PassportResult<Vec<Role>>;

    /// Batch fetch by identifiers. Unknown identifiers are skipped.
    async fn get_by_ids(&self, ids: &[RoleId], with_permissions: bool)
    -> PassportResult<Vec<Role>>;

    /// Page of role identifiers plus the unfiltered total count.
    async fn ids(&self, pager: Option<Pager>) -> PassportResult<(Vec<RoleId>, u64)>;

    /// Page of role identifiers held by a user, plus the unfiltered total.
    async fn ids_of_user(
        &self,
        user: UserId,
        pager: Option<Pager>,
    ) -> PassportResult<(Vec<RoleId>, u64)>;

    /// Create the role unless one with the same guard token exists; either
    /// way return the stored record.
    async fn first_or_create(&self, role: NewRole) -> PassportResult<Role>;

    /// Apply a partial-field update and return the stored record.
    async fn update(&self, id: RoleId, changes: RoleUpdate) -> PassportResult<Role>;

    /// Delete the role and every join row referencing it, atomically.
    async fn delete_cascading(&self, id: RoleId) -> PassportResult<()>;

    async fn add_permissions(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> PassportResult<()>;

    async fn replace_permissions(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> PassportResult<()>;

    async fn remove_permissions(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> PassportResult<()>;

    async fn clear_permissions(&self, role: RoleId) -> PassportResult<()>;

    /// Join rows matching any of `roles` × the one permission.
    async fn count_has_permission(
        &self,
        roles: &[RoleId],
        permission: PermissionId,
    ) -> PassportResult<u64>;

    /// Join rows matching `roles` × `permissions`. The ALL predicate compares
    /// this against `|roles| * |permissions|` (full Cartesian coverage).
    async fn count_has_all_permissions(
        &self,
        roles: &[RoleId],
        permissions: &[PermissionId],
    ) -> PassportResult<u64>;

    /// Join rows matching `roles` × `permissions` (ANY compares against zero).
    async fn count_has_any_permissions(
        &self,
        roles: &[RoleId],
        permissions: &[PermissionId],
    ) -> PassportResult<u64>;
}

/// CRUD and bulk lookups over permissions, independent of roles/users.
#[async_trait]
pub trait PermissionRepository: Send + Sync {
    async fn get_by_guard(&self, guard: &str) -> PassportResult<Permission>;

    async fn get_by_id(&self, id: PermissionId) -> PassportResult<Permission>;

    async fn get_by_guards(&self, guards: &[String]) -> PassportResult<Vec<Permission>>;

    async fn get_by_ids(&self, ids: &[PermissionId]) -> PassportResult<Vec<Permission>>;

    /// Page of permission identifiers plus the unfiltered total count.
    async fn ids(&self, pager: Option<Pager>) -> PassportResult<(Vec<PermissionId>, u64)>;

    /// Identifiers granted directly to the user (bypassing roles).
    async fn direct_ids_of_user(
        &self,
        user: UserId,
        pager: Option<Pager>,
    ) -> PassportResult<(Vec<PermissionId>, u64)>;

    /// Distinct permission identifiers attached to any of the roles.
    async fn ids_of_roles(
        &self,
        roles: &[RoleId],
        pager: Option<Pager>,
    ) -> PassportResult<(Vec<PermissionId>, u64)>;

    async fn first_or_create(&self, permission: NewPermission) -> PassportResult<Permission>;

    async fn update(&self, id: PermissionId, changes: PermissionUpdate)
    -> PassportResult<Permission>;

    /// Delete the permission and every join row referencing it, atomically.
    async fn delete_cascading(&self, id: PermissionId) -> PassportResult<()>;
}

/// Maintenance of the user-role and user-permission (direct grant) joins.
#[async_trait]
pub trait UserGrantRepository: Send + Sync {
    async fn add_roles(&self, user: UserId, roles: &[RoleId]) -> PassportResult<()>;

    async fn replace_roles(&self, user: UserId, roles: &[RoleId]) -> PassportResult<()>;

    async fn remove_roles(&self, user: UserId, roles: &[RoleId]) -> PassportResult<()>;

    async fn clear_roles(&self, user: UserId) -> PassportResult<()>;

    async fn add_permissions(&self, user: UserId, permissions: &[PermissionId])
    -> PassportResult<()>;

    async fn replace_permissions(
        &self,
        user: UserId,
        permissions: &[PermissionId],
    ) -> PassportResult<()>;

    async fn remove_permissions(
        &self,
        user: UserId,
        permissions: &[PermissionId],
    ) -> PassportResult<()>;

    async fn clear_permissions(&self, user: UserId) -> PassportResult<()>;

    async fn count_has_role(&self, user: UserId, role: RoleId) -> PassportResult<u64>;

    /// The ALL predicate compares this against `|roles|`.
    async fn count_has_all_roles(&self, user: UserId, roles: &[RoleId]) -> PassportResult<u64>;

    async fn count_has_any_roles(&self, user: UserId, roles: &[RoleId]) -> PassportResult<u64>;

    async fn count_has_direct_permission(
        &self,
        user: UserId,
        permission: PermissionId,
    ) -> PassportResult<u64>;

    /// The ALL variant compares this against `|permissions|`.
    async fn count_has_all_direct_permissions(
        &self,
        user: UserId,
        permissions: &[PermissionId],
    ) -> PassportResult<u64>;

    async fn count_has_any_direct_permissions(
        &self,
        user: UserId,
        permissions: &[PermissionId],
    ) -> PassportResult<u64>;
}
