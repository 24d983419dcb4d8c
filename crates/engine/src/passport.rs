//! The `Passport` orchestrator.
//!
//! Passport composes the three repository contracts and never talks to the
//! store directly. Every public operation follows the same two-step shapes:
//! classify → resolve for polymorphic references, and identifiers → hydrate
//! for listings (one count/page round trip plus one batch fetch — no per-row
//! fetching).

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use passport_core::{
    NewPermission, NewRole, Pager, PassportError, PassportResult, Permission, PermissionId,
    PermissionRef, PermissionUpdate, Ref, Role, RoleRef, RoleUpdate, UserId, guard,
    permission_ids, role_ids,
};

use crate::repository::{PermissionRepository, RoleRepository, UserGrantRepository};

/// The authorization engine.
///
/// Stateless beyond the repository handles it is constructed with; safe for
/// concurrent invocation. Concurrent mutations of the same user's grants are
/// not ordered by the engine — callers impose their own synchronization if
/// they need it.
#[derive(Clone)]
pub struct Passport {
    roles: Arc<dyn RoleRepository>,
    permissions: Arc<dyn PermissionRepository>,
    grants: Arc<dyn UserGrantRepository>,
}

impl Passport {
    pub fn new(
        roles: Arc<dyn RoleRepository>,
        permissions: Arc<dyn PermissionRepository>,
        grants: Arc<dyn UserGrantRepository>,
    ) -> Self {
        Self {
            roles,
            permissions,
            grants,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Role resolution
    // ─────────────────────────────────────────────────────────────────────

    /// Resolve a reference to exactly one role.
    ///
    /// A collection reference resolves the whole collection and returns its
    /// first element (`NotFound` when empty).
    pub async fn resolve_role(
        &self,
        role: &RoleRef,
        with_permissions: bool,
    ) -> PassportResult<Role> {
        match role {
            Ref::Name(name) => self.roles.get_by_guard(&guard(name), with_permissions).await,
            Ref::Id(id) => self.roles.get_by_id(*id, with_permissions).await,
            _ => self
                .resolve_roles(role, with_permissions)
                .await?
                .into_iter()
                .next()
                .ok_or(PassportError::NotFound),
        }
    }

    /// Resolve a reference to a collection of roles.
    ///
    /// Scalar references resolve to a one-element collection. List references
    /// are batch-fetched in a single round trip per shape.
    pub async fn resolve_roles(
        &self,
        role: &RoleRef,
        with_permissions: bool,
    ) -> PassportResult<Vec<Role>> {
        match role {
            Ref::Name(name) => Ok(vec![
                self.roles.get_by_guard(&guard(name), with_permissions).await?,
            ]),
            Ref::Id(id) => Ok(vec![self.roles.get_by_id(*id, with_permissions).await?]),
            Ref::Names(names) => {
                let guards: Vec<String> = names.iter().map(|n| guard(n)).collect();
                self.roles.get_by_guards(&guards, with_permissions).await
            }
            Ref::Ids(ids) => self.roles.get_by_ids(ids, with_permissions).await,
        }
    }

    /// All roles, page-wise. The total always reflects the unfiltered set.
    pub async fn list_all_roles(
        &self,
        pager: Option<Pager>,
        with_permissions: bool,
    ) -> PassportResult<(Vec<Role>, u64)> {
        let (ids, total) = self.roles.ids(pager).await?;
        let roles = self.roles.get_by_ids(&ids, with_permissions).await?;
        Ok((roles, total))
    }

    /// Roles held by a user, page-wise.
    pub async fn list_roles_of_user(
        &self,
        user: UserId,
        pager: Option<Pager>,
        with_permissions: bool,
    ) -> PassportResult<(Vec<Role>, u64)> {
        let (ids, total) = self.roles.ids_of_user(user, pager).await?;
        let roles = self.roles.get_by_ids(&ids, with_permissions).await?;
        Ok((roles, total))
    }

    /// Create a role keyed by its guard token; returns the existing record
    /// when the token is already taken (first-or-create).
    pub async fn create_role(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> PassportResult<Role> {
        self.roles
            .first_or_create(NewRole::from_name(name, description))
            .await
    }

    /// Apply a partial update to a role. Renaming re-derives its guard token.
    pub async fn update_role(&self, role: &RoleRef, changes: RoleUpdate) -> PassportResult<Role> {
        let role = self.resolve_role(role, false).await?;
        self.roles.update(role.id, changes).await
    }

    /// Delete a role; join rows referencing it are removed in the same unit.
    pub async fn delete_role(&self, role: &RoleRef) -> PassportResult<()> {
        let role = self.resolve_role(role, false).await?;
        debug!(role = %role.id, guard = %role.guard_name, "deleting role");
        self.roles.delete_cascading(role.id).await
    }

    pub async fn add_permissions_to_role(
        &self,
        role: &RoleRef,
        permissions: &PermissionRef,
    ) -> PassportResult<()> {
        let role = self.resolve_role(role, false).await?;
        let permissions = self.resolve_permissions(permissions).await?;
        if !permissions.is_empty() {
            self.roles
                .add_permissions(role.id, &permission_ids(&permissions))
                .await?;
        }
        Ok(())
    }

    /// Replace a role's permission set. An empty resolved set clears every
    /// attached permission rather than no-opping.
    pub async fn replace_permissions_of_role(
        &self,
        role: &RoleRef,
        permissions: &PermissionRef,
    ) -> PassportResult<()> {
        let role = self.resolve_role(role, false).await?;
        let permissions = self.resolve_permissions(permissions).await?;
        if permissions.is_empty() {
            return self.roles.clear_permissions(role.id).await;
        }
        self.roles
            .replace_permissions(role.id, &permission_ids(&permissions))
            .await
    }

    pub async fn remove_permissions_from_role(
        &self,
        role: &RoleRef,
        permissions: &PermissionRef,
    ) -> PassportResult<()> {
        let role = self.resolve_role(role, false).await?;
        let permissions = self.resolve_permissions(permissions).await?;
        if !permissions.is_empty() {
            self.roles
                .remove_permissions(role.id, &permission_ids(&permissions))
                .await?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Permission resolution
    // ─────────────────────────────────────────────────────────────────────

    /// Resolve a reference to exactly one permission.
    pub async fn resolve_permission(
        &self,
        permission: &PermissionRef,
    ) -> PassportResult<Permission> {
        match permission {
            Ref::Name(name) => self.permissions.get_by_guard(&guard(name)).await,
            Ref::Id(id) => self.permissions.get_by_id(*id).await,
            _ => self
                .resolve_permissions(permission)
                .await?
                .into_iter()
                .next()
                .ok_or(PassportError::NotFound),
        }
    }

    /// Resolve a reference to a collection of permissions.
    pub async fn resolve_permissions(
        &self,
        permission: &PermissionRef,
    ) -> PassportResult<Vec<Permission>> {
        match permission {
            Ref::Name(name) => Ok(vec![self.permissions.get_by_guard(&guard(name)).await?]),
            Ref::Id(id) => Ok(vec![self.permissions.get_by_id(*id).await?]),
            Ref::Names(names) => {
                let guards: Vec<String> = names.iter().map(|n| guard(n)).collect();
                self.permissions.get_by_guards(&guards).await
            }
            Ref::Ids(ids) => self.permissions.get_by_ids(ids).await,
        }
    }

    pub async fn list_all_permissions(
        &self,
        pager: Option<Pager>,
    ) -> PassportResult<(Vec<Permission>, u64)> {
        let (ids, total) = self.permissions.ids(pager).await?;
        let permissions = self.permissions.get_by_ids(&ids).await?;
        Ok((permissions, total))
    }

    /// Permissions granted directly to a user, page-wise (role-derived grants
    /// are not included).
    pub async fn list_direct_permissions_of_user(
        &self,
        user: UserId,
        pager: Option<Pager>,
    ) -> PassportResult<(Vec<Permission>, u64)> {
        let (ids, total) = self.permissions.direct_ids_of_user(user, pager).await?;
        let permissions = self.permissions.get_by_ids(&ids).await?;
        Ok((permissions, total))
    }

    /// Distinct permissions attached to the referenced roles, page-wise.
    pub async fn list_permissions_of_roles(
        &self,
        roles: &RoleRef,
        pager: Option<Pager>,
    ) -> PassportResult<(Vec<Permission>, u64)> {
        let roles = self.resolve_roles(roles, false).await?;
        let (ids, total) = self
            .permissions
            .ids_of_roles(&role_ids(&roles), pager)
            .await?;
        let permissions = self.permissions.get_by_ids(&ids).await?;
        Ok((permissions, total))
    }

    /// Every permission available to a user: the union of direct grants and
    /// role-derived grants, deduplicated by identifier. Unpaginated.
    pub async fn all_permissions_of_user(&self, user: UserId) -> PassportResult<Vec<Permission>> {
        let ids = self.all_permission_ids_of_user(user).await?;
        self.permissions.get_by_ids(&ids).await
    }

    pub async fn create_permission(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> PassportResult<Permission> {
        self.permissions
            .first_or_create(NewPermission::from_name(name, description))
            .await
    }

    /// Apply a partial update to a permission. Renaming re-derives its guard
    /// token.
    pub async fn update_permission(
        &self,
        permission: &PermissionRef,
        changes: PermissionUpdate,
    ) -> PassportResult<Permission> {
        let permission = self.resolve_permission(permission).await?;
        self.permissions.update(permission.id, changes).await
    }

    pub async fn delete_permission(&self, permission: &PermissionRef) -> PassportResult<()> {
        let permission = self.resolve_permission(permission).await?;
        debug!(permission = %permission.id, guard = %permission.guard_name, "deleting permission");
        self.permissions.delete_cascading(permission.id).await
    }

    // ─────────────────────────────────────────────────────────────────────
    // User grant mutators
    // ─────────────────────────────────────────────────────────────────────

    pub async fn add_roles_to_user(&self, user: UserId, roles: &RoleRef) -> PassportResult<()> {
        let roles = self.resolve_roles(roles, false).await?;
        if !roles.is_empty() {
            debug!(%user, count = roles.len(), "adding roles to user");
            self.grants.add_roles(user, &role_ids(&roles)).await?;
        }
        Ok(())
    }

    /// Replace a user's role set. An empty resolved set clears all roles.
    pub async fn replace_roles_of_user(&self, user: UserId, roles: &RoleRef) -> PassportResult<()> {
        let roles = self.resolve_roles(roles, false).await?;
        if roles.is_empty() {
            return self.grants.clear_roles(user).await;
        }
        self.grants.replace_roles(user, &role_ids(&roles)).await
    }

    pub async fn remove_roles_from_user(&self, user: UserId, roles: &RoleRef) -> PassportResult<()> {
        let roles = self.resolve_roles(roles, false).await?;
        if !roles.is_empty() {
            self.grants.remove_roles(user, &role_ids(&roles)).await?;
        }
        Ok(())
    }

    pub async fn add_permissions_to_user(
        &self,
        user: UserId,
        permissions: &PermissionRef,
    ) -> PassportResult<()> {
        let permissions = self.resolve_permissions(permissions).await?;
        if !permissions.is_empty() {
            debug!(%user, count = permissions.len(), "adding direct permissions to user");
            self.grants
                .add_permissions(user, &permission_ids(&permissions))
                .await?;
        }
        Ok(())
    }

    /// Replace a user's direct permission set; empty resolved set clears it.
    pub async fn replace_permissions_of_user(
        &self,
        user: UserId,
        permissions: &PermissionRef,
    ) -> PassportResult<()> {
        let permissions = self.resolve_permissions(permissions).await?;
        if permissions.is_empty() {
            return self.grants.clear_permissions(user).await;
        }
        self.grants
            .replace_permissions(user, &permission_ids(&permissions))
            .await
    }

    pub async fn remove_permissions_from_user(
        &self,
        user: UserId,
        permissions: &PermissionRef,
    ) -> PassportResult<()> {
        let permissions = self.resolve_permissions(permissions).await?;
        if !permissions.is_empty() {
            self.grants
                .remove_permissions(user, &permission_ids(&permissions))
                .await?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Membership predicates
    // ─────────────────────────────────────────────────────────────────────
    //
    // All predicates resolve their references to identifier sets first, then
    // evaluate against join-table counts — never hydrated object equality.

    /// Does the role (or any of the referenced roles) hold the permission?
    pub async fn role_has_permission(
        &self,
        roles: &RoleRef,
        permission: &PermissionRef,
    ) -> PassportResult<bool> {
        let roles = self.resolve_roles(roles, false).await?;
        let permission = self.resolve_permission(permission).await?;
        let count = self
            .roles
            .count_has_permission(&role_ids(&roles), permission.id)
            .await?;
        Ok(count > 0)
    }

    /// Does every referenced role hold every referenced permission?
    ///
    /// Full Cartesian coverage: the join-row count must equal
    /// `|roles| * |permissions|`, not merely have the union cover the set.
    pub async fn role_has_all_permissions(
        &self,
        roles: &RoleRef,
        permissions: &PermissionRef,
    ) -> PassportResult<bool> {
        let roles = self.resolve_roles(roles, false).await?;
        let permissions = self.resolve_permissions(permissions).await?;
        let count = self
            .roles
            .count_has_all_permissions(&role_ids(&roles), &permission_ids(&permissions))
            .await?;
        Ok(count == (roles.len() * permissions.len()) as u64)
    }

    /// Does any referenced role hold any referenced permission?
    pub async fn role_has_any_permissions(
        &self,
        roles: &RoleRef,
        permissions: &PermissionRef,
    ) -> PassportResult<bool> {
        let roles = self.resolve_roles(roles, false).await?;
        let permissions = self.resolve_permissions(permissions).await?;
        let count = self
            .roles
            .count_has_any_permissions(&role_ids(&roles), &permission_ids(&permissions))
            .await?;
        Ok(count > 0)
    }

    pub async fn user_has_role(&self, user: UserId, role: &RoleRef) -> PassportResult<bool> {
        let role = self.resolve_role(role, false).await?;
        Ok(self.grants.count_has_role(user, role.id).await? > 0)
    }

    pub async fn user_has_all_roles(&self, user: UserId, roles: &RoleRef) -> PassportResult<bool> {
        let roles = self.resolve_roles(roles, false).await?;
        let count = self
            .grants
            .count_has_all_roles(user, &role_ids(&roles))
            .await?;
        Ok(count == roles.len() as u64)
    }

    pub async fn user_has_any_roles(&self, user: UserId, roles: &RoleRef) -> PassportResult<bool> {
        let roles = self.resolve_roles(roles, false).await?;
        let count = self
            .grants
            .count_has_any_roles(user, &role_ids(&roles))
            .await?;
        Ok(count > 0)
    }

    /// Direct grant check only — role-derived permissions are bypassed.
    pub async fn user_has_direct_permission(
        &self,
        user: UserId,
        permission: &PermissionRef,
    ) -> PassportResult<bool> {
        let permission = self.resolve_permission(permission).await?;
        let count = self
            .grants
            .count_has_direct_permission(user, permission.id)
            .await?;
        Ok(count > 0)
    }

    pub async fn user_has_all_direct_permissions(
        &self,
        user: UserId,
        permissions: &PermissionRef,
    ) -> PassportResult<bool> {
        let permissions = self.resolve_permissions(permissions).await?;
        let count = self
            .grants
            .count_has_all_direct_permissions(user, &permission_ids(&permissions))
            .await?;
        Ok(count == permissions.len() as u64)
    }

    pub async fn user_has_any_direct_permissions(
        &self,
        user: UserId,
        permissions: &PermissionRef,
    ) -> PassportResult<bool> {
        let permissions = self.resolve_permissions(permissions).await?;
        let count = self
            .grants
            .count_has_any_direct_permissions(user, &permission_ids(&permissions))
            .await?;
        Ok(count > 0)
    }

    /// Does the user hold the permission directly or through any role?
    ///
    /// The direct-grant check short-circuits before any role query.
    pub async fn user_has_permission(
        &self,
        user: UserId,
        permission: &PermissionRef,
    ) -> PassportResult<bool> {
        let permission = self.resolve_permission(permission).await?;

        let (direct, _) = self.permissions.direct_ids_of_user(user, None).await?;
        if direct.contains(&permission.id) {
            return Ok(true);
        }

        let (roles, _) = self.roles.ids_of_user(user, None).await?;
        let (derived, _) = self.permissions.ids_of_roles(&roles, None).await?;
        Ok(derived.contains(&permission.id))
    }

    /// Does the user hold every referenced permission, directly or through
    /// roles? The union is computed once and each identifier tested against
    /// it.
    pub async fn user_has_all_permissions(
        &self,
        user: UserId,
        permissions: &PermissionRef,
    ) -> PassportResult<bool> {
        let requested = self.resolve_permissions(permissions).await?;
        let held: HashSet<PermissionId> =
            self.all_permission_ids_of_user(user).await?.into_iter().collect();
        Ok(requested.iter().all(|p| held.contains(&p.id)))
    }

    /// Does the user hold at least one referenced permission, directly or
    /// through roles?
    pub async fn user_has_any_permissions(
        &self,
        user: UserId,
        permissions: &PermissionRef,
    ) -> PassportResult<bool> {
        let requested = self.resolve_permissions(permissions).await?;
        let held: HashSet<PermissionId> =
            self.all_permission_ids_of_user(user).await?.into_iter().collect();
        Ok(requested.iter().any(|p| held.contains(&p.id)))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    /// Deduplicated union of a user's direct and role-derived permission IDs.
    async fn all_permission_ids_of_user(&self, user: UserId) -> PassportResult<Vec<PermissionId>> {
        let (roles, _) = self.roles.ids_of_user(user, None).await?;
        let (derived, _) = self.permissions.ids_of_roles(&roles, None).await?;
        let (direct, _) = self.permissions.direct_ids_of_user(user, None).await?;
        Ok(dedup_ids([derived, direct]))
    }
}

/// Merge identifier lists, keeping first occurrence order.
fn dedup_ids(lists: impl IntoIterator<Item = Vec<PermissionId>>) -> Vec<PermissionId> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for id in lists.into_iter().flatten() {
        if seen.insert(id) {
            merged.push(id);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let a = PermissionId::new();
        let b = PermissionId::new();
        let c = PermissionId::new();

        let merged = dedup_ids([vec![a, b], vec![b, c, a]]);
        assert_eq!(merged, vec![a, b, c]);
    }

    #[test]
    fn dedup_of_empty_lists_is_empty() {
        assert!(dedup_ids([Vec::new(), Vec::new()]).is_empty());
    }
}
