//! In-memory repository implementation.
//!
//! Intended for tests/dev. Not optimized for performance. All five tables
//! live behind one `RwLock`, so every multi-table mutation (replace paths,
//! cascading deletes) is naturally atomic: it runs under a single write
//! guard.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use passport_core::{
    NewPermission, NewRole, Pager, PassportError, PassportResult, Permission, PermissionId,
    PermissionUpdate, Role, RoleId, RoleUpdate, UserId, guard,
};
use passport_engine::{PermissionRepository, RoleRepository, UserGrantRepository};

#[derive(Debug, Default)]
struct Tables {
    /// Role rows, keyed by id. `permissions` on stored rows is always empty;
    /// hydration reads the join set.
    roles: BTreeMap<RoleId, Role>,
    permissions: BTreeMap<PermissionId, Permission>,
    role_permissions: BTreeSet<(RoleId, PermissionId)>,
    user_roles: BTreeSet<(UserId, RoleId)>,
    user_permissions: BTreeSet<(UserId, PermissionId)>,
}

/// In-memory store implementing all three repository contracts.
///
/// Share one instance (behind `Arc`) across the three repository handles so
/// the join tables stay consistent.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, operation: &str) -> PassportResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| PassportError::store(operation, "lock poisoned"))
    }

    fn write(&self, operation: &str) -> PassportResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| PassportError::store(operation, "lock poisoned"))
    }
}

/// Apply a pager to an id list; the total always reflects the full list.
fn paginate<T>(ids: Vec<T>, pager: Option<Pager>) -> (Vec<T>, u64) {
    let total = ids.len() as u64;
    match pager {
        None => (ids, total),
        Some(p) => {
            let page = ids
                .into_iter()
                .skip(p.offset() as usize)
                .take(p.limit() as usize)
                .collect();
            (page, total)
        }
    }
}

impl Tables {
    fn hydrate_role(&self, role: &Role, with_permissions: bool) -> Role {
        let mut role = role.clone();
        if with_permissions {
            role.permissions = self
                .role_permissions
                .iter()
                .filter(|(r, _)| *r == role.id)
                .filter_map(|(_, p)| self.permissions.get(p).cloned())
                .collect();
        }
        role
    }

    fn role_by_guard(&self, guard_name: &str) -> Option<&Role> {
        self.roles.values().find(|r| r.guard_name == guard_name)
    }

    fn permission_by_guard(&self, guard_name: &str) -> Option<&Permission> {
        self.permissions
            .values()
            .find(|p| p.guard_name == guard_name)
    }
}

#[async_trait]
impl RoleRepository for InMemoryStore {
    async fn get_by_guard(&self, guard: &str, with_permissions: bool) -> PassportResult<Role> {
        let tables = self.read("role.get_by_guard")?;
        let role = tables.role_by_guard(guard).ok_or(PassportError::NotFound)?;
        Ok(tables.hydrate_role(role, with_permissions))
    }

    async fn get_by_id(&self, id: RoleId, with_permissions: bool) -> PassportResult<Role> {
        let tables = self.read("role.get_by_id")?;
        let role = tables.roles.get(&id).ok_or(PassportError::NotFound)?;
        Ok(tables.hydrate_role(role, with_permissions))
    }

    async fn get_by_guards(
        &self,
        guards: &[String],
        with_permissions: bool,
    ) -> PassportResult<Vec<Role>> {
        let tables = self.read("role.get_by_guards")?;
        Ok(guards
            .iter()
            .filter_map(|g| tables.role_by_guard(g))
            .map(|r| tables.hydrate_role(r, with_permissions))
            .collect())
    }

    async fn get_by_ids(
        &self,
        ids: &[RoleId],
        with_permissions: bool,
    ) -> PassportResult<Vec<Role>> {
        let tables = self.read("role.get_by_ids")?;
        Ok(ids
            .iter()
            .filter_map(|id| tables.roles.get(id))
            .map(|r| tables.hydrate_role(r, with_permissions))
            .collect())
    }

    async fn ids(&self, pager: Option<Pager>) -> PassportResult<(Vec<RoleId>, u64)> {
        let tables = self.read("role.ids")?;
        Ok(paginate(tables.roles.keys().copied().collect(), pager))
    }

    async fn ids_of_user(
        &self,
        user: UserId,
        pager: Option<Pager>,
    ) -> PassportResult<(Vec<RoleId>, u64)> {
        let tables = self.read("role.ids_of_user")?;
        let ids = tables
            .user_roles
            .iter()
            .filter(|(u, _)| *u == user)
            .map(|(_, r)| *r)
            .collect();
        Ok(paginate(ids, pager))
    }

    async fn first_or_create(&self, role: NewRole) -> PassportResult<Role> {
        let mut tables = self.write("role.first_or_create")?;
        if let Some(existing) = tables.role_by_guard(&role.guard_name) {
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let record = Role {
            id: RoleId::new(),
            name: role.name,
            guard_name: role.guard_name,
            description: role.description,
            permissions: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        tables.roles.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: RoleId, changes: RoleUpdate) -> PassportResult<Role> {
        let mut tables = self.write("role.update")?;
        let role = tables.roles.get_mut(&id).ok_or(PassportError::NotFound)?;
        if let Some(name) = changes.name {
            role.guard_name = guard(&name);
            role.name = name;
        }
        if let Some(description) = changes.description {
            role.description = description;
        }
        role.updated_at = Utc::now();
        Ok(role.clone())
    }

    async fn delete_cascading(&self, id: RoleId) -> PassportResult<()> {
        let mut tables = self.write("role.delete_cascading")?;
        if tables.roles.remove(&id).is_none() {
            return Err(PassportError::NotFound);
        }
        tables.role_permissions.retain(|(r, _)| *r != id);
        tables.user_roles.retain(|(_, r)| *r != id);
        Ok(())
    }

    async fn add_permissions(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> PassportResult<()> {
        let mut tables = self.write("role.add_permissions")?;
        for permission in permissions {
            tables.role_permissions.insert((role, *permission));
        }
        Ok(())
    }

    async fn replace_permissions(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> PassportResult<()> {
        let mut tables = self.write("role.replace_permissions")?;
        tables.role_permissions.retain(|(r, _)| *r != role);
        for permission in permissions {
            tables.role_permissions.insert((role, *permission));
        }
        Ok(())
    }

    async fn remove_permissions(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> PassportResult<()> {
        let mut tables = self.write("role.remove_permissions")?;
        for permission in permissions {
            tables.role_permissions.remove(&(role, *permission));
        }
        Ok(())
    }

    async fn clear_permissions(&self, role: RoleId) -> PassportResult<()> {
        let mut tables = self.write("role.clear_permissions")?;
        tables.role_permissions.retain(|(r, _)| *r != role);
        Ok(())
    }

    async fn count_has_permission(
        &self,
        roles: &[RoleId],
        permission: PermissionId,
    ) -> PassportResult<u64> {
        let tables = self.read("role.count_has_permission")?;
        Ok(tables
            .role_permissions
            .iter()
            .filter(|(r, p)| roles.contains(r) && *p == permission)
            .count() as u64)
    }

    async fn count_has_all_permissions(
        &self,
        roles: &[RoleId],
        permissions: &[PermissionId],
    ) -> PassportResult<u64> {
        let tables = self.read("role.count_has_all_permissions")?;
        Ok(tables
            .role_permissions
            .iter()
            .filter(|(r, p)| roles.contains(r) && permissions.contains(p))
            .count() as u64)
    }

    async fn count_has_any_permissions(
        &self,
        roles: &[RoleId],
        permissions: &[PermissionId],
    ) -> PassportResult<u64> {
        let tables = self.read("role.count_has_any_permissions")?;
        Ok(tables
            .role_permissions
            .iter()
            .filter(|(r, p)| roles.contains(r) && permissions.contains(p))
            .count() as u64)
    }
}

#[async_trait]
impl PermissionRepository for InMemoryStore {
    async fn get_by_guard(&self, guard: &str) -> PassportResult<Permission> {
        let tables = self.read("permission.get_by_guard")?;
        tables
            .permission_by_guard(guard)
            .cloned()
            .ok_or(PassportError::NotFound)
    }

    async fn get_by_id(&self, id: PermissionId) -> PassportResult<Permission> {
        let tables = self.read("permission.get_by_id")?;
        tables
            .permissions
            .get(&id)
            .cloned()
            .ok_or(PassportError::NotFound)
    }

    async fn get_by_guards(&self, guards: &[String]) -> PassportResult<Vec<Permission>> {
        let tables = self.read("permission.get_by_guards")?;
        Ok(guards
            .iter()
            .filter_map(|g| tables.permission_by_guard(g))
            .cloned()
            .collect())
    }

    async fn get_by_ids(&self, ids: &[PermissionId]) -> PassportResult<Vec<Permission>> {
        let tables = self.read("permission.get_by_ids")?;
        Ok(ids
            .iter()
            .filter_map(|id| tables.permissions.get(id))
            .cloned()
            .collect())
    }

    async fn ids(&self, pager: Option<Pager>) -> PassportResult<(Vec<PermissionId>, u64)> {
        let tables = self.read("permission.ids")?;
        Ok(paginate(tables.permissions.keys().copied().collect(), pager))
    }

    async fn direct_ids_of_user(
        &self,
        user: UserId,
        pager: Option<Pager>,
    ) -> PassportResult<(Vec<PermissionId>, u64)> {
        let tables = self.read("permission.direct_ids_of_user")?;
        let ids = tables
            .user_permissions
            .iter()
            .filter(|(u, _)| *u == user)
            .map(|(_, p)| *p)
            .collect();
        Ok(paginate(ids, pager))
    }

    async fn ids_of_roles(
        &self,
        roles: &[RoleId],
        pager: Option<Pager>,
    ) -> PassportResult<(Vec<PermissionId>, u64)> {
        let tables = self.read("permission.ids_of_roles")?;
        // Distinct: the same permission may be attached through several roles.
        let distinct: BTreeSet<PermissionId> = tables
            .role_permissions
            .iter()
            .filter(|(r, _)| roles.contains(r))
            .map(|(_, p)| *p)
            .collect();
        Ok(paginate(distinct.into_iter().collect(), pager))
    }

    async fn first_or_create(&self, permission: NewPermission) -> PassportResult<Permission> {
        let mut tables = self.write("permission.first_or_create")?;
        if let Some(existing) = tables.permission_by_guard(&permission.guard_name) {
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let record = Permission {
            id: PermissionId::new(),
            name: permission.name,
            guard_name: permission.guard_name,
            description: permission.description,
            created_at: now,
            updated_at: now,
        };
        tables.permissions.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        id: PermissionId,
        changes: PermissionUpdate,
    ) -> PassportResult<Permission> {
        let mut tables = self.write("permission.update")?;
        let permission = tables
            .permissions
            .get_mut(&id)
            .ok_or(PassportError::NotFound)?;
        if let Some(name) = changes.name {
            permission.guard_name = guard(&name);
            permission.name = name;
        }
        if let Some(description) = changes.description {
            permission.description = description;
        }
        permission.updated_at = Utc::now();
        Ok(permission.clone())
    }

    async fn delete_cascading(&self, id: PermissionId) -> PassportResult<()> {
        let mut tables = self.write("permission.delete_cascading")?;
        if tables.permissions.remove(&id).is_none() {
            return Err(PassportError::NotFound);
        }
        tables.role_permissions.retain(|(_, p)| *p != id);
        tables.user_permissions.retain(|(_, p)| *p != id);
        Ok(())
    }
}

#[async_trait]
impl UserGrantRepository for InMemoryStore {
    async fn add_roles(&self, user: UserId, roles: &[RoleId]) -> PassportResult<()> {
        let mut tables = self.write("grant.add_roles")?;
        for role in roles {
            tables.user_roles.insert((user, *role));
        }
        Ok(())
    }

    async fn replace_roles(&self, user: UserId, roles: &[RoleId]) -> PassportResult<()> {
        let mut tables = self.write("grant.replace_roles")?;
        tables.user_roles.retain(|(u, _)| *u != user);
        for role in roles {
            tables.user_roles.insert((user, *role));
        }
        Ok(())
    }

    async fn remove_roles(&self, user: UserId, roles: &[RoleId]) -> PassportResult<()> {
        let mut tables = self.write("grant.remove_roles")?;
        for role in roles {
            tables.user_roles.remove(&(user, *role));
        }
        Ok(())
    }

    async fn clear_roles(&self, user: UserId) -> PassportResult<()> {
        let mut tables = self.write("grant.clear_roles")?;
        tables.user_roles.retain(|(u, _)| *u != user);
        Ok(())
    }

    async fn add_permissions(
        &self,
        user: UserId,
        permissions: &[PermissionId],
    ) -> PassportResult<()> {
        let mut tables = self.write("grant.add_permissions")?;
        for permission in permissions {
            tables.user_permissions.insert((user, *permission));
        }
        Ok(())
    }

    async fn replace_permissions(
        &self,
        user: UserId,
        permissions: &[PermissionId],
    ) -> PassportResult<()> {
        let mut tables = self.write("grant.replace_permissions")?;
        tables.user_permissions.retain(|(u, _)| *u != user);
        for permission in permissions {
            tables.user_permissions.insert((user, *permission));
        }
        Ok(())
    }

    async fn remove_permissions(
        &self,
        user: UserId,
        permissions: &[PermissionId],
    ) -> PassportResult<()> {
        let mut tables = self.write("grant.remove_permissions")?;
        for permission in permissions {
            tables.user_permissions.remove(&(user, *permission));
        }
        Ok(())
    }

    async fn clear_permissions(&self, user: UserId) -> PassportResult<()> {
        let mut tables = self.write("grant.clear_permissions")?;
        tables.user_permissions.retain(|(u, _)| *u != user);
        Ok(())
    }

    async fn count_has_role(&self, user: UserId, role: RoleId) -> PassportResult<u64> {
        let tables = self.read("grant.count_has_role")?;
        Ok(u64::from(tables.user_roles.contains(&(user, role))))
    }

    async fn count_has_all_roles(&self, user: UserId, roles: &[RoleId]) -> PassportResult<u64> {
        let tables = self.read("grant.count_has_all_roles")?;
        // Count each held role once, even when the input repeats an id, so
        // the result matches a join-row count.
        let distinct: BTreeSet<RoleId> = roles.iter().copied().collect();
        Ok(distinct
            .iter()
            .filter(|r| tables.user_roles.contains(&(user, **r)))
            .count() as u64)
    }

    async fn count_has_any_roles(&self, user: UserId, roles: &[RoleId]) -> PassportResult<u64> {
        let tables = self.read("grant.count_has_any_roles")?;
        let distinct: BTreeSet<RoleId> = roles.iter().copied().collect();
        Ok(distinct
            .iter()
            .filter(|r| tables.user_roles.contains(&(user, **r)))
            .count() as u64)
    }

    async fn count_has_direct_permission(
        &self,
        user: UserId,
        permission: PermissionId,
    ) -> PassportResult<u64> {
        let tables = self.read("grant.count_has_direct_permission")?;
        Ok(u64::from(tables.user_permissions.contains(&(user, permission))))
    }

    async fn count_has_all_direct_permissions(
        &self,
        user: UserId,
        permissions: &[PermissionId],
    ) -> PassportResult<u64> {
        let tables = self.read("grant.count_has_all_direct_permissions")?;
        let distinct: BTreeSet<PermissionId> = permissions.iter().copied().collect();
        Ok(distinct
            .iter()
            .filter(|p| tables.user_permissions.contains(&(user, **p)))
            .count() as u64)
    }

    async fn count_has_any_direct_permissions(
        &self,
        user: UserId,
        permissions: &[PermissionId],
    ) -> PassportResult<u64> {
        let tables = self.read("grant.count_has_any_direct_permissions")?;
        let distinct: BTreeSet<PermissionId> = permissions.iter().copied().collect();
        Ok(distinct
            .iter()
            .filter(|p| tables.user_permissions.contains(&(user, **p)))
            .count() as u64)
    }
}
