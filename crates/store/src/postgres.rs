//! Postgres-backed repository implementation.
//!
//! Uses a SQLx connection pool; every multi-table mutation (replace paths,
//! cascading deletes) runs inside one transaction so partial failure rolls
//! back without orphaned join rows.
//!
//! ## Error mapping
//!
//! `sqlx::Error::RowNotFound` becomes `PassportError::NotFound`; every other
//! SQLx error becomes `PassportError::Store` carrying the operation name.
//! The store performs no retries.
//!
//! ## Pagination consistency
//!
//! Paged id lookups issue two statements (count, then page) without a shared
//! transaction, matching the contract's accepted weak-consistency window.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use passport_core::{
    NewPermission, NewRole, Pager, PassportError, PassportResult, Permission, PermissionId,
    PermissionUpdate, Role, RoleId, RoleUpdate, UserId, guard,
};
use passport_engine::{PermissionRepository, RoleRepository, UserGrantRepository};

/// Idempotent schema bootstrap for the five tables.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        id          UUID PRIMARY KEY,
        name        TEXT NOT NULL UNIQUE,
        guard_name  TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT '',
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS permissions (
        id          UUID PRIMARY KEY,
        name        TEXT NOT NULL,
        guard_name  TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT '',
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS role_permissions (
        role_id       UUID NOT NULL,
        permission_id UUID NOT NULL,
        PRIMARY KEY (role_id, permission_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_roles (
        user_id UUID NOT NULL,
        role_id UUID NOT NULL,
        PRIMARY KEY (user_id, role_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_permissions (
        user_id       UUID NOT NULL,
        permission_id UUID NOT NULL,
        PRIMARY KEY (user_id, permission_id)
    )
    "#,
];

const RECORD_COLUMNS: &str = "id, name, guard_name, description, created_at, updated_at";

/// Postgres store implementing all three repository contracts.
///
/// Cloneable; all clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the grant tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> PassportResult<()> {
        for ddl in SCHEMA {
            sqlx::query(ddl)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }

    /// Attach permissions to each role in place (one batch query).
    async fn hydrate_role_permissions(
        &self,
        operation: &str,
        roles: &mut [Role],
    ) -> PassportResult<()> {
        if roles.is_empty() {
            return Ok(());
        }
        let role_ids: Vec<Uuid> = roles.iter().map(|r| *r.id.as_uuid()).collect();
        let rows = sqlx::query(
            "SELECT rp.role_id, p.id, p.name, p.guard_name, p.description, p.created_at, p.updated_at \
             FROM role_permissions rp \
             JOIN permissions p ON p.id = rp.permission_id \
             WHERE rp.role_id = ANY($1) \
             ORDER BY p.id",
        )
        .bind(role_ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(operation, e))?;

        for row in rows {
            let owner: Uuid = row.try_get("role_id").map_err(|e| map_sqlx_error(operation, e))?;
            let permission = permission_from_row(&row).map_err(|e| map_sqlx_error(operation, e))?;
            if let Some(role) = roles.iter_mut().find(|r| *r.id.as_uuid() == owner) {
                role.permissions.push(permission);
            }
        }
        Ok(())
    }

    async fn fetch_id_page(
        &self,
        operation: &str,
        count_sql: &str,
        page_sql: &str,
        key: Option<Uuid>,
        keys: Option<Vec<Uuid>>,
        pager: Option<Pager>,
    ) -> PassportResult<(Vec<Uuid>, u64)> {
        let mut count_query = sqlx::query_scalar::<_, i64>(count_sql);
        let mut page_query = sqlx::query_scalar::<_, Uuid>(page_sql);
        if let Some(key) = key {
            count_query = count_query.bind(key);
            page_query = page_query.bind(key);
        }
        if let Some(keys) = keys {
            count_query = count_query.bind(keys.clone());
            page_query = page_query.bind(keys);
        }
        if let Some(p) = pager {
            page_query = page_query.bind(p.limit() as i64).bind(p.offset() as i64);
        }

        let total = count_query
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        let ids = page_query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok((ids, total as u64))
    }
}

fn map_sqlx_error(operation: &str, error: sqlx::Error) -> PassportError {
    match error {
        sqlx::Error::RowNotFound => PassportError::NotFound,
        other => PassportError::store(operation, other),
    }
}

fn role_from_row(row: &PgRow) -> Result<Role, sqlx::Error> {
    Ok(Role {
        id: RoleId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        guard_name: row.try_get("guard_name")?,
        description: row.try_get("description")?,
        permissions: Vec::new(),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn permission_from_row(row: &PgRow) -> Result<Permission, sqlx::Error> {
    Ok(Permission {
        id: PermissionId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        guard_name: row.try_get("guard_name")?,
        description: row.try_get("description")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn role_uuids(ids: &[RoleId]) -> Vec<Uuid> {
    ids.iter().map(|id| *id.as_uuid()).collect()
}

fn permission_uuids(ids: &[PermissionId]) -> Vec<Uuid> {
    ids.iter().map(|id| *id.as_uuid()).collect()
}

#[async_trait]
impl RoleRepository for PostgresStore {
    async fn get_by_guard(&self, guard: &str, with_permissions: bool) -> PassportResult<Role> {
        const OP: &str = "role.get_by_guard";
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM roles WHERE guard_name = $1"
        ))
        .bind(guard)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;
        let mut roles = vec![role_from_row(&row).map_err(|e| map_sqlx_error(OP, e))?];
        if with_permissions {
            self.hydrate_role_permissions(OP, &mut roles).await?;
        }
        Ok(roles.remove(0))
    }

    async fn get_by_id(&self, id: RoleId, with_permissions: bool) -> PassportResult<Role> {
        const OP: &str = "role.get_by_id";
        let row = sqlx::query(&format!("SELECT {RECORD_COLUMNS} FROM roles WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;
        let mut roles = vec![role_from_row(&row).map_err(|e| map_sqlx_error(OP, e))?];
        if with_permissions {
            self.hydrate_role_permissions(OP, &mut roles).await?;
        }
        Ok(roles.remove(0))
    }

    async fn get_by_guards(
        &self,
        guards: &[String],
        with_permissions: bool,
    ) -> PassportResult<Vec<Role>> {
        const OP: &str = "role.get_by_guards";
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM roles WHERE guard_name = ANY($1) ORDER BY id"
        ))
        .bind(guards.to_vec())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;
        let mut roles = rows
            .iter()
            .map(role_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error(OP, e))?;
        if with_permissions {
            self.hydrate_role_permissions(OP, &mut roles).await?;
        }
        Ok(roles)
    }

    async fn get_by_ids(
        &self,
        ids: &[RoleId],
        with_permissions: bool,
    ) -> PassportResult<Vec<Role>> {
        const OP: &str = "role.get_by_ids";
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM roles WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(role_uuids(ids))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;
        let mut roles = rows
            .iter()
            .map(role_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error(OP, e))?;
        if with_permissions {
            self.hydrate_role_permissions(OP, &mut roles).await?;
        }
        Ok(roles)
    }

    async fn ids(&self, pager: Option<Pager>) -> PassportResult<(Vec<RoleId>, u64)> {
        let page_sql = match pager {
            Some(_) => "SELECT id FROM roles ORDER BY id LIMIT $1 OFFSET $2",
            None => "SELECT id FROM roles ORDER BY id",
        };
        let (ids, total) = self
            .fetch_id_page(
                "role.ids",
                "SELECT COUNT(*) FROM roles",
                page_sql,
                None,
                None,
                pager,
            )
            .await?;
        Ok((ids.into_iter().map(RoleId::from_uuid).collect(), total))
    }

    async fn ids_of_user(
        &self,
        user: UserId,
        pager: Option<Pager>,
    ) -> PassportResult<(Vec<RoleId>, u64)> {
        let page_sql = match pager {
            Some(_) => {
                "SELECT role_id FROM user_roles WHERE user_id = $1 ORDER BY role_id LIMIT $2 OFFSET $3"
            }
            None => "SELECT role_id FROM user_roles WHERE user_id = $1 ORDER BY role_id",
        };
        let (ids, total) = self
            .fetch_id_page(
                "role.ids_of_user",
                "SELECT COUNT(*) FROM user_roles WHERE user_id = $1",
                page_sql,
                Some(*user.as_uuid()),
                None,
                pager,
            )
            .await?;
        Ok((ids.into_iter().map(RoleId::from_uuid).collect(), total))
    }

    #[instrument(skip(self), fields(guard = %role.guard_name), err)]
    async fn first_or_create(&self, role: NewRole) -> PassportResult<Role> {
        const OP: &str = "role.first_or_create";
        sqlx::query(
            "INSERT INTO roles (id, name, guard_name, description) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (guard_name) DO NOTHING",
        )
        .bind(RoleId::new().as_uuid())
        .bind(&role.name)
        .bind(&role.guard_name)
        .bind(&role.description)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;

        RoleRepository::get_by_guard(self, &role.guard_name, false).await
    }

    async fn update(&self, id: RoleId, changes: RoleUpdate) -> PassportResult<Role> {
        const OP: &str = "role.update";
        let guard_name = changes.name.as_deref().map(guard);
        let row = sqlx::query(&format!(
            "UPDATE roles SET \
                 name = COALESCE($2, name), \
                 guard_name = COALESCE($3, guard_name), \
                 description = COALESCE($4, description), \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING {RECORD_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(changes.name)
        .bind(guard_name)
        .bind(changes.description)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;
        role_from_row(&row).map_err(|e| map_sqlx_error(OP, e))
    }

    #[instrument(skip(self), fields(role = %id), err)]
    async fn delete_cascading(&self, id: RoleId) -> PassportResult<()> {
        const OP: &str = "role.delete_cascading";
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error(OP, e))?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;
        sqlx::query("DELETE FROM user_roles WHERE role_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;
        let deleted = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;
        if deleted.rows_affected() == 0 {
            // Rolls back on drop.
            return Err(PassportError::NotFound);
        }

        tx.commit().await.map_err(|e| map_sqlx_error(OP, e))
    }

    async fn add_permissions(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> PassportResult<()> {
        const OP: &str = "role.add_permissions";
        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_id) \
             SELECT $1, p FROM UNNEST($2::uuid[]) AS p \
             ON CONFLICT DO NOTHING",
        )
        .bind(role.as_uuid())
        .bind(permission_uuids(permissions))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;
        Ok(())
    }

    #[instrument(skip(self, permissions), fields(role = %role, count = permissions.len()), err)]
    async fn replace_permissions(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> PassportResult<()> {
        const OP: &str = "role.replace_permissions";
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error(OP, e))?;
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;
        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_id) \
             SELECT $1, p FROM UNNEST($2::uuid[]) AS p \
             ON CONFLICT DO NOTHING",
        )
        .bind(role.as_uuid())
        .bind(permission_uuids(permissions))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;
        tx.commit().await.map_err(|e| map_sqlx_error(OP, e))
    }

    async fn remove_permissions(
        &self,
        role: RoleId,
        permissions: &[PermissionId],
    ) -> PassportResult<()> {
        const OP: &str = "role.remove_permissions";
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = ANY($2)")
            .bind(role.as_uuid())
            .bind(permission_uuids(permissions))
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;
        Ok(())
    }

    async fn clear_permissions(&self, role: RoleId) -> PassportResult<()> {
        const OP: &str = "role.clear_permissions";
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;
        Ok(())
    }

    async fn count_has_permission(
        &self,
        roles: &[RoleId],
        permission: PermissionId,
    ) -> PassportResult<u64> {
        const OP: &str = "role.count_has_permission";
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM role_permissions WHERE role_id = ANY($1) AND permission_id = $2",
        )
        .bind(role_uuids(roles))
        .bind(permission.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;
        Ok(count as u64)
    }

    async fn count_has_all_permissions(
        &self,
        roles: &[RoleId],
        permissions: &[PermissionId],
    ) -> PassportResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM role_permissions WHERE role_id = ANY($1) AND permission_id = ANY($2)",
        )
        .bind(role_uuids(roles))
        .bind(permission_uuids(permissions))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("role.count_has_all_permissions", e))?;
        Ok(count as u64)
    }

    async fn count_has_any_permissions(
        &self,
        roles: &[RoleId],
        permissions: &[PermissionId],
    ) -> PassportResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM role_permissions WHERE role_id = ANY($1) AND permission_id = ANY($2)",
        )
        .bind(role_uuids(roles))
        .bind(permission_uuids(permissions))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("role.count_has_any_permissions", e))?;
        Ok(count as u64)
    }
}

#[async_trait]
impl PermissionRepository for PostgresStore {
    async fn get_by_guard(&self, guard: &str) -> PassportResult<Permission> {
        const OP: &str = "permission.get_by_guard";
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM permissions WHERE guard_name = $1"
        ))
        .bind(guard)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;
        permission_from_row(&row).map_err(|e| map_sqlx_error(OP, e))
    }

    async fn get_by_id(&self, id: PermissionId) -> PassportResult<Permission> {
        const OP: &str = "permission.get_by_id";
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM permissions WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;
        permission_from_row(&row).map_err(|e| map_sqlx_error(OP, e))
    }

    async fn get_by_guards(&self, guards: &[String]) -> PassportResult<Vec<Permission>> {
        const OP: &str = "permission.get_by_guards";
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM permissions WHERE guard_name = ANY($1) ORDER BY id"
        ))
        .bind(guards.to_vec())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;
        rows.iter()
            .map(permission_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error(OP, e))
    }

    async fn get_by_ids(&self, ids: &[PermissionId]) -> PassportResult<Vec<Permission>> {
        const OP: &str = "permission.get_by_ids";
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM permissions WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(permission_uuids(ids))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;
        rows.iter()
            .map(permission_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error(OP, e))
    }

    async fn ids(&self, pager: Option<Pager>) -> PassportResult<(Vec<PermissionId>, u64)> {
        let page_sql = match pager {
            Some(_) => "SELECT id FROM permissions ORDER BY id LIMIT $1 OFFSET $2",
            None => "SELECT id FROM permissions ORDER BY id",
        };
        let (ids, total) = self
            .fetch_id_page(
                "permission.ids",
                "SELECT COUNT(*) FROM permissions",
                page_sql,
                None,
                None,
                pager,
            )
            .await?;
        Ok((ids.into_iter().map(PermissionId::from_uuid).collect(), total))
    }

    async fn direct_ids_of_user(
        &self,
        user: UserId,
        pager: Option<Pager>,
    ) -> PassportResult<(Vec<PermissionId>, u64)> {
        let page_sql = match pager {
            Some(_) => {
                "SELECT permission_id FROM user_permissions WHERE user_id = $1 \
                 ORDER BY permission_id LIMIT $2 OFFSET $3"
            }
            None => {
                "SELECT permission_id FROM user_permissions WHERE user_id = $1 ORDER BY permission_id"
            }
        };
        let (ids, total) = self
            .fetch_id_page(
                "permission.direct_ids_of_user",
                "SELECT COUNT(*) FROM user_permissions WHERE user_id = $1",
                page_sql,
                Some(*user.as_uuid()),
                None,
                pager,
            )
            .await?;
        Ok((ids.into_iter().map(PermissionId::from_uuid).collect(), total))
    }

    async fn ids_of_roles(
        &self,
        roles: &[RoleId],
        pager: Option<Pager>,
    ) -> PassportResult<(Vec<PermissionId>, u64)> {
        let page_sql = match pager {
            Some(_) => {
                "SELECT DISTINCT permission_id FROM role_permissions WHERE role_id = ANY($1) \
                 ORDER BY permission_id LIMIT $2 OFFSET $3"
            }
            None => {
                "SELECT DISTINCT permission_id FROM role_permissions WHERE role_id = ANY($1) \
                 ORDER BY permission_id"
            }
        };
        let (ids, total) = self
            .fetch_id_page(
                "permission.ids_of_roles",
                "SELECT COUNT(DISTINCT permission_id) FROM role_permissions WHERE role_id = ANY($1)",
                page_sql,
                None,
                Some(role_uuids(roles)),
                pager,
            )
            .await?;
        Ok((ids.into_iter().map(PermissionId::from_uuid).collect(), total))
    }

    #[instrument(skip(self), fields(guard = %permission.guard_name), err)]
    async fn first_or_create(&self, permission: NewPermission) -> PassportResult<Permission> {
        const OP: &str = "permission.first_or_create";
        sqlx::query(
            "INSERT INTO permissions (id, name, guard_name, description) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (guard_name) DO NOTHING",
        )
        .bind(PermissionId::new().as_uuid())
        .bind(&permission.name)
        .bind(&permission.guard_name)
        .bind(&permission.description)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;

        PermissionRepository::get_by_guard(self, &permission.guard_name).await
    }

    async fn update(
        &self,
        id: PermissionId,
        changes: PermissionUpdate,
    ) -> PassportResult<Permission> {
        const OP: &str = "permission.update";
        let guard_name = changes.name.as_deref().map(guard);
        let row = sqlx::query(&format!(
            "UPDATE permissions SET \
                 name = COALESCE($2, name), \
                 guard_name = COALESCE($3, guard_name), \
                 description = COALESCE($4, description), \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING {RECORD_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(changes.name)
        .bind(guard_name)
        .bind(changes.description)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;
        permission_from_row(&row).map_err(|e| map_sqlx_error(OP, e))
    }

    #[instrument(skip(self), fields(permission = %id), err)]
    async fn delete_cascading(&self, id: PermissionId) -> PassportResult<()> {
        const OP: &str = "permission.delete_cascading";
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error(OP, e))?;

        sqlx::query("DELETE FROM role_permissions WHERE permission_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;
        sqlx::query("DELETE FROM user_permissions WHERE permission_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;
        let deleted = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;
        if deleted.rows_affected() == 0 {
            return Err(PassportError::NotFound);
        }

        tx.commit().await.map_err(|e| map_sqlx_error(OP, e))
    }
}

#[async_trait]
impl UserGrantRepository for PostgresStore {
    async fn add_roles(&self, user: UserId, roles: &[RoleId]) -> PassportResult<()> {
        const OP: &str = "grant.add_roles";
        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) \
             SELECT $1, r FROM UNNEST($2::uuid[]) AS r \
             ON CONFLICT DO NOTHING",
        )
        .bind(user.as_uuid())
        .bind(role_uuids(roles))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;
        Ok(())
    }

    #[instrument(skip(self, roles), fields(user = %user, count = roles.len()), err)]
    async fn replace_roles(&self, user: UserId, roles: &[RoleId]) -> PassportResult<()> {
        const OP: &str = "grant.replace_roles";
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error(OP, e))?;
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;
        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) \
             SELECT $1, r FROM UNNEST($2::uuid[]) AS r \
             ON CONFLICT DO NOTHING",
        )
        .bind(user.as_uuid())
        .bind(role_uuids(roles))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;
        tx.commit().await.map_err(|e| map_sqlx_error(OP, e))
    }

    async fn remove_roles(&self, user: UserId, roles: &[RoleId]) -> PassportResult<()> {
        const OP: &str = "grant.remove_roles";
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = ANY($2)")
            .bind(user.as_uuid())
            .bind(role_uuids(roles))
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;
        Ok(())
    }

    async fn clear_roles(&self, user: UserId) -> PassportResult<()> {
        const OP: &str = "grant.clear_roles";
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;
        Ok(())
    }

    async fn add_permissions(
        &self,
        user: UserId,
        permissions: &[PermissionId],
    ) -> PassportResult<()> {
        const OP: &str = "grant.add_permissions";
        sqlx::query(
            "INSERT INTO user_permissions (user_id, permission_id) \
             SELECT $1, p FROM UNNEST($2::uuid[]) AS p \
             ON CONFLICT DO NOTHING",
        )
        .bind(user.as_uuid())
        .bind(permission_uuids(permissions))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;
        Ok(())
    }

    #[instrument(skip(self, permissions), fields(user = %user, count = permissions.len()), err)]
    async fn replace_permissions(
        &self,
        user: UserId,
        permissions: &[PermissionId],
    ) -> PassportResult<()> {
        const OP: &str = "grant.replace_permissions";
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error(OP, e))?;
        sqlx::query("DELETE FROM user_permissions WHERE user_id = $1")
            .bind(user.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;
        sqlx::query(
            "INSERT INTO user_permissions (user_id, permission_id) \
             SELECT $1, p FROM UNNEST($2::uuid[]) AS p \
             ON CONFLICT DO NOTHING",
        )
        .bind(user.as_uuid())
        .bind(permission_uuids(permissions))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(OP, e))?;
        tx.commit().await.map_err(|e| map_sqlx_error(OP, e))
    }

    async fn remove_permissions(
        &self,
        user: UserId,
        permissions: &[PermissionId],
    ) -> PassportResult<()> {
        const OP: &str = "grant.remove_permissions";
        sqlx::query("DELETE FROM user_permissions WHERE user_id = $1 AND permission_id = ANY($2)")
            .bind(user.as_uuid())
            .bind(permission_uuids(permissions))
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;
        Ok(())
    }

    async fn clear_permissions(&self, user: UserId) -> PassportResult<()> {
        const OP: &str = "grant.clear_permissions";
        sqlx::query("DELETE FROM user_permissions WHERE user_id = $1")
            .bind(user.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(OP, e))?;
        Ok(())
    }

    async fn count_has_role(&self, user: UserId, role: RoleId) -> PassportResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_roles WHERE user_id = $1 AND role_id = $2",
        )
        .bind(user.as_uuid())
        .bind(role.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("grant.count_has_role", e))?;
        Ok(count as u64)
    }

    async fn count_has_all_roles(&self, user: UserId, roles: &[RoleId]) -> PassportResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_roles WHERE user_id = $1 AND role_id = ANY($2)",
        )
        .bind(user.as_uuid())
        .bind(role_uuids(roles))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("grant.count_has_all_roles", e))?;
        Ok(count as u64)
    }

    async fn count_has_any_roles(&self, user: UserId, roles: &[RoleId]) -> PassportResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_roles WHERE user_id = $1 AND role_id = ANY($2)",
        )
        .bind(user.as_uuid())
        .bind(role_uuids(roles))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("grant.count_has_any_roles", e))?;
        Ok(count as u64)
    }

    async fn count_has_direct_permission(
        &self,
        user: UserId,
        permission: PermissionId,
    ) -> PassportResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_permissions WHERE user_id = $1 AND permission_id = $2",
        )
        .bind(user.as_uuid())
        .bind(permission.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("grant.count_has_direct_permission", e))?;
        Ok(count as u64)
    }

    async fn count_has_all_direct_permissions(
        &self,
        user: UserId,
        permissions: &[PermissionId],
    ) -> PassportResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_permissions WHERE user_id = $1 AND permission_id = ANY($2)",
        )
        .bind(user.as_uuid())
        .bind(permission_uuids(permissions))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("grant.count_has_all_direct_permissions", e))?;
        Ok(count as u64)
    }

    async fn count_has_any_direct_permissions(
        &self,
        user: UserId,
        permissions: &[PermissionId],
    ) -> PassportResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_permissions WHERE user_id = $1 AND permission_id = ANY($2)",
        )
        .bind(user.as_uuid())
        .bind(permission_uuids(permissions))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("grant.count_has_any_direct_permissions", e))?;
        Ok(count as u64)
    }
}
