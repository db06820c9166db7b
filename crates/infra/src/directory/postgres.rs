//! Postgres-backed directory implementing `PermissionStore` and `UserStore`.
//!
//! ## Query shape
//!
//! Association tables are read by id list (`WHERE x = ANY($1)`), so resolving
//! a user's permissions costs four round-trips however many roles they hold.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | PoolClosed / PoolTimedOut / Io / Tls | `Unavailable` |
//! | Database, RowNotFound, other | `Query` |
//! | Row with an unknown enum value or bad IP | `Corrupt` |

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use tracing::{info, instrument};

use cockpit_auth::{
    DataScope, Permission, PermissionKind, PermissionStore, Role, StoreError, User, UserStore,
};
use cockpit_core::{PermissionId, RoleId, UserId};

/// Schema applied by `ensure_schema`.
pub const SCHEMA: &str = include_str!("../../migrations/0001_auth.sql");

#[derive(Debug, Clone)]
pub struct PostgresDirectory {
    pool: Arc<PgPool>,
}

impl PostgresDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Connect and return a directory over a fresh pool.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the identity/RBAC tables if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    /// Make sure an enabled `ADMIN` role holding the wildcard permission exists
    /// and that `username` holds it. Creates the user with `password_hash`
    /// only when absent; an existing password is never overwritten.
    #[instrument(skip(self, password_hash), err)]
    pub async fn bootstrap_admin(&self, username: &str, password_hash: &str) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(r#"INSERT INTO "user" (username, password_hash) VALUES ($1, $2) ON CONFLICT (username) DO NOTHING"#)
            .bind(username)
            .bind(password_hash)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_admin_user", e))?;

        sqlx::query("INSERT INTO role (code, name) VALUES ('ADMIN', 'Administrator') ON CONFLICT (code) DO NOTHING")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_admin_role", e))?;

        sqlx::query(
            "INSERT INTO permission (code, name, type) VALUES ('*', 'All permissions', 'API') \
             ON CONFLICT (code) DO NOTHING",
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_wildcard_permission", e))?;

        sqlx::query(
            r#"
            INSERT INTO role_permission (role_id, permission_id)
            SELECT r.id, p.id FROM role r, permission p
            WHERE r.code = 'ADMIN' AND p.code = '*'
            ON CONFLICT DO NOTHING
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("grant_wildcard", e))?;

        sqlx::query(
            r#"
            INSERT INTO user_role (user_id, role_id)
            SELECT u.id, r.id FROM "user" u, role r
            WHERE u.username = $1 AND r.code = 'ADMIN'
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(username)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("assign_admin_role", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        info!(username, "admin account bootstrapped");
        Ok(())
    }
}

fn raw_ids<T: Copy + Into<i64>>(ids: &[T]) -> Vec<i64> {
    ids.iter().map(|id| (*id).into()).collect()
}

const PERMISSION_COLUMNS: &str =
    "id, code, name, type, path, method, parent_id, sort_order, enabled";
const ROLE_COLUMNS: &str = "id, code, name, enabled, data_scope";
const USER_COLUMNS: &str =
    r#"id, username, password_hash, email, phone, enabled, last_login_at, last_login_ip"#;

#[async_trait]
impl PermissionStore for PostgresDirectory {
    #[instrument(skip(self), err)]
    async fn all_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {PERMISSION_COLUMNS} FROM permission"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("all_permissions", e))?;
        rows.iter().map(permission_from_row).collect()
    }

    #[instrument(skip(self), fields(count = ids.len()), err)]
    async fn permissions_by_ids(&self, ids: &[PermissionId]) -> Result<Vec<Permission>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {PERMISSION_COLUMNS} FROM permission WHERE id = ANY($1)"))
            .bind(raw_ids(ids))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("permissions_by_ids", e))?;
        rows.iter().map(permission_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn permission_by_code(&self, code: &str) -> Result<Option<Permission>, StoreError> {
        let row = sqlx::query(&format!("SELECT {PERMISSION_COLUMNS} FROM permission WHERE code = $1"))
            .bind(code)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("permission_by_code", e))?;
        row.as_ref().map(permission_from_row).transpose()
    }

    #[instrument(skip(self), fields(count = ids.len()), err)]
    async fn roles_by_ids(&self, ids: &[RoleId]) -> Result<Vec<Role>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {ROLE_COLUMNS} FROM role WHERE id = ANY($1)"))
            .bind(raw_ids(ids))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("roles_by_ids", e))?;
        rows.iter().map(role_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn role_by_code(&self, code: &str) -> Result<Option<Role>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ROLE_COLUMNS} FROM role WHERE code = $1"))
            .bind(code)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("role_by_code", e))?;
        row.as_ref().map(role_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn role_ids_for_user(&self, user_id: UserId) -> Result<Vec<RoleId>, StoreError> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT role_id FROM user_role WHERE user_id = $1")
            .bind(user_id.get())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("role_ids_for_user", e))?;
        Ok(ids.into_iter().map(RoleId::new).collect())
    }

    #[instrument(skip(self), fields(count = role_ids.len()), err)]
    async fn permission_ids_for_roles(&self, role_ids: &[RoleId]) -> Result<Vec<PermissionId>, StoreError> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT DISTINCT permission_id FROM role_permission WHERE role_id = ANY($1)")
                .bind(raw_ids(role_ids))
                .fetch_all(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("permission_ids_for_roles", e))?;
        Ok(ids.into_iter().map(PermissionId::new).collect())
    }
}

#[async_trait]
impl UserStore for PostgresDirectory {
    #[instrument(skip(self), err)]
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!(r#"SELECT {USER_COLUMNS} FROM "user" WHERE username = $1"#))
            .bind(username)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_username", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_by_id(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!(r#"SELECT {USER_COLUMNS} FROM "user" WHERE id = $1"#))
            .bind(user_id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_id", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn record_login(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
        ip: Option<IpAddr>,
    ) -> Result<(), StoreError> {
        sqlx::query(r#"UPDATE "user" SET last_login_at = $2, last_login_ip = $3 WHERE id = $1"#)
            .bind(user_id.get())
            .bind(at)
            .bind(ip.map(|ip| ip.to_string()))
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("record_login", e))?;
        Ok(())
    }

    #[instrument(skip(self, password_hash), err)]
    async fn update_password_hash(&self, user_id: UserId, password_hash: &str) -> Result<(), StoreError> {
        let result =
            sqlx::query(r#"UPDATE "user" SET password_hash = $2, updated_at = NOW() WHERE id = $1"#)
                .bind(user_id.get())
                .bind(password_hash)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("update_password_hash", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Query(format!("user {user_id} not found")));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLx row types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct PermissionRow {
    id: i64,
    code: String,
    name: String,
    kind: String,
    path: Option<String>,
    method: Option<String>,
    parent_id: Option<i64>,
    sort_order: i32,
    enabled: bool,
}

impl<'r> FromRow<'r, PgRow> for PermissionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(PermissionRow {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            kind: row.try_get("type")?,
            path: row.try_get("path")?,
            method: row.try_get("method")?,
            parent_id: row.try_get("parent_id")?,
            sort_order: row.try_get("sort_order")?,
            enabled: row.try_get("enabled")?,
        })
    }
}

impl TryFrom<PermissionRow> for Permission {
    type Error = StoreError;

    fn try_from(row: PermissionRow) -> Result<Self, Self::Error> {
        let kind: PermissionKind = row
            .kind
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("permission {}: {e}", row.id)))?;
        Ok(Permission {
            id: PermissionId::new(row.id),
            code: row.code.into(),
            name: row.name,
            kind,
            path: row.path,
            method: row.method,
            parent_id: row.parent_id.map(PermissionId::new),
            sort_order: row.sort_order,
            enabled: row.enabled,
        })
    }
}

fn permission_from_row(row: &PgRow) -> Result<Permission, StoreError> {
    PermissionRow::from_row(row)
        .map_err(|e| StoreError::Corrupt(format!("failed to deserialize permission row: {e}")))?
        .try_into()
}

#[derive(Debug)]
struct RoleRow {
    id: i64,
    code: String,
    name: String,
    enabled: bool,
    data_scope: String,
}

impl<'r> FromRow<'r, PgRow> for RoleRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RoleRow {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            enabled: row.try_get("enabled")?,
            data_scope: row.try_get("data_scope")?,
        })
    }
}

impl TryFrom<RoleRow> for Role {
    type Error = StoreError;

    fn try_from(row: RoleRow) -> Result<Self, Self::Error> {
        let data_scope: DataScope = row
            .data_scope
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("role {}: {e}", row.id)))?;
        Ok(Role {
            id: RoleId::new(row.id),
            code: row.code.into(),
            name: row.name,
            enabled: row.enabled,
            data_scope,
        })
    }
}

fn role_from_row(row: &PgRow) -> Result<Role, StoreError> {
    RoleRow::from_row(row)
        .map_err(|e| StoreError::Corrupt(format!("failed to deserialize role row: {e}")))?
        .try_into()
}

#[derive(Debug)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: String,
    email: Option<String>,
    phone: Option<String>,
    enabled: bool,
    last_login_at: Option<DateTime<Utc>>,
    last_login_ip: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for UserRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserRow {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            enabled: row.try_get("enabled")?,
            last_login_at: row.try_get("last_login_at")?,
            last_login_ip: row.try_get("last_login_ip")?,
        })
    }
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let last_login_ip = row
            .last_login_ip
            .as_deref()
            .map(str::parse::<IpAddr>)
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("user {}: last_login_ip: {e}", row.id)))?;
        Ok(User {
            id: UserId::new(row.id),
            username: row.username,
            password_hash: row.password_hash,
            email: row.email,
            phone: row.phone,
            enabled: row.enabled,
            last_login_at: row.last_login_at,
            last_login_ip,
        })
    }
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    UserRow::from_row(row)
        .map_err(|e| StoreError::Corrupt(format!("failed to deserialize user row: {e}")))?
        .try_into()
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolClosed => StoreError::Unavailable(format!("connection pool closed in {operation}")),
        sqlx::Error::PoolTimedOut => StoreError::Unavailable(format!("connection pool timed out in {operation}")),
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("tls error in {operation}: {e}")),
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
            StoreError::Query(format!("database error in {operation} ({code}): {}", db_err.message()))
        }
        other => StoreError::Query(format!("sqlx error in {operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_permission_type_is_corrupt() {
        let row = PermissionRow {
            id: 4,
            code: "x".into(),
            name: "X".into(),
            kind: "WIDGET".into(),
            path: None,
            method: None,
            parent_id: None,
            sort_order: 0,
            enabled: true,
        };
        assert!(matches!(Permission::try_from(row), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn legacy_numeric_type_is_accepted() {
        let row = PermissionRow {
            id: 5,
            code: "dataset:read".into(),
            name: "Read datasets".into(),
            kind: "3".into(),
            path: Some("/api/datasets".into()),
            method: Some("GET".into()),
            parent_id: Some(1),
            sort_order: 2,
            enabled: true,
        };
        let p = Permission::try_from(row).unwrap();
        assert_eq!(p.kind, PermissionKind::Api);
        assert_eq!(p.parent_id, Some(PermissionId::new(1)));
    }

    #[test]
    fn user_ip_is_parsed() {
        let row = UserRow {
            id: 1,
            username: "alice".into(),
            password_hash: "h".into(),
            email: None,
            phone: None,
            enabled: true,
            last_login_at: None,
            last_login_ip: Some("192.168.0.4".into()),
        };
        let user = User::try_from(row).unwrap();
        assert_eq!(user.last_login_ip, Some("192.168.0.4".parse().unwrap()));
    }

    #[test]
    fn pool_errors_are_unavailable() {
        assert!(matches!(map_sqlx_error("op", sqlx::Error::PoolClosed), StoreError::Unavailable(_)));
        assert!(matches!(map_sqlx_error("op", sqlx::Error::RowNotFound), StoreError::Query(_)));
    }

    #[test]
    fn schema_declares_pair_uniqueness() {
        assert!(SCHEMA.contains("PRIMARY KEY (user_id, role_id)"));
        assert!(SCHEMA.contains("PRIMARY KEY (role_id, permission_id)"));
    }
}
