//! Read seams onto the persistence collaborator.
//!
//! The core never owns identity or RBAC rows. It reads them through these
//! traits, which production wires to Postgres (`cockpit-infra`) and tests wire
//! to `InMemoryDirectory`. Association tables are queried by id list so a
//! resolution costs a fixed number of round-trips regardless of role count.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use cockpit_core::{PermissionId, RoleId, UserId};

use crate::{Permission, Role, User};

/// Persistence failure surfaced through a store seam.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store query failed: {0}")]
    Query(String),

    #[error("stored row is invalid: {0}")]
    Corrupt(String),
}

/// Read-only access to the permission catalog and the association tables.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// The full flat catalog, any order.
    async fn all_permissions(&self) -> Result<Vec<Permission>, StoreError>;

    /// Permissions with the given ids. Unknown ids are skipped.
    async fn permissions_by_ids(&self, ids: &[PermissionId]) -> Result<Vec<Permission>, StoreError>;

    async fn permission_by_code(&self, code: &str) -> Result<Option<Permission>, StoreError>;

    /// Roles with the given ids. Unknown ids are skipped.
    async fn roles_by_ids(&self, ids: &[RoleId]) -> Result<Vec<Role>, StoreError>;

    async fn role_by_code(&self, code: &str) -> Result<Option<Role>, StoreError>;

    /// `user_role` rows for one user.
    async fn role_ids_for_user(&self, user_id: UserId) -> Result<Vec<RoleId>, StoreError>;

    /// `role_permission` rows for a set of roles, in one query.
    async fn permission_ids_for_roles(&self, role_ids: &[RoleId]) -> Result<Vec<PermissionId>, StoreError>;
}

/// Credential lookups plus the two writes the core is allowed to make.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<User>, StoreError>;

    async fn record_login(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
        ip: Option<IpAddr>,
    ) -> Result<(), StoreError>;

    async fn update_password_hash(&self, user_id: UserId, password_hash: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> PermissionStore for Arc<S>
where
    S: PermissionStore + ?Sized,
{
    async fn all_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        (**self).all_permissions().await
    }

    async fn permissions_by_ids(&self, ids: &[PermissionId]) -> Result<Vec<Permission>, StoreError> {
        (**self).permissions_by_ids(ids).await
    }

    async fn permission_by_code(&self, code: &str) -> Result<Option<Permission>, StoreError> {
        (**self).permission_by_code(code).await
    }

    async fn roles_by_ids(&self, ids: &[RoleId]) -> Result<Vec<Role>, StoreError> {
        (**self).roles_by_ids(ids).await
    }

    async fn role_by_code(&self, code: &str) -> Result<Option<Role>, StoreError> {
        (**self).role_by_code(code).await
    }

    async fn role_ids_for_user(&self, user_id: UserId) -> Result<Vec<RoleId>, StoreError> {
        (**self).role_ids_for_user(user_id).await
    }

    async fn permission_ids_for_roles(&self, role_ids: &[RoleId]) -> Result<Vec<PermissionId>, StoreError> {
        (**self).permission_ids_for_roles(role_ids).await
    }
}

#[async_trait]
impl<S> UserStore for Arc<S>
where
    S: UserStore + ?Sized,
{
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        (**self).find_by_username(username).await
    }

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        (**self).find_by_id(user_id).await
    }

    async fn record_login(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
        ip: Option<IpAddr>,
    ) -> Result<(), StoreError> {
        (**self).record_login(user_id, at, ip).await
    }

    async fn update_password_hash(&self, user_id: UserId, password_hash: &str) -> Result<(), StoreError> {
        (**self).update_password_hash(user_id, password_hash).await
    }
}
