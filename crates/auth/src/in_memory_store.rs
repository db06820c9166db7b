//! In-memory directory (users, roles, permissions, associations) for tests/dev.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cockpit_core::{DomainError, DomainResult, PermissionId, RoleId, UserId};

use crate::store::{PermissionStore, StoreError, UserStore};
use crate::{Permission, Role, User};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    roles: BTreeMap<RoleId, Role>,
    permissions: BTreeMap<PermissionId, Permission>,
    user_roles: BTreeSet<(UserId, RoleId)>,
    role_permissions: BTreeSet<(RoleId, PermissionId)>,
}

/// Tenant-agnostic, lock-protected directory.
///
/// The seeding methods enforce the same uniqueness constraints as the SQL
/// schema (username, role code/name, permission code/name, association pairs)
/// and reject a `parent_id` that does not reference an existing permission.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    inner: RwLock<Tables>,
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("directory lock poisoned".to_string())
}

fn poisoned_domain() -> DomainError {
    DomainError::invariant("directory lock poisoned")
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: User) -> DomainResult<()> {
        let mut t = self.inner.write().map_err(|_| poisoned_domain())?;
        if t.users.values().any(|u| u.username == user.username && u.id != user.id) {
            return Err(DomainError::conflict(format!("username '{}' already exists", user.username)));
        }
        t.users.insert(user.id, user);
        Ok(())
    }

    pub fn insert_role(&self, role: Role) -> DomainResult<()> {
        let mut t = self.inner.write().map_err(|_| poisoned_domain())?;
        if t.roles.values().any(|r| r.id != role.id && (r.code == role.code || r.name == role.name)) {
            return Err(DomainError::conflict(format!("role '{}' already exists", role.code)));
        }
        t.roles.insert(role.id, role);
        Ok(())
    }

    pub fn insert_permission(&self, permission: Permission) -> DomainResult<()> {
        let mut t = self.inner.write().map_err(|_| poisoned_domain())?;
        if t.permissions.values().any(|p| {
            p.id != permission.id && (p.code == permission.code || p.name == permission.name)
        }) {
            return Err(DomainError::conflict(format!(
                "permission '{}' already exists",
                permission.code
            )));
        }
        if let Some(parent) = permission.parent_id {
            if parent != permission.id && !t.permissions.contains_key(&parent) {
                return Err(DomainError::invariant(format!(
                    "parent permission {parent} does not exist"
                )));
            }
        }
        t.permissions.insert(permission.id, permission);
        Ok(())
    }

    pub fn assign_role(&self, user_id: UserId, role_id: RoleId) -> DomainResult<()> {
        let mut t = self.inner.write().map_err(|_| poisoned_domain())?;
        if !t.users.contains_key(&user_id) {
            return Err(DomainError::invariant(format!("user {user_id} does not exist")));
        }
        if !t.roles.contains_key(&role_id) {
            return Err(DomainError::invariant(format!("role {role_id} does not exist")));
        }
        if !t.user_roles.insert((user_id, role_id)) {
            return Err(DomainError::conflict(format!(
                "user {user_id} already holds role {role_id}"
            )));
        }
        Ok(())
    }

    pub fn grant_permission(&self, role_id: RoleId, permission_id: PermissionId) -> DomainResult<()> {
        let mut t = self.inner.write().map_err(|_| poisoned_domain())?;
        if !t.roles.contains_key(&role_id) {
            return Err(DomainError::invariant(format!("role {role_id} does not exist")));
        }
        if !t.permissions.contains_key(&permission_id) {
            return Err(DomainError::invariant(format!(
                "permission {permission_id} does not exist"
            )));
        }
        if !t.role_permissions.insert((role_id, permission_id)) {
            return Err(DomainError::conflict(format!(
                "role {role_id} already grants permission {permission_id}"
            )));
        }
        Ok(())
    }

    pub fn set_permission_enabled(&self, permission_id: PermissionId, enabled: bool) -> DomainResult<()> {
        let mut t = self.inner.write().map_err(|_| poisoned_domain())?;
        let p = t
            .permissions
            .get_mut(&permission_id)
            .ok_or_else(|| DomainError::invariant(format!("permission {permission_id} does not exist")))?;
        p.enabled = enabled;
        Ok(())
    }

    pub fn set_user_enabled(&self, user_id: UserId, enabled: bool) -> DomainResult<()> {
        let mut t = self.inner.write().map_err(|_| poisoned_domain())?;
        let u = t
            .users
            .get_mut(&user_id)
            .ok_or_else(|| DomainError::invariant(format!("user {user_id} does not exist")))?;
        u.enabled = enabled;
        Ok(())
    }

    /// Snapshot of one user row (tests use this to observe login stamps).
    pub fn user(&self, user_id: UserId) -> Option<User> {
        self.inner.read().ok()?.users.get(&user_id).cloned()
    }
}

#[async_trait]
impl PermissionStore for InMemoryDirectory {
    async fn all_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        let t = self.inner.read().map_err(|_| poisoned())?;
        Ok(t.permissions.values().cloned().collect())
    }

    async fn permissions_by_ids(&self, ids: &[PermissionId]) -> Result<Vec<Permission>, StoreError> {
        let t = self.inner.read().map_err(|_| poisoned())?;
        Ok(ids.iter().filter_map(|id| t.permissions.get(id).cloned()).collect())
    }

    async fn permission_by_code(&self, code: &str) -> Result<Option<Permission>, StoreError> {
        let t = self.inner.read().map_err(|_| poisoned())?;
        Ok(t.permissions.values().find(|p| p.code.as_str() == code).cloned())
    }

    async fn roles_by_ids(&self, ids: &[RoleId]) -> Result<Vec<Role>, StoreError> {
        let t = self.inner.read().map_err(|_| poisoned())?;
        Ok(ids.iter().filter_map(|id| t.roles.get(id).cloned()).collect())
    }

    async fn role_by_code(&self, code: &str) -> Result<Option<Role>, StoreError> {
        let t = self.inner.read().map_err(|_| poisoned())?;
        Ok(t.roles.values().find(|r| r.code.as_str() == code).cloned())
    }

    async fn role_ids_for_user(&self, user_id: UserId) -> Result<Vec<RoleId>, StoreError> {
        let t = self.inner.read().map_err(|_| poisoned())?;
        Ok(t
            .user_roles
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, r)| *r)
            .collect())
    }

    async fn permission_ids_for_roles(&self, role_ids: &[RoleId]) -> Result<Vec<PermissionId>, StoreError> {
        let t = self.inner.read().map_err(|_| poisoned())?;
        Ok(t
            .role_permissions
            .iter()
            .filter(|(r, _)| role_ids.contains(r))
            .map(|(_, p)| *p)
            .collect())
    }
}

#[async_trait]
impl UserStore for InMemoryDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let t = self.inner.read().map_err(|_| poisoned())?;
        Ok(t.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        let t = self.inner.read().map_err(|_| poisoned())?;
        Ok(t.users.get(&user_id).cloned())
    }

    async fn record_login(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
        ip: Option<IpAddr>,
    ) -> Result<(), StoreError> {
        let mut t = self.inner.write().map_err(|_| poisoned())?;
        let user = t
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::Query(format!("user {user_id} not found")))?;
        user.last_login_at = Some(at);
        user.last_login_ip = ip;
        Ok(())
    }

    async fn update_password_hash(&self, user_id: UserId, password_hash: &str) -> Result<(), StoreError> {
        let mut t = self.inner.write().map_err(|_| poisoned())?;
        let user = t
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::Query(format!("user {user_id} not found")))?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }
}
