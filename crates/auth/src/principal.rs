use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use cockpit_core::UserId;

use crate::{DataScope, PermissionCode, RoleCode, User};

/// An authenticated identity plus its resolved authorization data.
///
/// `roles` and `permissions` are sets: a permission reachable through several
/// roles appears once. Ordered sets keep serialized output deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub roles: BTreeSet<RoleCode>,
    pub permissions: BTreeSet<PermissionCode>,
    pub data_scope: DataScope,
}

impl Principal {
    pub fn from_user(
        user: &User,
        roles: BTreeSet<RoleCode>,
        permissions: BTreeSet<PermissionCode>,
        data_scope: DataScope,
    ) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            roles,
            permissions,
            data_scope,
        }
    }

    /// The capability set, including the wildcard check.
    pub fn has_permission(&self, code: &str) -> bool {
        self.permissions.contains(&PermissionCode::WILDCARD) || self.permissions.contains(code)
    }

    pub fn has_role(&self, code: &str) -> bool {
        self.roles.contains(code)
    }

    pub fn role_codes(&self) -> Vec<RoleCode> {
        self.roles.iter().cloned().collect()
    }
}
