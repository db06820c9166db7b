//! Identity and RBAC records as read from the persistence collaborator.
//!
//! These are plain data: the core never creates or mutates them (except the
//! last-login stamp and password hash, which go back through `UserStore`).

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cockpit_core::{PermissionId, RoleId, UserId};

use crate::{PermissionCode, RoleCode};

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

/// A user account.
///
/// `password_hash` is a PHC string (Argon2id); it is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub enabled: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<IpAddr>,
}

impl User {
    pub fn new(id: UserId, username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            password_hash: password_hash.into(),
            email: None,
            phone: None,
            enabled: true,
            last_login_at: None,
            last_login_ip: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Role
// ─────────────────────────────────────────────────────────────────────────────

/// Row-visibility scope granted by a role.
///
/// Variants are declared narrowest first so `Ord` ranks `All` as the
/// broadest; a principal's effective scope is the maximum over its roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataScope {
    #[serde(rename = "SELF")]
    OwnOnly,
    Department,
    #[default]
    All,
}

impl DataScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataScope::OwnOnly => "SELF",
            DataScope::Department => "DEPARTMENT",
            DataScope::All => "ALL",
        }
    }
}

impl core::str::FromStr for DataScope {
    type Err = cockpit_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALL" => Ok(DataScope::All),
            "DEPARTMENT" | "DEPT" => Ok(DataScope::Department),
            "SELF" => Ok(DataScope::OwnOnly),
            other => Err(cockpit_core::DomainError::validation(format!(
                "unknown data scope '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub code: RoleCode,
    pub name: String,
    pub enabled: bool,
    pub data_scope: DataScope,
}

impl Role {
    pub fn new(id: RoleId, code: impl Into<RoleCode>, name: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
            name: name.into(),
            enabled: true,
            data_scope: DataScope::All,
        }
    }

    pub fn with_data_scope(mut self, data_scope: DataScope) -> Self {
        self.data_scope = data_scope;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Permission
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionKind {
    Menu,
    Button,
    Api,
}

impl PermissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionKind::Menu => "MENU",
            PermissionKind::Button => "BUTTON",
            PermissionKind::Api => "API",
        }
    }
}

impl core::str::FromStr for PermissionKind {
    type Err = cockpit_core::DomainError;

    /// Accepts both the symbolic names and the legacy numeric codes (1/2/3).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MENU" | "1" => Ok(PermissionKind::Menu),
            "BUTTON" | "2" => Ok(PermissionKind::Button),
            "API" | "3" => Ok(PermissionKind::Api),
            other => Err(cockpit_core::DomainError::validation(format!(
                "unknown permission type '{other}'"
            ))),
        }
    }
}

/// One entry of the flat permission catalog.
///
/// `parent_id == None` marks a root. The catalog as a whole must form a
/// forest; `tree::build_tree` rejects cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub code: PermissionCode,
    pub name: String,
    pub kind: PermissionKind,
    pub path: Option<String>,
    pub method: Option<String>,
    pub parent_id: Option<PermissionId>,
    pub sort_order: i32,
    pub enabled: bool,
}

impl Permission {
    pub fn new(
        id: PermissionId,
        code: impl Into<PermissionCode>,
        name: impl Into<String>,
        kind: PermissionKind,
    ) -> Self {
        Self {
            id,
            code: code.into(),
            name: name.into(),
            kind,
            path: None,
            method: None,
            parent_id: None,
            sort_order: 0,
            enabled: true,
        }
    }

    pub fn with_parent(mut self, parent_id: PermissionId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub fn with_route(mut self, method: impl Into<String>, path: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self.path = Some(path.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Associations
// ─────────────────────────────────────────────────────────────────────────────

/// (user, role) pair; unique per pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserRole {
    pub user_id: UserId,
    pub role_id: RoleId,
}

/// (role, permission) pair; unique per pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RolePermission {
    pub role_id: RoleId,
    pub permission_id: PermissionId,
}
