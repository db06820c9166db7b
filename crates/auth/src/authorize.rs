//! Explicit capability checks.
//!
//! Entry points call `require_permission` / `require_role` with the principal
//! attached to the request. These are pure functions over the capability set,
//! so they can be tested without any web framework.

use serde::Serialize;
use thiserror::Error;

use cockpit_core::UserId;

use crate::{PermissionCode, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    MissingPermission(String),

    #[error("forbidden: missing role '{0}'")]
    MissingRole(String),
}

/// Require that `principal` holds permission `code` (or the wildcard).
///
/// - No IO
/// - No panics
pub fn require_permission(principal: &Principal, code: &str) -> Result<(), AuthzError> {
    if principal.has_permission(code) {
        Ok(())
    } else {
        Err(AuthzError::MissingPermission(code.to_string()))
    }
}

/// Require that `principal` holds role `code`.
pub fn require_role(principal: &Principal, code: &str) -> Result<(), AuthzError> {
    if principal.has_role(code) {
        Ok(())
    } else {
        Err(AuthzError::MissingRole(code.to_string()))
    }
}

/// True if at least one of `codes` is held. An empty list grants nothing.
pub fn has_any_permission<'a, I>(principal: &Principal, codes: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    codes.into_iter().any(|c| principal.has_permission(c))
}

/// True if every one of `codes` is held. An empty list is trivially granted.
pub fn has_all_permissions<'a, I>(principal: &Principal, codes: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    codes.into_iter().all(|c| principal.has_permission(c))
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub required_permission: String,
    pub granted: bool,
    pub reason: String,
    pub user_id: UserId,
    pub roles: Vec<String>,
    pub effective_permissions: Vec<String>,
    pub has_wildcard: bool,
}

/// Explain why a permission check would be granted or denied.
pub fn explain_authorization(principal: &Principal, required: &str) -> AuthorizationExplanation {
    let has_wildcard = principal.permissions.contains(&PermissionCode::WILDCARD);
    let has_required = principal.permissions.contains(required);

    let reason = if has_required {
        format!("Principal has explicit permission '{}'", required)
    } else if has_wildcard {
        "Principal has wildcard permission '*'".to_string()
    } else {
        format!(
            "Principal does not have permission '{}' through any enabled role",
            required
        )
    };

    AuthorizationExplanation {
        required_permission: required.to_string(),
        granted: has_required || has_wildcard,
        reason,
        user_id: principal.user_id,
        roles: principal.roles.iter().map(|r| r.as_str().to_string()).collect(),
        effective_permissions: principal
            .permissions
            .iter()
            .map(|p| p.as_str().to_string())
            .collect(),
        has_wildcard,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::{DataScope, RoleCode};

    fn principal(perms: &[&'static str], roles: &[&'static str]) -> Principal {
        Principal {
            user_id: UserId::new(1),
            username: "alice".to_string(),
            email: None,
            phone: None,
            roles: roles.iter().map(|r| RoleCode::new(*r)).collect(),
            permissions: perms.iter().map(|p| PermissionCode::new(*p)).collect::<BTreeSet<_>>(),
            data_scope: DataScope::All,
        }
    }

    #[test]
    fn grants_held_permission() {
        let p = principal(&["dataset:read"], &["EDITOR"]);
        assert!(require_permission(&p, "dataset:read").is_ok());
    }

    #[test]
    fn denies_missing_permission() {
        let p = principal(&["dataset:read"], &["EDITOR"]);
        assert_eq!(
            require_permission(&p, "dataset:write"),
            Err(AuthzError::MissingPermission("dataset:write".to_string()))
        );
    }

    #[test]
    fn wildcard_grants_everything() {
        let p = principal(&["*"], &["ADMIN"]);
        assert!(require_permission(&p, "model:deploy").is_ok());
        assert!(explain_authorization(&p, "model:deploy").granted);
    }

    #[test]
    fn role_check_is_exact() {
        let p = principal(&[], &["EDITOR"]);
        assert!(require_role(&p, "EDITOR").is_ok());
        assert!(matches!(require_role(&p, "editor"), Err(AuthzError::MissingRole(_))));
    }

    #[test]
    fn any_and_all() {
        let p = principal(&["a", "b"], &[]);
        assert!(has_any_permission(&p, ["x", "b"]));
        assert!(!has_any_permission(&p, Vec::<&str>::new()));
        assert!(has_all_permissions(&p, ["a", "b"]));
        assert!(!has_all_permissions(&p, ["a", "c"]));
    }

    #[test]
    fn explanation_lists_effective_permissions() {
        let p = principal(&["b", "a"], &["VIEWER"]);
        let e = explain_authorization(&p, "c");
        assert!(!e.granted);
        assert_eq!(e.effective_permissions, vec!["a", "b"]);
        assert!(e.reason.contains("'c'"));
    }
}
