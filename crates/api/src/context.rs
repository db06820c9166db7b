use cockpit_auth::{RoleCode, TokenClaims};
use cockpit_core::UserId;

/// Authenticated caller of a request, taken from a validated access token.
///
/// Carries only what the token carries; handlers that need the permission
/// set load the full principal through `authz`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    username: String,
    roles: Vec<RoleCode>,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, username: impl Into<String>, roles: Vec<RoleCode>) -> Self {
        Self {
            user_id,
            username: username.into(),
            roles,
        }
    }

    pub fn from_claims(claims: TokenClaims) -> Self {
        Self::new(claims.user_id, claims.sub, claims.roles)
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn roles(&self) -> &[RoleCode] {
        &self.roles
    }
}
