use serde::{Deserialize, Serialize};

use cockpit_auth::{DataScope, PermissionCode, Principal, RoleCode, TokenPair};
use cockpit_core::UserId;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// `?code=` and/or `?role=`; both given means both must hold.
#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub code: Option<String>,
    pub role: Option<String>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalView {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub roles: Vec<RoleCode>,
    pub permissions: Vec<PermissionCode>,
    pub data_scope: DataScope,
}

impl From<Principal> for PrincipalView {
    fn from(p: Principal) -> Self {
        Self {
            id: p.user_id,
            username: p.username,
            email: p.email,
            phone: p.phone,
            roles: p.roles.into_iter().collect(),
            permissions: p.permissions.into_iter().collect(),
            data_scope: p.data_scope,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub principal: PrincipalView,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub granted: bool,
}
