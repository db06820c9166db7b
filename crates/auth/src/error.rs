use thiserror::Error;

use cockpit_core::{DomainError, PermissionId};

use crate::TokenKind;
use crate::claims::TokenValidationError;
use crate::session::CacheError;
use crate::store::StoreError;

/// Failure of an authentication, token or catalog operation.
///
/// Every variant is a typed outcome the boundary maps to a status code;
/// nothing here is retried internally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    // ─── credentials ───
    #[error("user not found")]
    UserNotFound,

    #[error("account is disabled")]
    AccountDisabled,

    #[error("invalid credentials")]
    InvalidCredentials,

    // ─── tokens ───
    #[error("token has expired")]
    TokenExpired,

    #[error("token is malformed: {0}")]
    TokenMalformed(String),

    #[error("token signature is invalid")]
    SignatureInvalid,

    #[error("token has been revoked")]
    TokenRevoked,

    #[error("expected {expected} token, got {found}")]
    WrongTokenKind { expected: TokenKind, found: TokenKind },

    // ─── catalog ───
    #[error("permission graph contains a cycle through permission {permission_id}")]
    CyclicPermissionGraph { permission_id: PermissionId },

    #[error("role not found: {0}")]
    RoleNotFound(String),

    #[error("permission not found: {0}")]
    PermissionNotFound(String),

    // ─── infrastructure ───
    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error("session cache failure: {0}")]
    SessionCache(#[from] CacheError),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::UserNotFound => "user_not_found",
            AuthError::AccountDisabled => "account_disabled",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenMalformed(_) => "token_malformed",
            AuthError::SignatureInvalid => "signature_invalid",
            AuthError::TokenRevoked => "token_revoked",
            AuthError::WrongTokenKind { .. } => "wrong_token_kind",
            AuthError::CyclicPermissionGraph { .. } => "cyclic_permission_graph",
            AuthError::RoleNotFound(_) => "role_not_found",
            AuthError::PermissionNotFound(_) => "permission_not_found",
            AuthError::Validation(_) => "validation",
            AuthError::SessionCache(_) => "session_cache",
            AuthError::Store(_) => "store",
            AuthError::Timeout(_) => "timeout",
            AuthError::Internal(_) => "internal",
        }
    }

    /// The kinds that collapse into one "bad credentials" response.
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            AuthError::UserNotFound | AuthError::AccountDisabled | AuthError::InvalidCredentials
        )
    }

    pub fn is_token_failure(&self) -> bool {
        matches!(
            self,
            AuthError::TokenExpired
                | AuthError::TokenMalformed(_)
                | AuthError::SignatureInvalid
                | AuthError::TokenRevoked
                | AuthError::WrongTokenKind { .. }
        )
    }
}

impl From<TokenValidationError> for AuthError {
    fn from(value: TokenValidationError) -> Self {
        match value {
            TokenValidationError::Expired => AuthError::TokenExpired,
            other => AuthError::TokenMalformed(other.to_string()),
        }
    }
}
