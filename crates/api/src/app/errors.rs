use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use cockpit_auth::{AuthError, AuthzError, CacheError, StoreError};
use cockpit_core::DomainError;

/// Error returned by handlers and the auth middleware.
#[derive(Debug)]
pub enum ApiError {
    /// No usable bearer token on a request that needs one.
    Unauthenticated,
    BadRequest(String),
    Auth(AuthError),
    Forbidden(AuthzError),
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        ApiError::Auth(value)
    }
}

impl From<AuthzError> for ApiError {
    fn from(value: AuthzError) -> Self {
        ApiError::Forbidden(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthenticated => json_error(
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                "missing or malformed bearer token",
            ),
            ApiError::BadRequest(msg) => json_error(StatusCode::BAD_REQUEST, "validation", msg),
            ApiError::Forbidden(e) => json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()),
            ApiError::Auth(e) => auth_error_to_response(e),
        }
    }
}

/// Map the auth taxonomy onto HTTP.
///
/// The three credential failures share one body so callers cannot tell an
/// unknown user from a wrong password.
pub fn auth_error_to_response(err: AuthError) -> Response {
    if err.is_credential_failure() {
        return json_error(
            StatusCode::UNAUTHORIZED,
            "bad_credentials",
            "invalid username or password",
        );
    }
    if err.is_token_failure() {
        return json_error(StatusCode::UNAUTHORIZED, err.kind(), err.to_string());
    }

    let status = status_for(&err);
    if status.is_server_error() {
        error!(kind = err.kind(), error = %err, "request failed");
        // Infrastructure details stay in the log.
        return json_error(status, err.kind(), status.canonical_reason().unwrap_or("error"));
    }
    json_error(status, err.kind(), err.to_string())
}

fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::RoleNotFound(_) | AuthError::PermissionNotFound(_) => StatusCode::NOT_FOUND,
        AuthError::Validation(DomainError::Validation(_) | DomainError::InvalidId(_)) => StatusCode::BAD_REQUEST,
        AuthError::SessionCache(CacheError::Unavailable(_))
        | AuthError::Store(StoreError::Unavailable(_))
        | AuthError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use cockpit_core::PermissionId;

    use super::*;

    fn status(err: AuthError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn credential_and_token_failures_are_unauthorized() {
        assert_eq!(status(AuthError::UserNotFound), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::AccountDisabled), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::TokenRevoked), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::SignatureInvalid), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn catalog_and_infrastructure_statuses() {
        assert_eq!(status(AuthError::RoleNotFound("X".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(DomainError::validation("empty").into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(AuthError::CyclicPermissionGraph {
                permission_id: PermissionId::new(1)
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(CacheError::Unavailable("down".into()).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status(AuthError::Timeout("password hashing")), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status(StoreError::Query("syntax".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn authz_denial_is_forbidden() {
        let resp = ApiError::from(AuthzError::MissingPermission("permission:read".into())).into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
