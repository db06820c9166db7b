//! Login, token refresh, logout, profile and password change.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Json,
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
};

use cockpit_auth::TokenPair;

use crate::app::dto::{ChangePasswordRequest, LoginRequest, LoginResponse, PrincipalView};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;
use crate::middleware::extract_bearer;

/// POST /api/v1/auth/login
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let ip = client_ip(&headers, connect.map(|ConnectInfo(addr)| addr));
    let outcome = services
        .authenticator()
        .login(&body.username, &body.password, ip)
        .await?;

    Ok(Json(LoginResponse {
        tokens: outcome.tokens,
        principal: outcome.principal.into(),
    }))
}

/// POST /api/v1/auth/refresh with `Authorization: Bearer <refreshToken>`.
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
) -> Result<Json<TokenPair>, ApiError> {
    let token = extract_bearer(&headers)?;
    Ok(Json(services.tokens().rotate(token).await?))
}

/// POST /api/v1/auth/logout with the current access token. Repeating it
/// succeeds.
pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = extract_bearer(&headers)?;
    services.tokens().logout(token).await?;
    Ok(StatusCode::OK)
}

/// GET /api/v1/auth/profile
pub async fn profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
) -> Result<Json<PrincipalView>, ApiError> {
    let principal = authz::current_principal(&services, &ctx).await?;
    Ok(Json(principal.into()))
}

/// PUT /api/v1/auth/password
pub async fn change_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    services
        .authenticator()
        .change_password(ctx.user_id(), &body.old_password, &body.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    };
    forwarded.or_else(real_ip).or_else(|| peer.map(|a| a.ip()))
}
