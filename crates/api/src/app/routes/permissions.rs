//! Capability checks and the permission catalog views.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    routing::get,
};
use serde::Deserialize;

use cockpit_auth::{AuthorizationExplanation, PermissionCode, PermissionNode, explain_authorization};

use crate::app::dto::{CheckQuery, CheckResponse};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

/// Required to read the full catalog.
pub const CATALOG_READ: &str = "permission:read";

pub fn router() -> Router {
    Router::new()
        .route("/check", get(check))
        .route("/explain", get(explain))
        .route("/tree", get(tree))
        .route("/mine", get(mine))
}

/// GET /api/v1/permissions/check?code=..&role=..
pub async fn check(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Query(query): Query<CheckQuery>,
) -> Result<Json<CheckResponse>, ApiError> {
    if query.code.is_none() && query.role.is_none() {
        return Err(ApiError::BadRequest("either 'code' or 'role' is required".to_string()));
    }
    let principal = authz::current_principal(&services, &ctx).await?;
    let granted = query.code.as_deref().is_none_or(|c| principal.has_permission(c))
        && query.role.as_deref().is_none_or(|r| principal.has_role(r));
    Ok(Json(CheckResponse { granted }))
}

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub code: String,
}

/// GET /api/v1/permissions/explain?code=.. (why the caller would be allowed
/// or denied).
pub async fn explain(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Query(query): Query<ExplainQuery>,
) -> Result<Json<AuthorizationExplanation>, ApiError> {
    let principal = authz::current_principal(&services, &ctx).await?;
    Ok(Json(explain_authorization(&principal, &query.code)))
}

/// GET /api/v1/permissions/tree
pub async fn tree(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
) -> Result<Json<Vec<PermissionNode>>, ApiError> {
    authz::authorize_permission(&services, &ctx, CATALOG_READ).await?;
    Ok(Json(services.resolver().permission_tree().await?))
}

/// GET /api/v1/permissions/mine: the caller's menu tree. Wildcard holders
/// see the whole catalog.
pub async fn mine(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
) -> Result<Json<Vec<PermissionNode>>, ApiError> {
    let principal = authz::current_principal(&services, &ctx).await?;
    let forest = if principal.permissions.contains(&PermissionCode::WILDCARD) {
        services.resolver().permission_tree().await?
    } else {
        services.resolver().user_permission_tree(ctx.user_id()).await?
    };
    Ok(Json(forest))
}
