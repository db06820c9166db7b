//! Request-level authorization guards.
//!
//! Tokens carry role codes only, so permission checks load the caller's
//! current principal and run the pure checks from `cockpit_auth` on it.

use cockpit_auth::{Principal, require_permission};

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

/// The caller's principal as the directory sees it now.
pub async fn current_principal(services: &AppServices, ctx: &PrincipalContext) -> Result<Principal, ApiError> {
    Ok(services.authenticator().load_principal(ctx.user_id()).await?)
}

/// Load the caller and require `code` (or the wildcard).
pub async fn authorize_permission(
    services: &AppServices,
    ctx: &PrincipalContext,
    code: &str,
) -> Result<Principal, ApiError> {
    let principal = current_principal(services, ctx).await?;
    if let Err(e) = require_permission(&principal, code) {
        tracing::info!(user_id = %ctx.user_id(), required = code, "permission denied");
        return Err(e.into());
    }
    Ok(principal)
}
