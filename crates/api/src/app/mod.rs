//! HTTP application wiring (axum router + service wiring).
//!
//! - `services.rs`: stores, session cache, token service, authenticator
//! - `routes/`: handlers, one file per area
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: error → status mapping

use std::sync::Arc;

use axum::{Extension, Router, routing::get};

use cockpit_infra::Settings;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::{AppServices, StartupError};

/// Build the full HTTP router from configuration (entrypoint used by `main.rs`).
pub async fn build_app(settings: &Settings) -> Result<Router, StartupError> {
    let services = services::build_services(settings).await?;
    Ok(router(Arc::new(services)))
}

/// Router over already-wired services.
pub fn router(services: Arc<AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        services: services.clone(),
    };

    let protected = routes::protected_router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api/v1", routes::public_router().merge(protected))
        .layer(Extension(services))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use cockpit_auth::{PasswordHasher, TokenConfig};

    use super::*;

    fn app() -> Router {
        let hasher = PasswordHasher::insecure_fast().unwrap();
        let dir = services::seed_dev_directory(&hasher, "pw").unwrap();
        let services =
            AppServices::in_memory(Arc::new(dir), TokenConfig::new("router-test-secret-router-test"), hasher)
                .unwrap();
        router(Arc::new(services))
    }

    #[tokio::test]
    async fn health_is_public() {
        let res = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_need_a_bearer() {
        for path in ["/api/v1/auth/profile", "/api/v1/permissions/mine", "/api/v1/permissions/tree"] {
            let res = app()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{path}");
        }
    }

    #[tokio::test]
    async fn refresh_without_bearer_is_unauthorized() {
        let res = app()
            .oneshot(Request::post("/api/v1/auth/refresh").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
