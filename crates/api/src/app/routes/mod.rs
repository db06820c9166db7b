use axum::{
    Router,
    routing::{get, post, put},
};

pub mod auth;
pub mod permissions;
pub mod system;

/// Endpoints reachable without an access token. Refresh and logout read
/// their bearer token themselves.
pub fn public_router() -> Router {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
}

/// Endpoints behind the access-token middleware.
pub fn protected_router() -> Router {
    Router::new()
        .route("/auth/profile", get(auth::profile))
        .route("/auth/password", put(auth::change_password))
        .nest("/permissions", permissions::router())
}
