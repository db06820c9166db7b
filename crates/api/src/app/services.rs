//! Service wiring: stores, session cache, token service and authenticator.
//!
//! In-memory by default (dev/test). With `USE_PERSISTENT_STORES=true` and the
//! `redis` feature, Postgres holds the directory and Redis the sessions.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use cockpit_auth::{
    AuthError, CacheError, CredentialAuthenticator, DataScope, InMemoryDirectory, InMemorySessionCache,
    PasswordHasher, Permission, PermissionKind, PermissionResolver, PermissionStore, Role, SessionCache,
    StoreError, TokenConfig, TokenService, User, UserStore,
};
use cockpit_core::{DomainError, PermissionId, RoleId, UserId};
use cockpit_infra::{ConfigError, Settings};
#[cfg(feature = "redis")]
use cockpit_infra::{PostgresDirectory, RedisSessionCache};

pub type Users = Arc<dyn UserStore>;
pub type Catalog = Arc<dyn PermissionStore>;
pub type Sessions = Arc<dyn SessionCache>;

/// The authenticator over type-erased backends, so handlers do not care
/// which store implementation is wired.
pub type Authenticator = CredentialAuthenticator<Users, Catalog, Sessions>;

const DEV_ADMIN_PASSWORD: &str = "admin123";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("seed data rejected: {0}")]
    Seed(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

pub struct AppServices {
    authenticator: Authenticator,
}

impl AppServices {
    pub fn new(
        users: Users,
        catalog: Catalog,
        sessions: Sessions,
        token: TokenConfig,
        hasher: PasswordHasher,
    ) -> Result<Self, StartupError> {
        let resolver = Arc::new(PermissionResolver::new(catalog));
        let tokens = Arc::new(TokenService::new(token, sessions)?);
        Ok(Self {
            authenticator: CredentialAuthenticator::new(users, resolver, tokens, hasher),
        })
    }

    /// Wire everything to one in-memory directory and an in-memory cache.
    pub fn in_memory(
        directory: Arc<InMemoryDirectory>,
        token: TokenConfig,
        hasher: PasswordHasher,
    ) -> Result<Self, StartupError> {
        let users: Users = directory.clone();
        let catalog: Catalog = directory;
        let sessions: Sessions = Arc::new(InMemorySessionCache::new());
        Self::new(users, catalog, sessions, token, hasher)
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn tokens(&self) -> &TokenService<Sessions> {
        self.authenticator.tokens()
    }

    pub fn resolver(&self) -> &PermissionResolver<Catalog> {
        self.authenticator.resolver()
    }
}

/// Build services according to `settings`.
pub async fn build_services(settings: &Settings) -> Result<AppServices, StartupError> {
    let hasher = PasswordHasher::owasp(settings.hash_timeout)?;

    if settings.stores.use_persistent {
        #[cfg(feature = "redis")]
        {
            return build_persistent_services(settings, hasher).await;
        }
        #[cfg(not(feature = "redis"))]
        {
            warn!("USE_PERSISTENT_STORES=true but redis feature not enabled, falling back to in-memory");
        }
    }

    build_in_memory_services(settings, hasher)
}

fn build_in_memory_services(settings: &Settings, hasher: PasswordHasher) -> Result<AppServices, StartupError> {
    let admin_password = match settings.admin_password.as_deref() {
        Some(password) => password.to_string(),
        None => {
            warn!("ADMIN_PASSWORD not set; seeding admin with insecure dev password");
            DEV_ADMIN_PASSWORD.to_string()
        }
    };
    let directory = seed_dev_directory(&hasher, &admin_password)?;
    info!(backend = "in_memory", "services ready");
    AppServices::in_memory(Arc::new(directory), settings.token.clone(), hasher)
}

#[cfg(feature = "redis")]
async fn build_persistent_services(settings: &Settings, hasher: PasswordHasher) -> Result<AppServices, StartupError> {
    let database_url = settings
        .stores
        .database_url
        .as_deref()
        .ok_or(ConfigError::Missing("DATABASE_URL"))?;

    let directory = Arc::new(PostgresDirectory::connect(database_url).await?);
    directory.ensure_schema().await?;
    match settings.admin_password.as_deref() {
        Some(password) => {
            let hash = hasher.hash(password).await?;
            directory.bootstrap_admin("admin", &hash).await?;
        }
        None => info!("ADMIN_PASSWORD not set; skipping admin bootstrap"),
    }

    let cache = RedisSessionCache::connect(
        &settings.stores.redis_url,
        Some(settings.stores.redis_key_prefix.clone()),
    )
    .await?;

    let users: Users = directory.clone();
    let catalog: Catalog = directory;
    let sessions: Sessions = Arc::new(cache);
    info!(backend = "postgres+redis", "services ready");
    AppServices::new(users, catalog, sessions, settings.token.clone(), hasher)
}

/// Dev catalog: a small menu tree, an `ADMIN` role holding the wildcard and a
/// `VIEWER` role with read access. Only `admin` is seeded as a user.
pub fn seed_dev_directory(hasher: &PasswordHasher, admin_password: &str) -> Result<InMemoryDirectory, StartupError> {
    let dir = InMemoryDirectory::new();

    let menu = |id: i64, code: &str, name: &str, sort: i32| {
        Permission::new(PermissionId::new(id), code, name, PermissionKind::Menu).with_sort_order(sort)
    };
    let api = |id: i64, code: &str, name: &str, parent: i64, method: &str, path: &str| {
        Permission::new(PermissionId::new(id), code, name, PermissionKind::Api)
            .with_parent(PermissionId::new(parent))
            .with_route(method, path)
    };

    for permission in [
        menu(1, "system", "System", 1),
        api(2, "permission:read", "Read permission catalog", 1, "GET", "/api/v1/permissions/tree"),
        menu(10, "dataset", "Datasets", 2),
        api(11, "dataset:read", "Read datasets", 10, "GET", "/api/v1/datasets"),
        api(12, "dataset:write", "Write datasets", 10, "POST", "/api/v1/datasets"),
        menu(20, "model", "Models", 3),
        api(21, "model:read", "Read models", 20, "GET", "/api/v1/models"),
        Permission::new(PermissionId::new(100), "*", "All permissions", PermissionKind::Api),
    ] {
        dir.insert_permission(permission)?;
    }

    dir.insert_role(Role::new(RoleId::new(1), "ADMIN", "Administrator").with_data_scope(DataScope::All))?;
    dir.insert_role(Role::new(RoleId::new(2), "VIEWER", "Viewer").with_data_scope(DataScope::Department))?;
    dir.grant_permission(RoleId::new(1), PermissionId::new(100))?;
    for id in [10, 11, 20, 21] {
        dir.grant_permission(RoleId::new(2), PermissionId::new(id))?;
    }

    let hash = hasher.hash_blocking(admin_password)?;
    dir.insert_user(User::new(UserId::new(1), "admin", hash))?;
    dir.assign_role(UserId::new(1), RoleId::new(1))?;

    Ok(dir)
}
