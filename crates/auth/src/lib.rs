//! `cockpit-auth`: authentication, session tokens and RBAC resolution.
//!
//! This crate is decoupled from HTTP and from concrete storage: users, roles
//! and permissions are read through `UserStore` / `PermissionStore`, and
//! session state lives behind `SessionCache`. In-memory implementations of
//! all three live here for tests and local runs.

pub mod authenticator;
pub mod authorize;
pub mod claims;
pub mod error;
pub mod in_memory_session;
pub mod in_memory_store;
pub mod model;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod resolver;
pub mod roles;
pub mod session;
pub mod store;
pub mod token;
pub mod tree;

pub use authenticator::{CredentialAuthenticator, LoginOutcome};
pub use authorize::{
    AuthorizationExplanation, AuthzError, explain_authorization, has_all_permissions, has_any_permission,
    require_permission, require_role,
};
pub use claims::{TokenClaims, TokenKind, TokenValidationError, validate_claims};
pub use error::AuthError;
pub use in_memory_session::InMemorySessionCache;
pub use in_memory_store::InMemoryDirectory;
pub use model::{DataScope, Permission, PermissionKind, Role, RolePermission, User, UserRole};
pub use password::PasswordHasher;
pub use permissions::PermissionCode;
pub use principal::Principal;
pub use resolver::{PermissionResolver, PrincipalData};
pub use roles::RoleCode;
pub use session::{CacheError, SessionCache, SessionKey};
pub use store::{PermissionStore, StoreError, UserStore};
pub use token::{CacheFailurePolicy, RevocationMode, TokenConfig, TokenPair, TokenService, expires_soon};
pub use tree::{PermissionNode, build_tree, flatten, parent_map};
