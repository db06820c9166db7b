//! Credential verification and the login / password-change flows.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};

use cockpit_core::{DomainError, UserId};

use crate::password::PasswordHasher;
use crate::resolver::PermissionResolver;
use crate::session::SessionCache;
use crate::store::{PermissionStore, UserStore};
use crate::token::{TokenPair, TokenService};
use crate::{AuthError, Principal, User};

/// Successful login: who, plus the freshly minted pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginOutcome {
    pub principal: Principal,
    pub tokens: TokenPair,
}

pub struct CredentialAuthenticator<U, P, C> {
    users: U,
    resolver: Arc<PermissionResolver<P>>,
    tokens: Arc<TokenService<C>>,
    hasher: PasswordHasher,
}

impl<U, P, C> CredentialAuthenticator<U, P, C>
where
    U: UserStore,
    P: PermissionStore,
    C: SessionCache,
{
    pub fn new(
        users: U,
        resolver: Arc<PermissionResolver<P>>,
        tokens: Arc<TokenService<C>>,
        hasher: PasswordHasher,
    ) -> Self {
        Self {
            users,
            resolver,
            tokens,
            hasher,
        }
    }

    pub fn tokens(&self) -> &TokenService<C> {
        &self.tokens
    }

    pub fn resolver(&self) -> &PermissionResolver<P> {
        &self.resolver
    }

    /// Verify `username` / `password` and build the principal.
    ///
    /// Unknown and disabled accounts still pay one hash verification so the
    /// three failure kinds take comparable time. The last-login stamp is
    /// best-effort: a failed write is logged and the login proceeds.
    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        ip: Option<IpAddr>,
    ) -> Result<Principal, AuthError> {
        let outcome = self.check_credentials(username, password).await;
        let user = match outcome {
            Ok(user) => user,
            Err(e) => {
                info!(kind = e.kind(), "login rejected");
                return Err(e);
            }
        };

        let data = self.resolver.resolve_principal_data(user.id).await?;

        if let Err(e) = self.users.record_login(user.id, Utc::now(), ip).await {
            warn!(user_id = %user.id, error = %e, "failed to record last login");
        }

        info!(user_id = %user.id, "login succeeded");
        Ok(Principal::from_user(&user, data.roles, data.permissions, data.data_scope))
    }

    async fn check_credentials(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let Some(user) = self.users.find_by_username(username).await? else {
            self.hasher.verify_dummy(password).await?;
            return Err(AuthError::UserNotFound);
        };
        if !user.enabled {
            self.hasher.verify_dummy(password).await?;
            return Err(AuthError::AccountDisabled);
        }
        if !self.hasher.verify(password, &user.password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(user)
    }

    /// `authenticate` followed by `TokenService::issue`.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        ip: Option<IpAddr>,
    ) -> Result<LoginOutcome, AuthError> {
        let principal = self.authenticate(username, password, ip).await?;
        let tokens = self.tokens.issue(&principal).await?;
        Ok(LoginOutcome { principal, tokens })
    }

    /// Principal of an already-authenticated subject (profile lookups).
    #[instrument(skip(self), err)]
    pub async fn load_principal(&self, user_id: UserId) -> Result<Principal, AuthError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !user.enabled {
            return Err(AuthError::AccountDisabled);
        }
        let data = self.resolver.resolve_principal_data(user.id).await?;
        Ok(Principal::from_user(&user, data.roles, data.permissions, data.data_scope))
    }

    /// Replace the password after checking the current one, then revoke the
    /// subject's sessions.
    #[instrument(skip(self, old_password, new_password), err)]
    pub async fn change_password(
        &self,
        user_id: UserId,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if new_password.trim().is_empty() {
            return Err(DomainError::validation("new password must not be empty").into());
        }
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !user.enabled {
            return Err(AuthError::AccountDisabled);
        }
        if !self.hasher.verify(old_password, &user.password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }

        let hash = self.hasher.hash(new_password).await?;
        self.users.update_password_hash(user.id, &hash).await?;
        self.tokens.revoke(&user.username).await?;
        info!(user_id = %user.id, "password changed");
        Ok(())
    }
}
