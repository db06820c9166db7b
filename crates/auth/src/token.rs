//! Signed token issuance, validation, rotation and revocation.
//!
//! Tokens are HS256 JWTs. Each carries a unique `jti`; the session cache keeps
//! the current `jti` per `"{kind}:{username}"`. Plain validation is stateless.
//! Rotation is the one stateful path: it swaps the cached refresh `jti` with a
//! single compare-and-swap so a refresh token can be redeemed at most once.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use cockpit_core::{DomainError, UserId};

use crate::claims::validate_claims;
use crate::session::{CacheError, SessionCache, SessionKey};
use crate::{AuthError, Principal, RoleCode, TokenClaims, TokenKind};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Whether `validate_access` consults the session cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationMode {
    /// Access tokens stay valid until they expire, even after logout.
    #[default]
    Stateless,
    /// Access tokens must match the cached `access:{username}` id.
    Session,
}

/// What `validate_access` does in session mode when the cache cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheFailurePolicy {
    #[default]
    FailClosed,
    SignatureOnly,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    #[serde(skip_serializing)]
    pub secret: String,
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Clock skew tolerance in seconds, applied to `iat` and `exp`.
    pub leeway_secs: i64,
    /// Upper bound on every session cache call.
    pub cache_timeout: Duration,
    pub revocation: RevocationMode,
    pub cache_failure_policy: CacheFailurePolicy,
}

impl core::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("leeway_secs", &self.leeway_secs)
            .field("cache_timeout", &self.cache_timeout)
            .field("revocation", &self.revocation)
            .field("cache_failure_policy", &self.cache_failure_policy)
            .finish()
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: "ai-cockpit".to_string(),
            access_ttl: Duration::from_secs(24 * 3600),
            refresh_ttl: Duration::from_secs(7 * 24 * 3600),
            leeway_secs: 0,
            cache_timeout: Duration::from_millis(2000),
            revocation: RevocationMode::Stateless,
            cache_failure_policy: CacheFailurePolicy::FailClosed,
        }
    }
}

impl TokenConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ..Default::default()
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    pub fn with_leeway_secs(mut self, leeway_secs: i64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    pub fn with_revocation(mut self, mode: RevocationMode) -> Self {
        self.revocation = mode;
        self
    }

    pub fn with_cache_failure_policy(mut self, policy: CacheFailurePolicy) -> Self {
        self.cache_failure_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.secret.is_empty() {
            return Err(DomainError::validation("token signing secret is not configured"));
        }
        if self.secret.len() < 32 {
            warn!("token signing secret is shorter than recommended (32 bytes)");
        }
        if self.access_ttl.is_zero() || self.refresh_ttl.is_zero() {
            return Err(DomainError::validation("token lifetimes must be positive"));
        }
        if self.leeway_secs < 0 {
            return Err(DomainError::validation("token leeway must not be negative"));
        }
        Ok(())
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }
}

fn secs(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}

/// Result of `issue` and `rotate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// TokenService
// ─────────────────────────────────────────────────────────────────────────────

pub struct TokenService<C> {
    config: Arc<TokenConfig>,
    cache: C,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl<C> core::fmt::Debug for TokenService<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Subject fields a token pair is minted for.
struct Subject<'a> {
    username: &'a str,
    user_id: UserId,
    roles: Vec<RoleCode>,
}

impl<C: SessionCache> TokenService<C> {
    pub fn new(config: TokenConfig, cache: C) -> Result<Self, AuthError> {
        config.validate()?;

        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        // Time window is checked by `validate_claims` against an injectable clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss"]);

        Ok(Self {
            config: Arc::new(config),
            cache,
            encoding_key,
            decoding_key,
            validation,
        })
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    async fn cache_call<T, F>(&self, op: &'static str, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        tokio::time::timeout(self.config.cache_timeout, fut)
            .await
            .map_err(|_| AuthError::Timeout(op))?
            .map_err(AuthError::from)
    }

    fn mint(&self, subject: &Subject<'_>, kind: TokenKind, now: DateTime<Utc>) -> Result<(TokenClaims, String), AuthError> {
        let iat = now.timestamp();
        let claims = TokenClaims {
            sub: subject.username.to_string(),
            user_id: subject.user_id,
            roles: subject.roles.clone(),
            iat,
            exp: iat.saturating_add(secs(self.config.ttl(kind))),
            jti: Uuid::now_v7().to_string(),
            iss: self.config.issuer.clone(),
            kind,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("failed to sign token: {e}")))?;
        Ok((claims, token))
    }

    fn mint_pair(
        &self,
        subject: &Subject<'_>,
        now: DateTime<Utc>,
    ) -> Result<(TokenClaims, TokenClaims, TokenPair), AuthError> {
        let (access, access_token) = self.mint(subject, TokenKind::Access, now)?;
        let (refresh, refresh_token) = self.mint(subject, TokenKind::Refresh, now)?;
        let pair = TokenPair {
            access_token,
            refresh_token,
            expires_in: secs(self.config.access_ttl),
        };
        Ok((access, refresh, pair))
    }

    /// Mint an access + refresh pair and record both ids in the cache.
    pub async fn issue(&self, principal: &Principal) -> Result<TokenPair, AuthError> {
        self.issue_at(principal, Utc::now()).await
    }

    #[instrument(skip(self, principal), fields(username = %principal.username), err)]
    pub async fn issue_at(&self, principal: &Principal, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        let subject = Subject {
            username: &principal.username,
            user_id: principal.user_id,
            roles: principal.role_codes(),
        };
        let (access, refresh, pair) = self.mint_pair(&subject, now)?;

        let refresh_key = SessionKey::new(TokenKind::Refresh, &principal.username);
        let access_key = SessionKey::new(TokenKind::Access, &principal.username);
        self.cache_call("session cache set", self.cache.set(&refresh_key, &refresh.jti, self.config.refresh_ttl))
            .await?;
        self.cache_call("session cache set", self.cache.set(&access_key, &access.jti, self.config.access_ttl))
            .await?;

        Ok(pair)
    }

    /// Verify signature, issuer and time window. Does not touch the cache.
    pub fn validate(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, AuthError> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => AuthError::SignatureInvalid,
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenMalformed(e.to_string()),
            }
        })?;
        validate_claims(&data.claims, now, self.config.leeway_secs)?;
        Ok(data.claims)
    }

    /// `validate` plus `kind == access`; in session mode the token id must also
    /// be the one currently cached for its subject.
    pub async fn validate_access(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let claims = self.validate(token)?;
        expect_kind(&claims, TokenKind::Access)?;

        if self.config.revocation == RevocationMode::Stateless {
            return Ok(claims);
        }

        let key = SessionKey::new(TokenKind::Access, &claims.sub);
        match self.cache_call("session cache get", self.cache.get(&key)).await {
            Ok(Some(current)) if current == claims.jti => Ok(claims),
            Ok(_) => Err(AuthError::TokenRevoked),
            Err(e) if self.config.cache_failure_policy == CacheFailurePolicy::SignatureOnly => {
                warn!(username = %claims.sub, error = %e, "session cache unreachable; accepting signature-only");
                Ok(claims)
            }
            Err(e) => Err(e),
        }
    }

    /// Redeem a refresh token for a fresh pair.
    ///
    /// Exactly one of any number of concurrent calls with the same refresh
    /// token succeeds; the rest fail with `TokenRevoked`.
    pub async fn rotate(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        self.rotate_at(refresh_token, Utc::now()).await
    }

    #[instrument(skip_all, err)]
    pub async fn rotate_at(&self, refresh_token: &str, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        let claims = self.validate_at(refresh_token, now)?;
        expect_kind(&claims, TokenKind::Refresh)?;

        let subject = Subject {
            username: &claims.sub,
            user_id: claims.user_id,
            roles: claims.roles.clone(),
        };
        let (access, refresh, pair) = self.mint_pair(&subject, now)?;

        let refresh_key = SessionKey::new(TokenKind::Refresh, &claims.sub);
        let swapped = self
            .cache_call(
                "session cache compare-and-swap",
                self.cache
                    .compare_and_swap(&refresh_key, &claims.jti, &refresh.jti, self.config.refresh_ttl),
            )
            .await?;
        if !swapped {
            warn!(username = %claims.sub, "refresh token already consumed or revoked");
            return Err(AuthError::TokenRevoked);
        }

        // The presented refresh token is spent from here on, so the new pair
        // must reach the caller. A missed access entry only matters in session
        // mode, and the new refresh token can still rotate past it.
        let access_key = SessionKey::new(TokenKind::Access, &claims.sub);
        if let Err(e) = self
            .cache_call("session cache set", self.cache.set(&access_key, &access.jti, self.config.access_ttl))
            .await
        {
            warn!(username = %claims.sub, error = %e, "access session entry not recorded after rotation");
        }

        info!(username = %claims.sub, "token pair rotated");
        Ok(pair)
    }

    /// Drop both cache entries of a subject. Outstanding refresh tokens stop
    /// rotating; stateless access tokens live until they expire.
    #[instrument(skip(self), err)]
    pub async fn revoke(&self, username: &str) -> Result<(), AuthError> {
        let refresh = self
            .cache_call(
                "session cache delete",
                self.cache.delete(&SessionKey::new(TokenKind::Refresh, username)),
            )
            .await?;
        let access = self
            .cache_call(
                "session cache delete",
                self.cache.delete(&SessionKey::new(TokenKind::Access, username)),
            )
            .await?;
        if refresh || access {
            info!(username, "sessions revoked");
        }
        Ok(())
    }

    /// Revoke the subject of a still-valid access token. Repeating it is a
    /// no-op success.
    ///
    /// In session mode an access token that rotation has superseded is
    /// accepted and changes nothing.
    pub async fn logout(&self, access_token: &str) -> Result<(), AuthError> {
        let claims = self.validate(access_token)?;
        expect_kind(&claims, TokenKind::Access)?;

        if self.config.revocation == RevocationMode::Session {
            let key = SessionKey::new(TokenKind::Access, &claims.sub);
            match self.cache_call("session cache get", self.cache.get(&key)).await? {
                Some(current) if current != claims.jti => {
                    info!(username = %claims.sub, "logout with superseded access token; nothing to revoke");
                    return Ok(());
                }
                _ => {}
            }
        }

        self.revoke(&claims.sub).await
    }
}

fn expect_kind(claims: &TokenClaims, expected: TokenKind) -> Result<(), AuthError> {
    if claims.kind == expected {
        Ok(())
    } else {
        Err(AuthError::WrongTokenKind {
            expected,
            found: claims.kind,
        })
    }
}

/// True when the token expires within `window` of `now`.
pub fn expires_soon(claims: &TokenClaims, window: Duration, now: DateTime<Utc>) -> bool {
    claims.exp.saturating_sub(now.timestamp()) <= secs(window)
}
