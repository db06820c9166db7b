//! Argon2id password hashing.
//!
//! Hashing and verification are CPU-bound, so both run on the blocking pool
//! under a timeout rather than on the async workers.

use std::sync::Arc;
use std::time::Duration;

use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier as _, Version};
use password_hash::SaltString;
use password_hash::rand_core::OsRng;
use tracing::warn;

use crate::AuthError;

const DUMMY_PASSWORD: &str = "cockpit-dummy-password";

/// Hashes and verifies passwords as PHC strings.
///
/// Verification reads the parameters embedded in the stored hash, so
/// changing `Params` only affects newly hashed passwords.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
    timeout: Duration,
    dummy_hash: Arc<str>,
}

impl core::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("m_cost", &self.params.m_cost())
            .field("t_cost", &self.params.t_cost())
            .field("p_cost", &self.params.p_cost())
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn argon2(params: Params) -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

fn hash_with(params: Params, password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    argon2(params)
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Internal(format!("password hashing failed: {e}")))
}

fn verify_with(params: Params, password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => argon2(params).verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            warn!(error = %e, "stored password hash is not a valid PHC string");
            false
        }
    }
}

impl PasswordHasher {
    /// Build a hasher; computes the dummy hash used for unknown users.
    pub fn new(params: Params, timeout: Duration) -> Result<Self, AuthError> {
        let dummy_hash = hash_with(params.clone(), DUMMY_PASSWORD)?;
        Ok(Self {
            params,
            timeout,
            dummy_hash: dummy_hash.into(),
        })
    }

    /// OWASP minimum Argon2id parameters (m=19456 KiB, t=2, p=1).
    pub fn owasp(timeout: Duration) -> Result<Self, AuthError> {
        Self::new(Params::default(), timeout)
    }

    /// Cheapest valid parameters; for tests and local seeding only.
    pub fn insecure_fast() -> Result<Self, AuthError> {
        let params = Params::new(Params::MIN_M_COST, Params::MIN_T_COST, Params::MIN_P_COST, None)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        Self::new(params, Duration::from_secs(5))
    }

    /// Hash synchronously (startup seeding, migrations).
    pub fn hash_blocking(&self, password: &str) -> Result<String, AuthError> {
        hash_with(self.params.clone(), password)
    }

    pub async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let params = self.params.clone();
        let password = password.to_string();
        self.run(move || hash_with(params, &password)).await?
    }

    /// Constant-time comparison of `password` against a stored PHC hash.
    /// A malformed stored hash counts as a mismatch.
    pub async fn verify(&self, password: &str, stored_hash: &str) -> Result<bool, AuthError> {
        let params = self.params.clone();
        let password = password.to_string();
        let stored = stored_hash.to_string();
        self.run(move || verify_with(params, &password, &stored)).await
    }

    /// Spend one verification's worth of time without a real account.
    pub async fn verify_dummy(&self, password: &str) -> Result<(), AuthError> {
        let dummy = self.dummy_hash.clone();
        self.verify(password, &dummy).await.map(|_| ())
    }

    async fn run<T, F>(&self, f: F) -> Result<T, AuthError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        tokio::time::timeout(self.timeout, tokio::task::spawn_blocking(f))
            .await
            .map_err(|_| AuthError::Timeout("password hashing"))?
            .map_err(|e| AuthError::Internal(format!("hashing task failed: {e}")))
    }
}
