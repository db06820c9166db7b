//! Session cache seam.
//!
//! Holds one token id per `"{kind}:{username}"` key with a TTL equal to the
//! token lifetime. Besides plain get/set/delete the seam exposes an atomic
//! compare-and-swap; refresh-token rotation depends on it being atomic on the
//! backend (a single Lua script in Redis, a single lock in memory).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::TokenKind;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("session cache unavailable: {0}")]
    Unavailable(String),

    #[error("session cache command failed: {0}")]
    Command(String),
}

/// Key of one session entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(kind: TokenKind, username: &str) -> Self {
        Self(format!("{}:{}", kind.as_str(), username))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn get(&self, key: &SessionKey) -> Result<Option<String>, CacheError>;

    /// Overwrite (last writer wins).
    async fn set(&self, key: &SessionKey, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Returns whether an entry existed.
    async fn delete(&self, key: &SessionKey) -> Result<bool, CacheError>;

    /// Replace the value only if it currently equals `expected`.
    ///
    /// Returns `false` when the entry is missing, expired or holds another
    /// value. Must be atomic with respect to every other call on the key.
    async fn compare_and_swap(
        &self,
        key: &SessionKey,
        expected: &str,
        new_value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError>;
}

#[async_trait]
impl<C> SessionCache for Arc<C>
where
    C: SessionCache + ?Sized,
{
    async fn get(&self, key: &SessionKey) -> Result<Option<String>, CacheError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &SessionKey, value: &str, ttl: Duration) -> Result<(), CacheError> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &SessionKey) -> Result<bool, CacheError> {
        (**self).delete(key).await
    }

    async fn compare_and_swap(
        &self,
        key: &SessionKey,
        expected: &str,
        new_value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        (**self).compare_and_swap(key, expected, new_value, ttl).await
    }
}
