//! In-memory session cache for tests/dev.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::session::{CacheError, SessionCache, SessionKey};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// TTL map behind one mutex; compare-and-swap holds the lock for the whole
/// read-compare-write.
#[derive(Debug, Default)]
pub struct InMemorySessionCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|m| m.values().filter(|e| e.live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> CacheError {
    CacheError::Unavailable("session map lock poisoned".to_string())
}

#[async_trait]
impl SessionCache for InMemorySessionCache {
    async fn get(&self, key: &SessionKey) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let mut map = self.entries.lock().map_err(|_| poisoned())?;
        match map.get(key.as_str()) {
            Some(e) if e.live(now) => Ok(Some(e.value.clone())),
            Some(_) => {
                map.remove(key.as_str());
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &SessionKey, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut map = self.entries.lock().map_err(|_| poisoned())?;
        map.insert(
            key.as_str().to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &SessionKey) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut map = self.entries.lock().map_err(|_| poisoned())?;
        Ok(map.remove(key.as_str()).is_some_and(|e| e.live(now)))
    }

    async fn compare_and_swap(
        &self,
        key: &SessionKey,
        expected: &str,
        new_value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut map = self.entries.lock().map_err(|_| poisoned())?;
        match map.get_mut(key.as_str()) {
            Some(e) if e.live(now) && e.value == expected => {
                e.value = new_value.to_string();
                e.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokenKind;

    fn key() -> SessionKey {
        SessionKey::new(TokenKind::Refresh, "alice")
    }

    #[tokio::test]
    async fn cas_requires_matching_value() {
        let cache = InMemorySessionCache::new();
        let ttl = Duration::from_secs(60);
        cache.set(&key(), "a", ttl).await.unwrap();

        assert!(!cache.compare_and_swap(&key(), "x", "b", ttl).await.unwrap());
        assert!(cache.compare_and_swap(&key(), "a", "b", ttl).await.unwrap());
        assert!(!cache.compare_and_swap(&key(), "a", "c", ttl).await.unwrap());
        assert_eq!(cache.get(&key()).await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn expired_entries_are_invisible() {
        let cache = InMemorySessionCache::new();
        cache.set(&key(), "a", Duration::from_millis(0)).await.unwrap();
        assert_eq!(cache.get(&key()).await.unwrap(), None);
        assert!(!cache.compare_and_swap(&key(), "a", "b", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let cache = InMemorySessionCache::new();
        cache.set(&key(), "a", Duration::from_secs(60)).await.unwrap();
        assert!(cache.delete(&key()).await.unwrap());
        assert!(!cache.delete(&key()).await.unwrap());
        assert!(cache.is_empty());
    }
}
