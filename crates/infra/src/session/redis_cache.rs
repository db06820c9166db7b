//! Redis-backed session cache.
//!
//! - **Keys**: `{prefix}{kind}:{username}` (default prefix `cockpit:session:`)
//! - **Writes**: `SET key value PX ttl_ms` (last writer wins)
//! - **Rotation**: one Lua script does GET-compare-SET, so the check and the
//!   replacement are a single atomic step on the server

use std::time::Duration;

use async_trait::async_trait;
use redis::Script;
use redis::aio::MultiplexedConnection;
use tracing::instrument;

use cockpit_auth::{CacheError, SessionCache, SessionKey};

pub const DEFAULT_KEY_PREFIX: &str = "cockpit:session:";

const COMPARE_AND_SWAP: &str = r#"
local current = redis.call('GET', KEYS[1])
if current == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2], 'PX', ARGV[3])
    return 1
end
return 0
"#;

#[derive(Clone)]
pub struct RedisSessionCache {
    conn: MultiplexedConnection,
    prefix: String,
    cas: Script,
}

impl core::fmt::Debug for RedisSessionCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisSessionCache")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

fn map_redis_error(operation: &str, err: redis::RedisError) -> CacheError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
        CacheError::Unavailable(format!("{operation}: {err}"))
    } else {
        CacheError::Command(format!("{operation}: {err}"))
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    // PX 0 is rejected by Redis.
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl RedisSessionCache {
    /// Open a multiplexed connection to `redis_url`.
    ///
    /// * `redis_url` - e.g. "redis://localhost:6379"
    /// * `prefix` - key namespace; `None` uses `cockpit:session:`
    pub async fn connect(redis_url: impl AsRef<str>, prefix: Option<String>) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(|e| map_redis_error("open", e))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| map_redis_error("connect", e))?;

        Ok(Self {
            conn,
            prefix: prefix.unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
            cas: Script::new(COMPARE_AND_SWAP),
        })
    }

    fn key(&self, key: &SessionKey) -> String {
        format!("{}{}", self.prefix, key.as_str())
    }
}

#[async_trait]
impl SessionCache for RedisSessionCache {
    #[instrument(skip(self), fields(key = %key), err)]
    async fn get(&self, key: &SessionKey) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(self.key(key))
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .map_err(|e| map_redis_error("GET", e))
    }

    #[instrument(skip(self, value), fields(key = %key, ttl_ms = ttl_millis(ttl)), err)]
    async fn set(&self, key: &SessionKey, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| map_redis_error("SET", e))
    }

    #[instrument(skip(self), fields(key = %key), err)]
    async fn delete(&self, key: &SessionKey) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("DEL", e))?;
        Ok(removed > 0)
    }

    #[instrument(skip(self, expected, new_value), fields(key = %key), err)]
    async fn compare_and_swap(
        &self,
        key: &SessionKey,
        expected: &str,
        new_value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let swapped: i64 = self
            .cas
            .key(self.key(key))
            .arg(expected)
            .arg(new_value)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("EVALSHA compare-and-swap", e))?;
        Ok(swapped == 1)
    }
}
