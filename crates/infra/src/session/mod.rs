//! Session cache adapters.

#[cfg(feature = "redis")]
pub mod redis_cache;

#[cfg(feature = "redis")]
pub use redis_cache::{DEFAULT_KEY_PREFIX, RedisSessionCache};
