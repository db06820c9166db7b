//! Infrastructure layer: Postgres directory, Redis session cache, config.

pub mod config;
pub mod directory;
pub mod session;

mod integration_tests;

pub use config::{ConfigError, Settings, StoreSettings};
pub use directory::PostgresDirectory;
#[cfg(feature = "redis")]
pub use session::RedisSessionCache;
