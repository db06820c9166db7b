//! Environment-driven configuration.
//!
//! Every knob has a default except the secrets persistent mode cannot run
//! without. Malformed values fail startup with the variable name in the
//! error, rather than silently falling back.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use cockpit_auth::{CacheFailurePolicy, RevocationMode, TokenConfig};

const DEV_JWT_SECRET: &str = "insecure-dev-secret-do-not-use-in-production";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Where users, roles and sessions live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub use_persistent: bool,
    pub database_url: Option<String>,
    pub redis_url: String,
    pub redis_key_prefix: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub token: TokenConfig,
    pub hash_timeout: Duration,
    pub stores: StoreSettings,
    /// Password for the seeded `admin` account (dev seed / bootstrap).
    pub admin_password: Option<String>,
}

impl Settings {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup` (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let use_persistent: bool = parse_or(&get, "USE_PERSISTENT_STORES", false)?;
        let database_url = get("DATABASE_URL");
        if use_persistent && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None if use_persistent => return Err(ConfigError::Missing("JWT_SECRET")),
            None => {
                warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };

        let revocation = match get("ACCESS_REVOCATION").as_deref() {
            None | Some("stateless") => RevocationMode::Stateless,
            Some("session") => RevocationMode::Session,
            Some(other) => return Err(invalid("ACCESS_REVOCATION", other, "expected 'stateless' or 'session'")),
        };
        let cache_failure_policy = match get("CACHE_FAILURE_POLICY").as_deref() {
            None | Some("fail_closed") => CacheFailurePolicy::FailClosed,
            Some("signature_only") => CacheFailurePolicy::SignatureOnly,
            Some(other) => {
                return Err(invalid(
                    "CACHE_FAILURE_POLICY",
                    other,
                    "expected 'fail_closed' or 'signature_only'",
                ));
            }
        };

        let access_ttl = positive_secs(&get, "ACCESS_TOKEN_TTL_SECS", 86_400)?;
        let refresh_ttl = positive_secs(&get, "REFRESH_TOKEN_TTL_SECS", 604_800)?;
        let leeway_secs: u32 = parse_or(&get, "TOKEN_LEEWAY_SECS", 0)?;
        let cache_timeout = Duration::from_millis(parse_or(&get, "CACHE_TIMEOUT_MS", 2_000u64)?);
        let hash_timeout = Duration::from_millis(parse_or(&get, "HASH_TIMEOUT_MS", 5_000u64)?);

        let token = TokenConfig::new(secret)
            .with_issuer(get("JWT_ISSUER").unwrap_or_else(|| "ai-cockpit".to_string()))
            .with_access_ttl(access_ttl)
            .with_refresh_ttl(refresh_ttl)
            .with_leeway_secs(i64::from(leeway_secs))
            .with_cache_timeout(cache_timeout)
            .with_revocation(revocation)
            .with_cache_failure_policy(cache_failure_policy);
        token.validate().map_err(|e| invalid("JWT_SECRET", "<redacted>", &e.to_string()))?;

        Ok(Self {
            bind_addr: parse_or(&get, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            token,
            hash_timeout,
            stores: StoreSettings {
                use_persistent,
                database_url,
                redis_url: get("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".to_string()),
                redis_key_prefix: get("REDIS_KEY_PREFIX").unwrap_or_else(|| "cockpit:session:".to_string()),
            },
            admin_password: get("ADMIN_PASSWORD"),
        })
    }
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(var, &raw, &e.to_string())),
    }
}

fn positive_secs<G>(get: &G, var: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let secs: u64 = parse_or(get, var, default)?;
    if secs == 0 {
        return Err(invalid(var, "0", "must be positive"));
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(move |k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_in_dev_mode() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.bind_addr.port(), 8080);
        assert_eq!(s.token.issuer, "ai-cockpit");
        assert_eq!(s.token.access_ttl, Duration::from_secs(86_400));
        assert_eq!(s.token.refresh_ttl, Duration::from_secs(604_800));
        assert_eq!(s.token.revocation, RevocationMode::Stateless);
        assert_eq!(s.token.cache_failure_policy, CacheFailurePolicy::FailClosed);
        assert_eq!(s.stores.redis_key_prefix, "cockpit:session:");
        assert!(!s.stores.use_persistent);
        assert_eq!(s.hash_timeout, Duration::from_secs(5));
    }

    #[test]
    fn persistent_mode_requires_secrets() {
        assert_eq!(
            settings(&[("USE_PERSISTENT_STORES", "true")]).unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );
        assert_eq!(
            settings(&[("USE_PERSISTENT_STORES", "true"), ("DATABASE_URL", "postgres://x")]).unwrap_err(),
            ConfigError::Missing("JWT_SECRET")
        );
    }

    #[test]
    fn malformed_values_name_the_variable() {
        match settings(&[("ACCESS_TOKEN_TTL_SECS", "soon")]).unwrap_err() {
            ConfigError::Invalid { var, .. } => assert_eq!(var, "ACCESS_TOKEN_TTL_SECS"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            settings(&[("ACCESS_REVOCATION", "sometimes")]),
            Err(ConfigError::Invalid { var: "ACCESS_REVOCATION", .. })
        ));
        assert!(matches!(
            settings(&[("REFRESH_TOKEN_TTL_SECS", "0")]),
            Err(ConfigError::Invalid { var: "REFRESH_TOKEN_TTL_SECS", .. })
        ));
    }

    #[test]
    fn overrides_are_read() {
        let s = settings(&[
            ("JWT_SECRET", "0123456789abcdef0123456789abcdef"),
            ("ACCESS_REVOCATION", "session"),
            ("CACHE_FAILURE_POLICY", "signature_only"),
            ("TOKEN_LEEWAY_SECS", "30"),
            ("BIND_ADDR", "127.0.0.1:9000"),
        ])
        .unwrap();
        assert_eq!(s.token.revocation, RevocationMode::Session);
        assert_eq!(s.token.cache_failure_policy, CacheFailurePolicy::SignatureOnly);
        assert_eq!(s.token.leeway_secs, 30);
        assert_eq!(s.bind_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
    }
}
