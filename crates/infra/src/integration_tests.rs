//! Adapter tests against live backends.
//!
//! Skipped unless `TEST_DATABASE_URL` (Postgres) or `TEST_REDIS_URL` (Redis,
//! `redis` feature) is set.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use cockpit_auth::{
        CredentialAuthenticator, InMemorySessionCache, PasswordHasher, PermissionResolver, TokenConfig,
        TokenService,
    };

    use crate::directory::PostgresDirectory;

    fn env(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }

    #[tokio::test]
    async fn postgres_directory_backs_a_full_login() {
        let Some(url) = env("TEST_DATABASE_URL") else {
            return;
        };
        let dir = Arc::new(PostgresDirectory::connect(&url).await.unwrap());
        dir.ensure_schema().await.unwrap();
        // Re-applying the schema is harmless.
        dir.ensure_schema().await.unwrap();

        let hasher = PasswordHasher::insecure_fast().unwrap();
        let username = format!("it-admin-{}", Utc::now().timestamp_micros());
        let hash = hasher.hash_blocking("it-password").unwrap();
        dir.bootstrap_admin(&username, &hash).await.unwrap();
        dir.bootstrap_admin(&username, "ignored").await.unwrap();

        let tokens = TokenService::new(
            TokenConfig::new("integration-secret-integration-secret"),
            Arc::new(InMemorySessionCache::new()),
        )
        .unwrap();
        let authn = CredentialAuthenticator::new(
            dir.clone(),
            Arc::new(PermissionResolver::new(dir.clone())),
            Arc::new(tokens),
            hasher,
        );

        let outcome = authn.login(&username, "it-password", None).await.unwrap();
        assert!(outcome.principal.has_role("ADMIN"));
        assert!(outcome.principal.has_permission("anything"));

        let ip = "127.0.0.1".parse().unwrap();
        authn.authenticate(&username, "it-password", Some(ip)).await.unwrap();
        let tree = authn.resolver().user_permission_tree(outcome.principal.user_id).await.unwrap();
        assert!(tree.iter().any(|n| n.permission.code.as_str() == "*"));
    }

    #[cfg(feature = "redis")]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn redis_rotation_is_single_use_under_contention() {
        use cockpit_auth::{DataScope, Principal, RoleCode};
        use cockpit_core::UserId;

        use crate::session::RedisSessionCache;

        let Some(url) = env("TEST_REDIS_URL") else {
            return;
        };
        let prefix = format!("cockpit:it:{}:", Utc::now().timestamp_micros());
        let cache = RedisSessionCache::connect(&url, Some(prefix)).await.unwrap();
        let svc = Arc::new(
            TokenService::new(TokenConfig::new("integration-secret-integration-secret"), cache).unwrap(),
        );

        let principal = Principal {
            user_id: UserId::new(7),
            username: "carol".to_string(),
            email: None,
            phone: None,
            roles: [RoleCode::new("VIEWER")].into_iter().collect(),
            permissions: Default::default(),
            data_scope: DataScope::OwnOnly,
        };
        let pair = svc.issue(&principal).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let svc = svc.clone();
            let refresh = pair.refresh_token.clone();
            handles.push(tokio::spawn(async move { svc.rotate(&refresh).await }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
