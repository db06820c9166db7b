//! Effective roles and permissions of a user.
//!
//! Resolution is explicit: `user_role` ids → enabled roles → `role_permission`
//! ids → enabled permissions, each step one store call over an id list.
//! Disablement is per node: a permission under a disabled parent still
//! resolves.

use std::collections::BTreeSet;

use tracing::{debug, instrument};

use cockpit_core::{PermissionId, RoleId, UserId};

use crate::store::PermissionStore;
use crate::tree::{PermissionNode, build_tree};
use crate::{AuthError, DataScope, Permission, PermissionCode, Role, RoleCode};

/// Roles, permissions and data scope of one user, computed together.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrincipalData {
    pub roles: BTreeSet<RoleCode>,
    pub permissions: BTreeSet<PermissionCode>,
    pub data_scope: DataScope,
}

pub struct PermissionResolver<S> {
    store: S,
}

impl<S: PermissionStore> PermissionResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn enabled_roles(&self, user_id: UserId) -> Result<Vec<Role>, AuthError> {
        let mut role_ids = self.store.role_ids_for_user(user_id).await?;
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }
        role_ids.sort();
        role_ids.dedup();
        let roles = self.store.roles_by_ids(&role_ids).await?;
        Ok(roles.into_iter().filter(|r| r.enabled).collect())
    }

    async fn enabled_permissions_of(&self, role_ids: &[RoleId]) -> Result<Vec<Permission>, AuthError> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut ids: Vec<PermissionId> = self.store.permission_ids_for_roles(role_ids).await?;
        ids.sort();
        ids.dedup();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let perms = self.store.permissions_by_ids(&ids).await?;
        Ok(perms.into_iter().filter(|p| p.enabled).collect())
    }

    /// Deduplicated codes of every enabled permission reachable through the
    /// user's enabled roles. No roles yields an empty set.
    #[instrument(skip(self), err)]
    pub async fn resolve_permissions(&self, user_id: UserId) -> Result<BTreeSet<PermissionCode>, AuthError> {
        Ok(self.resolve_principal_data(user_id).await?.permissions)
    }

    #[instrument(skip(self), err)]
    pub async fn resolve_roles(&self, user_id: UserId) -> Result<BTreeSet<RoleCode>, AuthError> {
        let roles = self.enabled_roles(user_id).await?;
        Ok(roles.into_iter().map(|r| r.code).collect())
    }

    /// Roles, permissions and the broadest data scope among enabled roles
    /// (`SELF` when there are none).
    #[instrument(skip(self), err)]
    pub async fn resolve_principal_data(&self, user_id: UserId) -> Result<PrincipalData, AuthError> {
        let roles = self.enabled_roles(user_id).await?;
        let role_ids: Vec<RoleId> = roles.iter().map(|r| r.id).collect();
        let permissions = self.enabled_permissions_of(&role_ids).await?;

        let data = PrincipalData {
            data_scope: roles
                .iter()
                .map(|r| r.data_scope)
                .max()
                .unwrap_or(DataScope::OwnOnly),
            roles: roles.into_iter().map(|r| r.code).collect(),
            permissions: permissions.into_iter().map(|p| p.code).collect(),
        };
        debug!(
            roles = data.roles.len(),
            permissions = data.permissions.len(),
            "resolved principal data"
        );
        Ok(data)
    }

    /// Enabled permission codes granted by one role.
    #[instrument(skip(self), err)]
    pub async fn role_permissions(&self, role_code: &str) -> Result<BTreeSet<PermissionCode>, AuthError> {
        let role = self
            .store
            .role_by_code(role_code)
            .await?
            .ok_or_else(|| AuthError::RoleNotFound(role_code.to_string()))?;
        let perms = self.enabled_permissions_of(&[role.id]).await?;
        Ok(perms.into_iter().map(|p| p.code).collect())
    }

    #[instrument(skip(self), err)]
    pub async fn permission_by_code(&self, code: &str) -> Result<Permission, AuthError> {
        self.store
            .permission_by_code(code)
            .await?
            .ok_or_else(|| AuthError::PermissionNotFound(code.to_string()))
    }

    /// The whole catalog as a forest.
    #[instrument(skip(self), err)]
    pub async fn permission_tree(&self) -> Result<Vec<PermissionNode>, AuthError> {
        build_tree(self.store.all_permissions().await?)
    }

    /// The forest restricted to the user's enabled permissions. A granted node
    /// whose parent is not granted becomes a root.
    #[instrument(skip(self), err)]
    pub async fn user_permission_tree(&self, user_id: UserId) -> Result<Vec<PermissionNode>, AuthError> {
        let roles = self.enabled_roles(user_id).await?;
        let role_ids: Vec<RoleId> = roles.iter().map(|r| r.id).collect();
        build_tree(self.enabled_permissions_of(&role_ids).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::in_memory_store::InMemoryDirectory;
    use crate::tree::flatten;
    use crate::{PermissionKind, User};

    fn codes(set: &BTreeSet<PermissionCode>) -> Vec<&str> {
        set.iter().map(|c| c.as_str()).collect()
    }

    /// alice holds EDITOR; VIEWER exists but is not hers.
    fn seeded() -> Arc<InMemoryDirectory> {
        let dir = InMemoryDirectory::new();
        dir.insert_user(User::new(UserId::new(1), "alice", "h")).unwrap();
        dir.insert_user(User::new(UserId::new(2), "nobody", "h")).unwrap();

        dir.insert_permission(Permission::new(PermissionId::new(1), "dataset", "Datasets", PermissionKind::Menu))
            .unwrap();
        dir.insert_permission(
            Permission::new(PermissionId::new(2), "dataset:read", "Read", PermissionKind::Api)
                .with_parent(PermissionId::new(1)),
        )
        .unwrap();
        dir.insert_permission(
            Permission::new(PermissionId::new(3), "dataset:write", "Write", PermissionKind::Api)
                .with_parent(PermissionId::new(1)),
        )
        .unwrap();

        dir.insert_role(Role::new(RoleId::new(1), "EDITOR", "Editor").with_data_scope(DataScope::Department))
            .unwrap();
        dir.insert_role(Role::new(RoleId::new(2), "VIEWER", "Viewer")).unwrap();
        dir.grant_permission(RoleId::new(1), PermissionId::new(2)).unwrap();
        dir.grant_permission(RoleId::new(1), PermissionId::new(3)).unwrap();
        dir.grant_permission(RoleId::new(2), PermissionId::new(2)).unwrap();
        dir.assign_role(UserId::new(1), RoleId::new(1)).unwrap();
        Arc::new(dir)
    }

    #[tokio::test]
    async fn resolves_only_held_roles() {
        let resolver = PermissionResolver::new(seeded());
        let perms = resolver.resolve_permissions(UserId::new(1)).await.unwrap();
        assert_eq!(codes(&perms), vec!["dataset:read", "dataset:write"]);

        let roles = resolver.resolve_roles(UserId::new(1)).await.unwrap();
        assert_eq!(roles.into_iter().collect::<Vec<_>>(), vec![RoleCode::new("EDITOR")]);
    }

    #[tokio::test]
    async fn no_roles_is_empty_not_error() {
        let resolver = PermissionResolver::new(seeded());
        let data = resolver.resolve_principal_data(UserId::new(2)).await.unwrap();
        assert!(data.permissions.is_empty());
        assert!(data.roles.is_empty());
        assert_eq!(data.data_scope, DataScope::OwnOnly);
    }

    #[tokio::test]
    async fn disabled_permission_is_filtered_but_children_are_not() {
        let dir = seeded();
        dir.set_permission_enabled(PermissionId::new(3), false).unwrap();
        dir.set_permission_enabled(PermissionId::new(1), false).unwrap();
        dir.grant_permission(RoleId::new(1), PermissionId::new(1)).unwrap();

        let resolver = PermissionResolver::new(dir);
        let perms = resolver.resolve_permissions(UserId::new(1)).await.unwrap();
        assert_eq!(codes(&perms), vec!["dataset:read"]);
    }

    #[tokio::test]
    async fn disabled_role_contributes_nothing() {
        let dir = seeded();
        dir.insert_role(Role::new(RoleId::new(3), "GHOST", "Ghost").disabled()).unwrap();
        dir.insert_permission(Permission::new(PermissionId::new(9), "model:deploy", "Deploy", PermissionKind::Api))
            .unwrap();
        dir.grant_permission(RoleId::new(3), PermissionId::new(9)).unwrap();
        dir.assign_role(UserId::new(1), RoleId::new(3)).unwrap();

        let resolver = PermissionResolver::new(dir);
        let data = resolver.resolve_principal_data(UserId::new(1)).await.unwrap();
        assert!(!data.roles.contains(&RoleCode::new("GHOST")));
        assert!(!data.permissions.contains(&PermissionCode::new("model:deploy")));
        assert_eq!(data.data_scope, DataScope::Department);
    }

    #[tokio::test]
    async fn unknown_codes_are_typed_errors() {
        let resolver = PermissionResolver::new(seeded());
        assert_eq!(
            resolver.role_permissions("AUDITOR").await,
            Err(AuthError::RoleNotFound("AUDITOR".to_string()))
        );
        assert_eq!(
            resolver.permission_by_code("nope").await,
            Err(AuthError::PermissionNotFound("nope".to_string()))
        );
        let viewer = resolver.role_permissions("VIEWER").await.unwrap();
        assert_eq!(codes(&viewer), vec!["dataset:read"]);
    }

    #[tokio::test]
    async fn user_tree_promotes_orphans_to_roots() {
        let resolver = PermissionResolver::new(seeded());
        let tree = resolver.user_permission_tree(UserId::new(1)).await.unwrap();
        let roots: Vec<&str> = tree.iter().map(|n| n.permission.code.as_str()).collect();
        assert_eq!(roots, vec!["dataset:read", "dataset:write"]);

        let full = resolver.permission_tree().await.unwrap();
        assert_eq!(full.len(), 1);
        assert_eq!(flatten(&full).len(), 3);
    }

    mod proptest_tests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig { cases: 64, ..ProptestConfig::default() })]

            /// Permissions reachable through several roles appear once, and the
            /// result is exactly the union of the roles' grants.
            #[test]
            fn overlapping_roles_union_once(
                grants in prop::collection::vec(prop::collection::btree_set(1i64..=8, 0..6), 1..5)
            ) {
                let dir = InMemoryDirectory::new();
                dir.insert_user(User::new(UserId::new(1), "u", "h")).unwrap();
                for p in 1..=8 {
                    dir.insert_permission(Permission::new(
                        PermissionId::new(p),
                        format!("perm:{p}"),
                        format!("Perm {p}"),
                        PermissionKind::Api,
                    ))
                    .unwrap();
                }
                let mut expected = BTreeSet::new();
                for (i, set) in grants.iter().enumerate() {
                    let role_id = RoleId::new(i as i64 + 1);
                    dir.insert_role(Role::new(role_id, format!("R{i}"), format!("Role {i}"))).unwrap();
                    dir.assign_role(UserId::new(1), role_id).unwrap();
                    for p in set {
                        dir.grant_permission(role_id, PermissionId::new(*p)).unwrap();
                        expected.insert(PermissionCode::new(format!("perm:{p}")));
                    }
                }

                let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
                let resolver = PermissionResolver::new(dir);
                let got = rt.block_on(resolver.resolve_permissions(UserId::new(1))).unwrap();
                prop_assert_eq!(got, expected);
            }
        }
    }
}
