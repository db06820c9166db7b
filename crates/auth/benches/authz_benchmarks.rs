use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use cockpit_auth::{
    DataScope, InMemorySessionCache, Permission, PermissionCode, PermissionKind, Principal, RoleCode,
    TokenConfig, TokenService, build_tree, require_permission,
};
use cockpit_core::{PermissionId, UserId};

/// Catalog shaped like a menu: `fanout` children under each node, three levels.
fn catalog(size: usize, fanout: usize) -> Vec<Permission> {
    (0..size)
        .map(|i| {
            let p = Permission::new(
                PermissionId::new(i as i64 + 1),
                format!("perm:{i}"),
                format!("Permission {i}"),
                PermissionKind::Menu,
            )
            .with_sort_order((i % 7) as i32);
            if i < fanout {
                p
            } else {
                p.with_parent(PermissionId::new((i / fanout) as i64))
            }
        })
        .collect()
}

fn principal(permission_count: usize) -> Principal {
    Principal {
        user_id: UserId::new(1),
        username: "bench".to_string(),
        email: None,
        phone: None,
        roles: [RoleCode::new("EDITOR")].into_iter().collect(),
        permissions: (0..permission_count)
            .map(|i| PermissionCode::new(format!("perm:{i}")))
            .collect(),
        data_scope: DataScope::All,
    }
}

fn bench_tree_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("permission_tree_build");

    for size in [10usize, 100, 1_000, 10_000].iter() {
        let input = catalog(*size, 8);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| build_tree(black_box(input.clone())).unwrap());
        });
    }

    group.finish();
}

fn bench_token_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_validate");

    let rt = tokio::runtime::Runtime::new().unwrap();
    let svc = TokenService::new(
        TokenConfig::new("bench-secret-bench-secret-bench-secret"),
        InMemorySessionCache::new(),
    )
    .unwrap();
    let pair = rt.block_on(svc.issue(&principal(4))).unwrap();

    group.bench_function("hs256_validate", |b| {
        b.iter(|| svc.validate(black_box(&pair.access_token)).unwrap());
    });

    group.finish();
}

fn bench_permission_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("require_permission");

    for held in [10usize, 100, 1_000].iter() {
        let p = principal(*held);
        group.bench_with_input(BenchmarkId::new("miss", held), &p, |b, p| {
            b.iter(|| require_permission(black_box(p), "model:deploy").is_err());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tree_build, bench_token_validate, bench_permission_check);
criterion_main!(benches);
