//! 路由解析与令牌池性能基准测试
//!
//! 使用 Criterion 框架进行性能测试，包括：
//! - 不同扩展数量下的首条匹配解析
//! - 路由表缓存命中
//! - 令牌池入池/出池

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;
use tao_core::{
    ControllerRegistry, Extension, ExtensionRegistry, Resolver, RoutingConfig, TokenStore,
};

/// 创建包含 `count` 个扩展的解析器，目标扩展排在最后
fn resolver_with(count: usize) -> Resolver {
    let mut extensions: Vec<Extension> = (0..count)
        .map(|i| {
            Extension::new(format!("ext{}", i))
                .with_namespace_route(format!("ext{}", i), format!("oat::ext{}::controller", i))
        })
        .collect();
    extensions.push(Extension::new("taoTarget"));

    let registry = ExtensionRegistry::from_extensions(extensions).unwrap();
    let resolver = Resolver::new(
        Arc::new(registry),
        Arc::new(ControllerRegistry::new()),
        RoutingConfig::default(),
    );
    resolver.warm_up().unwrap();
    resolver
}

// ============================================================================
// 解析基准测试
// ============================================================================

fn resolve_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_first_match");

    for count in [1usize, 10, 50, 200] {
        let resolver = resolver_with(count);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(count), &resolver, |b, resolver| {
            b.iter(|| resolver.resolve_url(black_box("/taoTarget/Items/edit?uri=1")).unwrap());
        });
    }

    group.finish();
}

fn resolve_full_url_benchmark(c: &mut Criterion) {
    let resolver = resolver_with(10);
    c.bench_function("resolve_full_url", |b| {
        b.iter(|| {
            resolver
                .resolve_url(black_box("https://tao.example/ext3/Delivery/run?id=42#top"))
                .unwrap()
        });
    });
}

fn route_table_cache_benchmark(c: &mut Criterion) {
    let resolver = resolver_with(50);
    let extension = Extension::new("ext25");
    c.bench_function("route_table_cache_hit", |b| {
        b.iter(|| resolver.route_table(black_box(&extension)).unwrap());
    });
}

// ============================================================================
// 令牌池基准测试
// ============================================================================

fn token_store_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_store");

    group.bench_function("push_pop", |b| {
        let store = TokenStore::new(15, Duration::from_secs(30));
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            store.push(format!("token_{}", i));
            store.pop()
        });
    });

    group.bench_function("push_evict_full", |b| {
        let store = TokenStore::new(15, Duration::from_secs(30));
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            store.push(format!("token_{}", i))
        });
    });

    group.bench_function("expire_old_tokens", |b| {
        let store = TokenStore::new(15, Duration::from_secs(30));
        for i in 0..15 {
            store.push(format!("token_{}", i));
        }
        b.iter(|| store.expire_old_tokens());
    });

    group.finish();
}

criterion_group!(
    benches,
    resolve_benchmark,
    resolve_full_url_benchmark,
    route_table_cache_benchmark,
    token_store_benchmark
);
criterion_main!(benches);
