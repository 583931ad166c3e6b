use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lcsc_client::cache::cache_key;
use lcsc_client::{Cache, HttpRequest, MemoryCache, RateLimiter};
use std::time::Duration;
use tokio::runtime::Runtime;

fn bench_cache(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let cache = rt.block_on(async { MemoryCache::new(Duration::from_secs(300)) });
    let body = Bytes::from(vec![b'x'; 4096]);

    rt.block_on(async {
        for i in 0..1000 {
            cache
                .set(&format!("GET:USD:/product/detail?productCode=C{i}"), body.clone(), Duration::ZERO)
                .await;
        }
    });

    c.bench_function("memory_cache_get_hit", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(cache.get("GET:USD:/product/detail?productCode=C500").await)
        });
    });

    c.bench_function("memory_cache_get_miss", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(cache.get("GET:USD:/product/detail?productCode=missing").await)
        });
    });

    c.bench_function("memory_cache_set", |b| {
        b.to_async(&rt).iter(|| async {
            cache
                .set("GET:USD:/search/global?keyword=ne555", body.clone(), Duration::ZERO)
                .await;
        });
    });

    rt.block_on(cache.close());
}

fn bench_cache_key(c: &mut Criterion) {
    let get = HttpRequest::get("search/global")
        .with_query("keyword", "STM32F103")
        .with_query("currentPage", "1")
        .with_query("pageSize", "25");
    let post = HttpRequest::post("search/global")
        .with_json(&serde_json::json!({ "keyword": "lm358", "currentPage": 1 }))
        .unwrap();

    c.bench_function("cache_key_get", |b| b.iter(|| cache_key(black_box(&get), "USD")));
    c.bench_function("cache_key_post_body", |b| {
        b.iter(|| cache_key(black_box(&post), "USD"));
    });
}

fn bench_rate_limiter(c: &mut Criterion) {
    // High enough that the bucket never runs dry during the measurement.
    let limiter = RateLimiter::new(1e12).unwrap();

    c.bench_function("rate_limiter_try_acquire", |b| {
        b.iter(|| black_box(limiter.try_acquire()));
    });
}

criterion_group!(benches, bench_cache, bench_cache_key, bench_rate_limiter);
criterion_main!(benches);
