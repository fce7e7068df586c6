use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use query_mcp::prelude::*;
use serde_json::json;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

// Same latency and pacing as the server defaults, so numbers reflect what a
// client would see.
fn executor() -> Arc<ToolExecutor> {
    let config = ServerConfig::default();
    Arc::new(ToolExecutor::from_config(
        Arc::new(default_registry().unwrap()),
        Arc::new(MockSource::new(config.query_latency)),
        Arc::new(Metrics::new()),
        &config,
    ))
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn bench_single_query(c: &mut Criterion) {
    let rt = runtime();
    let ex = executor();
    c.bench_function("single_query_albums", |b| {
        b.to_async(&rt).iter(|| async {
            let out = ex
                .invoke(ToolInvocation::new("query_albums", json!({})), CancellationToken::new())
                .await;
            black_box(out);
        });
    });
}

fn bench_concurrent_queries(c: &mut Criterion) {
    let rt = runtime();
    let ex = executor();
    let mut group = c.benchmark_group("concurrent_query_songs");
    group.sample_size(20);
    for concurrency in [10usize, 50, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(concurrency), &concurrency, |b, &n| {
            b.to_async(&rt).iter(|| {
                let ex = ex.clone();
                async move {
                    let calls: Vec<_> = (0..n)
                        .map(|_| {
                            let ex = ex.clone();
                            tokio::spawn(async move {
                                ex.invoke(ToolInvocation::new("query_songs", json!({})), CancellationToken::new())
                                    .await
                            })
                        })
                        .collect();
                    for call in futures::future::join_all(calls).await {
                        black_box(call.unwrap());
                    }
                }
            });
        });
    }
    group.finish();
}

fn bench_streaming_query(c: &mut Criterion) {
    let rt = runtime();
    let ex = executor();
    let mut group = c.benchmark_group("streaming");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));
    group.bench_function("streaming_query_songs", |b| {
        b.to_async(&rt).iter(|| async {
            let out = ex
                .invoke(
                    ToolInvocation::new("streaming_query", json!({"table": "songs"})),
                    CancellationToken::new(),
                )
                .await;
            black_box(out);
        });
    });
    group.finish();
}

fn bench_list_tools(c: &mut Criterion) {
    let registry = default_registry().unwrap();
    c.bench_function("list_tools", |b| {
        b.iter(|| black_box(registry.to_json()));
    });
}

criterion_group!(
    benches,
    bench_single_query,
    bench_concurrent_queries,
    bench_streaming_query,
    bench_list_tools
);
criterion_main!(benches);
