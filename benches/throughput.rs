use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use ledger_reckoning::balance::cache_key;
use ledger_reckoning::stores::{BalanceCache, InMemoryCache, InMemoryLedger, InMemorySnapshotStore, Stores};
use ledger_reckoning::{AccountId, DeriveOptions, Engine, UserId};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

const HISTORY: u64 = 10_000;

/// An engine with one account carrying `HISTORY` deposits.
fn seeded(rt: &Runtime) -> (Arc<Engine>, Arc<InMemoryCache>, AccountId) {
    let cache = Arc::new(InMemoryCache::new());
    let engine = Arc::new(Engine::new(
        Stores::new(
            Arc::new(InMemoryLedger::new()),
            Arc::new(InMemorySnapshotStore::new()),
            cache.clone(),
        ),
        DeriveOptions::default(),
    ));
    let account = rt.block_on(async {
        let user = UserId::generate();
        let account = engine.create_account(user, "bench").await.unwrap().id;
        for _ in 0..HISTORY {
            engine.deposit(user, account, dec!(1.25)).await.unwrap();
        }
        account
    });
    (engine, cache, account)
}

fn balance_reads(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (engine, cache, account) = seeded(&rt);
    let key = cache_key(account);

    let mut group = c.benchmark_group("balance");
    group.throughput(Throughput::Elements(1));
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("cached_read_10K_history", |b| {
        b.to_async(&rt)
            .iter(|| async { engine.balance(account).await.unwrap() });
    });

    group.bench_function("full_replay_10K_history", |b| {
        b.to_async(&rt).iter(|| async {
            cache.delete(&key).await.unwrap();
            engine.balance(account).await.unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, balance_reads);
criterion_main!(benches);
