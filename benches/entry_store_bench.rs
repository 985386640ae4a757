// Throughput of EntryStore::get under read-heavy contention.

use cache_engine::definition::CacheDefinition;
use cache_engine::entry_store::EntryStore;
use cache_engine::loader::Loader;
use cache_engine::pool::ConnectionPool;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn seeded_loader(rt: &tokio::runtime::Runtime) -> Arc<Loader> {
    rt.block_on(async {
        let def = CacheDefinition {
            id: Uuid::new_v4(),
            name: "bench".into(),
            enabled: true,
            driver: "sqlite".into(),
            url: "sqlite::memory:".into(),
            username: String::new(),
            password: String::new(),
            query: "SELECT state FROM z WHERE zip = ?".into(),
            key_column: Some("zip".into()),
            value_column: "state".into(),
            max_size: 10_000,
            eviction_minutes: 0,
            max_connections: 4,
        };
        let pool = Arc::new(ConnectionPool::new(&def).unwrap());
        let mut conn = pool.borrow(Duration::from_secs(5)).await.unwrap();
        sqlx::query("CREATE TABLE z (zip TEXT PRIMARY KEY, state TEXT)")
            .execute(&mut *conn)
            .await
            .unwrap();
        sqlx::query("INSERT INTO z (zip, state) VALUES ('10001', 'NY')")
            .execute(&mut *conn)
            .await
            .unwrap();
        pool.release(conn);
        Arc::new(Loader::new(pool, &def, Duration::from_secs(5)))
    })
}

fn bench_warm_hit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let loader = seeded_loader(&rt);
    let store = EntryStore::new(10_000, 0);
    rt.block_on(store.get("10001", &loader)).unwrap();

    c.bench_function("entry_store_warm_hit", |b| {
        b.to_async(&rt)
            .iter(|| async { store.get("10001", &loader).await.unwrap() });
    });
}

fn bench_cold_single_flight(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let loader = seeded_loader(&rt);

    c.bench_function("entry_store_cold_single_flight_64", |b| {
        b.to_async(&rt).iter_batched(
            || EntryStore::new(10_000, 0),
            |store| {
                let store = Arc::new(store);
                let loader = loader.clone();
                async move {
                    let mut handles = Vec::with_capacity(64);
                    for _ in 0..64 {
                        let store = store.clone();
                        let loader = loader.clone();
                        handles.push(tokio::spawn(async move {
                            store.get("10001", &loader).await.unwrap()
                        }));
                    }
                    for h in handles {
                        h.await.unwrap();
                    }
                }
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_warm_hit, bench_cold_single_flight);
criterion_main!(benches);
