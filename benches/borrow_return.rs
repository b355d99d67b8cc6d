// Borrow/return overhead of the pool engine.
//
// The resource is free to create and always valid, so only pool
// bookkeeping is measured.

use std::hint::black_box;
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use poolkeeper::{GenericFactory, PoolConfig, ResourcePool};

fn bench_pool(max: usize) -> ResourcePool<GenericFactory<u64>> {
    let config = PoolConfig::new()
        .with_min(0)
        .with_max(max)
        .with_acquire_timeout(Duration::from_secs(5))
        .without_eviction();
    ResourcePool::named("bench", GenericFactory::new(|| Ok(0u64)), config).expect("failed to create pool")
}

fn explicit_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("failed to build runtime");
    let pool = bench_pool(64);

    c.bench_function("borrow_release", |b| {
        b.to_async(&rt).iter(|| {
            let pool = pool.clone();
            async move {
                let resource = pool.borrow().await.unwrap();
                black_box(*resource);
                pool.release(resource).await;
            }
        });
    });
}

fn drop_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("failed to build runtime");
    let pool = bench_pool(64);

    c.bench_function("borrow_drop", |b| {
        b.to_async(&rt).iter(|| {
            let pool = pool.clone();
            async move {
                let resource = pool.borrow().await.unwrap();
                drop(resource);
                // let the spawned return run
                tokio::task::yield_now().await;
                black_box(())
            }
        });
    });
}

fn scoped_use(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("failed to build runtime");
    let pool = bench_pool(64);

    c.bench_function("with_resource", |b| {
        b.to_async(&rt).iter(|| {
            let pool = pool.clone();
            async move {
                let value: Result<u64, poolkeeper::PoolError> = pool
                    .with_resource(|value| Box::pin(async move { Ok(*value + 1) }))
                    .await;
                black_box(value.unwrap())
            }
        });
    });
}

fn contended(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("failed to build runtime");

    // Few slots so borrowers queue.
    let pool = bench_pool(4);

    c.bench_function("contended_borrow_release_4slots", |b| {
        b.to_async(&rt).iter(|| {
            let pool = pool.clone();
            async move {
                let tasks: Vec<_> = (0..16)
                    .map(|_| {
                        let pool = pool.clone();
                        tokio::spawn(async move {
                            let resource = pool.borrow().await.unwrap();
                            pool.release(resource).await;
                        })
                    })
                    .collect();
                for task in tasks {
                    task.await.unwrap();
                }
            }
        });
    });
}

criterion_group!(benches, explicit_release, drop_release, scoped_use, contended);
criterion_main!(benches);
