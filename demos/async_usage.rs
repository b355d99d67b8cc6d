//! Async usage examples: waiting, timeouts, scoped use and concurrency

use poolkeeper::{GenericFactory, PoolConfig, PoolError, PoolResult, ResourcePool};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> PoolResult<()> {
    tracing_subscriber::fmt().with_env_filter("poolkeeper=debug").init();

    println!("=== poolkeeper - Async Examples ===\n");

    // Example 1: Waiting in line
    waiting_borrow().await?;

    // Example 2: Borrow with timeout
    borrow_with_timeout().await?;

    // Example 3: Scoped use
    scoped_use().await?;

    // Example 4: Concurrent access
    concurrent_access().await?;

    Ok(())
}

async fn waiting_borrow() -> PoolResult<()> {
    println!("1. Waiting Borrow:");
    let pool = ResourcePool::new(GenericFactory::new(|| Ok(1u32)), PoolConfig::new().with_max(1))?;

    let held = pool.borrow().await?;
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.borrow().await.map(|obj| obj.id()) })
    };

    sleep(Duration::from_millis(50)).await;
    println!("   Waiting borrowers: {}", pool.waiting_count());
    pool.release(held).await;

    match waiter.await {
        Ok(Ok(id)) => println!("   Waiter got resource {}", id),
        Ok(Err(e)) => println!("   Waiter failed: {}", e),
        Err(e) => println!("   Waiter panicked: {}", e),
    }

    println!();
    Ok(())
}

async fn borrow_with_timeout() -> PoolResult<()> {
    println!("2. Borrow with Timeout:");

    let config = PoolConfig::new()
        .with_max(1)
        .with_acquire_timeout(Duration::from_millis(100));
    let pool = ResourcePool::new(GenericFactory::new(|| Ok(42u32)), config)?;

    let _held = pool.borrow().await?;

    match pool.borrow().await {
        Ok(_) => println!("   Got resource"),
        Err(e) => println!("   Error: {}", e),
    }
    println!("   Timed out borrows: {}", pool.get_stats().timed_out_borrows);

    println!();
    Ok(())
}

async fn scoped_use() -> PoolResult<()> {
    println!("3. Scoped Use:");
    let factory = GenericFactory::new(|| Ok(String::new())).with_reset(|s| s.clear());
    let pool = ResourcePool::new(factory, PoolConfig::new().with_max(2))?;

    let len = pool
        .with_resource(|s| {
            Box::pin(async move {
                s.push_str("scoped");
                Ok::<_, PoolError>(s.len())
            })
        })
        .await?;
    println!("   Callback returned {}", len);

    let failed: Result<(), PoolError> = pool
        .with_resource(|_| Box::pin(async { Err(PoolError::RequestFailed("simulated".into())) }))
        .await;
    println!("   Failing callback: {:?}", failed.err());
    println!("   Pool size after both calls: {}", pool.size());

    println!();
    Ok(())
}

async fn concurrent_access() -> PoolResult<()> {
    println!("4. Concurrent Access:");

    let next = Arc::new(AtomicUsize::new(0));
    let factory = GenericFactory::new(move || Ok(next.fetch_add(1, Ordering::SeqCst)));
    let pool = ResourcePool::new(factory, PoolConfig::new().with_min(2).with_max(3))?;
    pool.initialize().await?;

    let mut handles = vec![];

    for i in 0..10 {
        let pool = pool.clone();
        let handle = tokio::spawn(async move {
            match pool.borrow().await {
                Ok(obj) => {
                    println!("   Task {} got resource {}", i, *obj);
                    sleep(Duration::from_millis(20)).await;
                    pool.release(obj).await;
                }
                Err(e) => println!("   Task {} failed: {}", i, e),
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        let _ = handle.await;
    }

    let stats = pool.get_stats();
    println!("   Created: {}, borrowed: {}", stats.created, stats.borrowed);
    println!("   Final idle: {}", pool.idle_count());
    pool.destroy().await;
    Ok(())
}
