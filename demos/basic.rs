//! Basic usage examples for ResourcePool

use poolkeeper::{GenericFactory, PoolConfig, PoolResult, ResourcePool};
use std::time::Duration;

#[tokio::main]
async fn main() -> PoolResult<()> {
    println!("=== poolkeeper - Basic Examples ===\n");

    // Example 1: Simple pool of strings
    simple_pool().await?;

    // Example 2: Pool with configuration
    configured_pool().await?;

    // Example 3: Try borrow
    try_borrow().await?;

    // Example 4: Metrics and health
    metrics_and_health().await?;

    Ok(())
}

async fn simple_pool() -> PoolResult<()> {
    println!("1. Simple Pool:");
    let factory = GenericFactory::new(|| Ok(String::from("hello")));
    let pool = ResourcePool::new(factory, PoolConfig::default())?;

    {
        let obj = pool.borrow().await?;
        println!("   Got resource {}: {}", obj.id(), *obj);
        pool.release(obj).await;
    }

    println!("   Idle after return: {}\n", pool.idle_count());
    Ok(())
}

async fn configured_pool() -> PoolResult<()> {
    println!("2. Configured Pool:");

    let config = PoolConfig::new()
        .with_min(3)
        .with_max(5)
        .with_acquire_timeout(Duration::from_secs(2))
        .with_lifo(false);

    let factory = GenericFactory::new(|| Ok(vec![0u8; 256])).with_validate(|buf| buf.len() == 256);
    let pool = ResourcePool::named("buffers", factory, config)?;
    pool.initialize().await?;
    println!("   Pre-created: {}", pool.idle_count());

    let obj1 = pool.borrow().await?;
    let obj2 = pool.borrow().await?;
    println!("   Borrowed: {}", pool.borrowed_count());
    println!("   Idle: {}", pool.idle_count());
    pool.release(obj1).await;
    pool.release(obj2).await;

    println!("   After return - Idle: {}\n", pool.idle_count());
    pool.destroy().await;
    Ok(())
}

async fn try_borrow() -> PoolResult<()> {
    println!("3. Try Borrow:");
    let factory = GenericFactory::new(|| Ok(42u32));
    let pool = ResourcePool::new(factory, PoolConfig::new().with_max(1))?;

    let obj1 = pool.try_borrow().await;
    assert!(obj1.is_some());
    println!("   First try: Success");

    let obj2 = pool.try_borrow().await;
    assert!(obj2.is_none());
    println!("   Second try: None (pool exhausted)");

    if let Some(obj) = obj1 {
        pool.release(obj).await;
    }

    let obj3 = pool.try_borrow().await;
    assert!(obj3.is_some());
    println!("   Third try: Success\n");
    Ok(())
}

async fn metrics_and_health() -> PoolResult<()> {
    println!("4. Metrics and Health:");
    let factory = GenericFactory::new(|| Ok(0u64));
    let pool = ResourcePool::named("counters", factory, PoolConfig::new().with_max(5))?;

    let held = borrow_many(&pool, 4).await?;

    let stats = pool.get_stats();
    println!("   Created: {}", stats.created);
    println!("   Borrowed: {}", stats.borrowed);
    println!("   Utilization: {:.1}%", stats.utilization());

    let health = pool.health_check();
    println!("   Status: {}", health.status);
    for warning in &health.warnings {
        println!("   Warning: {}", warning);
    }

    for obj in held {
        pool.release(obj).await;
    }
    println!("   Health after return: {}", pool.health_check().status);
    Ok(())
}

async fn borrow_many(
    pool: &ResourcePool<GenericFactory<u64>>,
    count: usize,
) -> PoolResult<Vec<poolkeeper::PooledResource<GenericFactory<u64>>>> {
    let mut held = Vec::with_capacity(count);
    for _ in 0..count {
        held.push(pool.borrow().await?);
    }
    Ok(held)
}
