//! Advanced features: eviction, resizing, custom factories, the manager

use async_trait::async_trait;
use poolkeeper::{
    DatabaseDriver, DatabaseFactory, GenericFactory, ManagerConfig, MetricsExporter, PoolConfig,
    PoolManager, PoolResult, ResourceFactory, ResourcePool,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug)]
struct Connection {
    id: usize,
    healthy: Arc<AtomicBool>,
}

/// Hands out fake connections that can be switched off together
struct ConnectionFactory {
    next: AtomicUsize,
    healthy: Arc<AtomicBool>,
}

#[async_trait]
impl ResourceFactory for ConnectionFactory {
    type Resource = Connection;

    async fn create(&self) -> PoolResult<Connection> {
        Ok(Connection {
            id: self.next.fetch_add(1, Ordering::SeqCst),
            healthy: Arc::clone(&self.healthy),
        })
    }

    async fn validate(&self, conn: &Connection) -> bool {
        conn.healthy.load(Ordering::SeqCst)
    }

    fn kind(&self) -> &'static str {
        "connection"
    }
}

struct LoopbackDriver;

#[async_trait]
impl DatabaseDriver for LoopbackDriver {
    type Connection = String;

    async fn connect(&self) -> PoolResult<String> {
        Ok("loopback".to_string())
    }

    async fn disconnect(&self, _connection: String) -> PoolResult<()> {
        Ok(())
    }

    async fn ping(&self, _connection: &String) -> PoolResult<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> PoolResult<()> {
    println!("=== poolkeeper - Advanced Features ===\n");

    // Example 1: Eviction
    eviction().await?;

    // Example 2: Resizing
    resizing().await?;

    // Example 3: Prometheus metrics
    prometheus_export().await?;

    // Example 4: Pool manager
    manager().await?;

    Ok(())
}

async fn eviction() -> PoolResult<()> {
    println!("1. Eviction:");

    let healthy = Arc::new(AtomicBool::new(true));
    let factory = ConnectionFactory {
        next: AtomicUsize::new(0),
        healthy: Arc::clone(&healthy),
    };
    let config = PoolConfig::new()
        .with_min(0)
        .with_max(3)
        .with_soft_idle_timeout(Duration::from_millis(50))
        .with_eviction(Duration::from_millis(100), 3);
    let pool = ResourcePool::new(factory, config)?;
    pool.initialize().await?;

    let a = pool.borrow().await?;
    let b = pool.borrow().await?;
    println!("   Borrowed connections {} and {}", a.id, b.id);
    pool.release(a).await;
    pool.release(b).await;

    sleep(Duration::from_millis(250)).await;
    println!("   Idle after eviction passes (still valid): {}", pool.idle_count());

    healthy.store(false, Ordering::SeqCst);
    sleep(Duration::from_millis(250)).await;
    println!("   Idle after connections went bad: {}", pool.idle_count());
    println!("   Evicted: {}", pool.get_stats().idle_evictions);

    pool.destroy().await;
    println!();
    Ok(())
}

async fn resizing() -> PoolResult<()> {
    println!("2. Resizing:");

    let factory = GenericFactory::new(|| Ok(vec![0u8; 64]));
    let pool = ResourcePool::named("scratch", factory, PoolConfig::new().with_min(8).with_max(10))?;
    pool.initialize().await?;
    println!("   Idle before resize: {}", pool.idle_count());

    pool.resize(3).await?;
    println!("   Idle after resize(3): {}", pool.idle_count());
    println!("   Destroyed: {}", pool.get_stats().destroyed);

    match pool.resize(2).await {
        Ok(()) => println!("   Unexpectedly resized below min"),
        Err(e) => println!("   Error: {}", e),
    }

    println!();
    Ok(())
}

async fn prometheus_export() -> PoolResult<()> {
    println!("3. Prometheus Metrics Export:");

    let factory = GenericFactory::new(|| Ok(0u32));
    let pool = ResourcePool::named("example_pool", factory, PoolConfig::new().with_max(5))?;

    let _obj1 = pool.borrow().await?;
    let _obj2 = pool.borrow().await?;

    let mut tags = HashMap::new();
    tags.insert("service".to_string(), "example".to_string());
    tags.insert("env".to_string(), "dev".to_string());

    let prometheus_text = MetricsExporter::export_prometheus(&pool.get_stats(), pool.name(), Some(&tags))?;
    println!("{}", prometheus_text);
    Ok(())
}

async fn manager() -> PoolResult<()> {
    println!("4. Pool Manager:");

    let manager = Arc::new(PoolManager::new(
        ManagerConfig::default().with_metrics_interval(Duration::from_millis(100)),
    ));
    manager.start();

    let buffers = manager
        .create_buffer_pool("buffers", 1024, PoolConfig::new().with_min(2).with_max(4))
        .await?;
    manager
        .create_database_pool(
            "db",
            DatabaseFactory::new(LoopbackDriver).with_ping_timeout(Duration::from_millis(500)),
            PoolConfig::new().with_min(1).with_max(2),
        )
        .await?;

    let held = vec![buffers.borrow().await?, buffers.borrow().await?, buffers.borrow().await?, buffers.borrow().await?];
    sleep(Duration::from_millis(150)).await;

    let health = manager.health_check();
    println!("   Overall health: {}", health.status);
    for issue in &health.issues {
        println!("   Issue: {}", issue);
    }

    let report = manager.generate_performance_report();
    println!("   Pools: {}, resources: {}", report.summary.total_pools, report.summary.total_resources);
    for recommendation in &report.recommendations {
        println!("   Recommendation [{}]: {}", recommendation.pool, recommendation.message);
    }
    println!("   Alerts so far: {}", report.alerts.len());

    for buf in held {
        buffers.release(buf).await;
    }

    let exported = manager.export_configuration().to_json()?;
    println!("   Exported configuration:\n{}", exported);

    manager.destroy().await;
    Ok(())
}
