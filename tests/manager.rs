//! Pool manager end to end

use async_trait::async_trait;
use poolkeeper::{
    DatabaseDriver, DatabaseFactory, GenericFactory, HealthState, ManagerConfig,
    ManagerConfiguration, PoolConfig, PoolError, PoolKind, PoolManager, PoolResult,
    RecommendationKind, ResourcePool,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

struct FlakyDriver {
    up: Arc<AtomicBool>,
}

#[async_trait]
impl DatabaseDriver for FlakyDriver {
    type Connection = u32;

    async fn connect(&self) -> PoolResult<u32> {
        if self.up.load(Ordering::SeqCst) {
            Ok(7)
        } else {
            Err(PoolError::CreationFailure("database unreachable".into()))
        }
    }

    async fn disconnect(&self, _connection: u32) -> PoolResult<()> {
        Ok(())
    }

    async fn ping(&self, _connection: &u32) -> PoolResult<()> {
        if self.up.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PoolError::RequestFailed("ping failed".into()))
        }
    }
}

fn quiet() -> ManagerConfig {
    ManagerConfig::default().with_metrics(false).with_auto_cleanup(false)
}

fn config(min: usize, max: usize) -> PoolConfig {
    PoolConfig::new()
        .with_min(min)
        .with_max(max)
        .with_acquire_timeout(Duration::from_millis(30))
        .without_eviction()
}

#[tokio::test]
async fn database_pool_failures_show_up_in_report() {
    let manager = PoolManager::new(quiet());
    let up = Arc::new(AtomicBool::new(true));
    let factory = DatabaseFactory::new(FlakyDriver { up: Arc::clone(&up) });
    let db = manager.create_database_pool("db", factory, config(1, 1)).await.unwrap();

    let held = db.borrow().await.unwrap();
    assert_eq!(*held, 7);
    assert!(matches!(db.borrow().await, Err(PoolError::AcquisitionTimeout(_))));

    up.store(false, Ordering::SeqCst);
    db.release(held).await;
    assert!(matches!(db.borrow().await, Err(PoolError::CreationFailure(_))));

    let report = manager.generate_performance_report();
    let kinds: Vec<_> = report.recommendations.iter().map(|r| r.kind).collect();
    assert!(kinds.contains(&RecommendationKind::InvestigateFactory));
    assert!(kinds.contains(&RecommendationKind::RaiseAcquireTimeout));
    assert_eq!(report.pools["db"].kind, PoolKind::Database);
}

#[tokio::test]
async fn registry_round_trip() {
    let manager = PoolManager::new(quiet());
    manager
        .create_generic_pool("words", GenericFactory::new(|| Ok(String::new())), config(0, 3))
        .await
        .unwrap();
    manager.create_map_pool::<u32, String>("lookup", config(0, 2)).await.unwrap();

    assert_eq!(manager.pool_names(), vec!["lookup".to_string(), "words".to_string()]);

    let words: ResourcePool<GenericFactory<String>> = manager.get_pool("words").unwrap();
    let mut word = words.borrow().await.unwrap();
    word.push_str("pooled");
    words.release(word).await;
    assert_eq!(manager.get_all_pool_stats()["words"].returned, 1);

    assert_eq!(
        manager.get_pool::<GenericFactory<u32>>("words").unwrap_err(),
        PoolError::TypeMismatch("words".into())
    );

    manager.remove_pool("words").await.unwrap();
    assert!(words.is_destroyed());
    assert_eq!(manager.pool_names(), vec!["lookup".to_string()]);
}

#[tokio::test]
async fn overall_health_tracks_worst_pool() {
    let manager = PoolManager::new(quiet());
    let small = manager.create_buffer_pool("small", 16, config(0, 1)).await.unwrap();
    manager.create_buffer_pool("roomy", 16, config(2, 8)).await.unwrap();

    let held = small.borrow().await.unwrap();
    let waiter = {
        let small = small.clone();
        tokio::spawn(async move { small.borrow().await.is_ok() })
    };
    while small.waiting_count() == 0 {
        tokio::task::yield_now().await;
    }

    let health = manager.health_check();
    assert_eq!(health.status, HealthState::Critical);
    assert_eq!(health.pools["roomy"].status, HealthState::Healthy);

    small.release(held).await;
    assert!(waiter.await.unwrap());
}

#[tokio::test]
async fn exported_configuration_parses_back() {
    let manager = PoolManager::new(quiet());
    manager.create_buffer_pool("frames", 2048, config(1, 4)).await.unwrap();
    manager.create_set_pool::<u64>("seen", config(0, 2)).await.unwrap();

    let json = manager.export_configuration().to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["pools"]["frames"]["type"], "buffer");
    assert_eq!(value["pools"]["frames"]["options"]["max"], 4);
    assert_eq!(value["pools"]["seen"]["type"], "set");

    let parsed = ManagerConfiguration::from_json(&json).unwrap();
    assert_eq!(parsed, manager.export_configuration());
}

#[tokio::test(start_paused = true)]
async fn background_cleanup_clears_idle_resources() {
    let manager = Arc::new(PoolManager::new(
        ManagerConfig::default()
            .with_metrics(false)
            .with_cleanup_interval(Duration::from_secs(60)),
    ));
    let pool = manager.create_buffer_pool("buffers", 8, config(2, 4)).await.unwrap();
    manager.start();

    tokio::time::sleep(Duration::from_secs(130)).await;

    let stats = pool.get_stats();
    assert_eq!(stats.destroyed, 4);
    assert_eq!(stats.created, 6);
    assert_eq!(stats.idle, 2);
    manager.destroy().await;
}
