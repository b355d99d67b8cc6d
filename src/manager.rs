//! Named registry of pools with background monitoring
//!
//! A [`PoolManager`] owns pools of any resource type behind the object-safe
//! [`ManagedPool`] trait. Typed access goes through [`PoolManager::get_pool`],
//! which downcasts back to the concrete [`ResourcePool`].

use crate::adapters::database::{DatabaseDriver, DatabaseFactory};
use crate::adapters::generic::{
    BufferPool, GenericFactory, MapPool, SetPool, buffer_factory, map_factory, set_factory,
};
use crate::adapters::http::{HttpClientOptions, HttpClientPool};
use crate::config::PoolConfig;
use crate::errors::{PoolError, PoolResult};
use crate::factory::ResourceFactory;
use crate::health::{HealthState, PoolHealth};
use crate::metrics::PoolStats;
use crate::pool::ResourcePool;
use crate::report::{PoolDescriptor, PoolKind};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Alerts kept in `recent_alerts` of the comprehensive stats
const RECENT_ALERTS: usize = 10;

/// Type-erased view of a pool the manager can monitor and tear down
#[async_trait]
pub trait ManagedPool: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn kind(&self) -> &'static str;

    /// Pool options, with `max` reflecting any resize
    fn config(&self) -> PoolConfig;

    fn stats(&self) -> PoolStats;

    fn health(&self) -> PoolHealth;

    async fn clear(&self) -> PoolResult<()>;

    async fn destroy(&self);

    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
impl<F: ResourceFactory> ManagedPool for ResourcePool<F> {
    fn name(&self) -> &str {
        ResourcePool::name(self)
    }

    fn kind(&self) -> &'static str {
        self.factory().kind()
    }

    fn config(&self) -> PoolConfig {
        PoolConfig {
            max: self.max(),
            ..ResourcePool::config(self).clone()
        }
    }

    fn stats(&self) -> PoolStats {
        self.get_stats()
    }

    fn health(&self) -> PoolHealth {
        self.health_check()
    }

    async fn clear(&self) -> PoolResult<()> {
        ResourcePool::clear(self).await
    }

    async fn destroy(&self) {
        ResourcePool::destroy(self).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Settings for the manager's background tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerConfig {
    /// Period of metrics collection
    #[serde(with = "crate::config::duration_ms")]
    pub metrics_interval: Duration,

    /// Period of the cleanup pass that clears every pool
    #[serde(with = "crate::config::duration_ms")]
    pub cleanup_interval: Duration,

    pub enable_metrics: bool,
    pub enable_auto_cleanup: bool,

    /// Metrics snapshots kept in memory
    pub history_limit: usize,

    /// Alerts kept in memory
    pub alert_limit: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            metrics_interval: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(300),
            enable_metrics: true,
            enable_auto_cleanup: true,
            history_limit: 100,
            alert_limit: 100,
        }
    }
}

impl ManagerConfig {
    pub fn with_metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = interval;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }

    pub fn with_auto_cleanup(mut self, enabled: bool) -> Self {
        self.enable_auto_cleanup = enabled;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }
}

/// Resource usage of the current process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessUsage {
    pub memory_bytes: u64,
    pub virtual_memory_bytes: u64,
    pub cpu_percent: f32,

    /// Time since the manager was created
    #[serde(with = "crate::config::duration_ms")]
    pub uptime: Duration,
}

/// A pool that crossed a health threshold during metrics collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub pool: String,
    pub level: HealthState,
    pub message: String,

    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

/// Stats of every pool at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub timestamp: u64,
    pub pools: BTreeMap<String, PoolStats>,
    pub process: ProcessUsage,
}

/// Sums over every registered pool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolTotals {
    pub pools: usize,
    pub idle: usize,
    pub in_use: usize,
    pub waiting: usize,
    pub created: u64,
    pub destroyed: u64,
    pub borrowed: u64,
    pub failed_borrows: u64,
    pub timed_out_borrows: u64,
}

impl PoolTotals {
    fn add(&mut self, stats: &PoolStats) {
        self.pools += 1;
        self.idle += stats.idle;
        self.in_use += stats.in_use;
        self.waiting += stats.waiting;
        self.created += stats.created;
        self.destroyed += stats.destroyed;
        self.borrowed += stats.borrowed;
        self.failed_borrows += stats.failed_borrows;
        self.timed_out_borrows += stats.timed_out_borrows;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComprehensiveStats {
    pub pools: BTreeMap<String, PoolStats>,
    pub totals: PoolTotals,
    pub process: ProcessUsage,
    pub recent_alerts: Vec<Alert>,
}

/// Health of every pool; `status` is the worst of them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerHealth {
    pub status: HealthState,
    pub pools: BTreeMap<String, PoolHealth>,
    pub issues: Vec<String>,
}

impl ManagerHealth {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }
}

#[derive(Clone)]
pub(crate) struct RegisteredPool {
    pub pool: Arc<dyn ManagedPool>,
    pub descriptor: PoolDescriptor,
}

/// Registry of named pools
///
/// # Examples
///
/// ```
/// use poolkeeper::{ManagerConfig, PoolConfig, PoolManager};
///
/// # #[tokio::main]
/// # async fn main() -> poolkeeper::PoolResult<()> {
/// let manager = PoolManager::new(ManagerConfig::default());
/// let buffers = manager.create_buffer_pool("buffers", 4096, PoolConfig::new()).await?;
///
/// let buf = buffers.borrow().await?;
/// assert_eq!(buf.len(), 4096);
/// buffers.release(buf).await;
///
/// assert!(manager.health_check().is_healthy());
/// manager.destroy().await;
/// # Ok(())
/// # }
/// ```
pub struct PoolManager {
    config: ManagerConfig,
    pools: DashMap<String, RegisteredPool>,
    history: Mutex<VecDeque<MetricsSnapshot>>,
    alerts: Mutex<VecDeque<Alert>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started_at: Instant,
    #[cfg(feature = "sysinfo")]
    system: Mutex<sysinfo::System>,
}

impl Default for PoolManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl PoolManager {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            pools: DashMap::new(),
            history: Mutex::new(VecDeque::new()),
            alerts: Mutex::new(VecDeque::new()),
            tasks: Mutex::new(Vec::new()),
            started_at: Instant::now(),
            #[cfg(feature = "sysinfo")]
            system: Mutex::new(sysinfo::System::new()),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Spawn the metrics and cleanup tasks enabled in the config
    ///
    /// The tasks hold a weak reference and stop when the manager is
    /// dropped or destroyed.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            debug!("Pool manager already started");
            return;
        }

        if self.config.enable_metrics && !self.config.metrics_interval.is_zero() {
            tasks.push(spawn_job(Arc::downgrade(self), self.config.metrics_interval, Job::Metrics));
        }
        if self.config.enable_auto_cleanup && !self.config.cleanup_interval.is_zero() {
            tasks.push(spawn_job(Arc::downgrade(self), self.config.cleanup_interval, Job::Cleanup));
        }

        info!(
            metrics_interval = ?self.config.metrics_interval,
            cleanup_interval = ?self.config.cleanup_interval,
            tasks = tasks.len(),
            "Pool manager started"
        );
    }

    /// Create, initialize and register a pool over caller-supplied closures
    pub async fn create_generic_pool<R: Send + Sync + 'static>(
        &self,
        name: &str,
        factory: GenericFactory<R>,
        config: PoolConfig,
    ) -> PoolResult<ResourcePool<GenericFactory<R>>> {
        let descriptor = PoolDescriptor::new(PoolKind::Generic, config.clone());
        self.build(name, factory, config, descriptor).await
    }

    /// Create a pool of zeroed byte buffers of `size` bytes
    pub async fn create_buffer_pool(
        &self,
        name: &str,
        size: usize,
        config: PoolConfig,
    ) -> PoolResult<BufferPool> {
        let descriptor = PoolDescriptor::new(PoolKind::Buffer, config.clone()).with_buffer_size(size);
        self.build(name, buffer_factory(size), config, descriptor).await
    }

    pub async fn create_map_pool<K, V>(&self, name: &str, config: PoolConfig) -> PoolResult<MapPool<K, V>>
    where
        K: Eq + Hash + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        let descriptor = PoolDescriptor::new(PoolKind::Map, config.clone());
        self.build(name, map_factory(), config, descriptor).await
    }

    pub async fn create_set_pool<T>(&self, name: &str, config: PoolConfig) -> PoolResult<SetPool<T>>
    where
        T: Eq + Hash + Send + Sync + 'static,
    {
        let descriptor = PoolDescriptor::new(PoolKind::Set, config.clone());
        self.build(name, set_factory(), config, descriptor).await
    }

    pub async fn create_http_pool(
        &self,
        name: &str,
        options: HttpClientOptions,
        config: PoolConfig,
    ) -> PoolResult<HttpClientPool> {
        self.ensure_vacant(name)?;
        let descriptor = PoolDescriptor::new(PoolKind::Http, config.clone()).with_http(options.clone());
        let pool = HttpClientPool::new(name, options, config)?;
        self.install(pool.pool().clone(), descriptor).await?;
        Ok(pool)
    }

    pub async fn create_database_pool<D: DatabaseDriver>(
        &self,
        name: &str,
        factory: DatabaseFactory<D>,
        config: PoolConfig,
    ) -> PoolResult<ResourcePool<DatabaseFactory<D>>> {
        let descriptor = PoolDescriptor::new(PoolKind::Database, config.clone());
        self.build(name, factory, config, descriptor).await
    }

    /// Register a pool built elsewhere under its own name
    ///
    /// The pool is initialized if it was not already.
    pub async fn register_pool<F: ResourceFactory>(&self, pool: ResourcePool<F>) -> PoolResult<()> {
        self.ensure_vacant(pool.name())?;
        let descriptor = PoolDescriptor::new(PoolKind::from_kind(pool.factory().kind()), pool.config().clone());
        self.install(pool, descriptor).await
    }

    /// Typed handle to a registered pool
    pub fn get_pool<F: ResourceFactory>(&self, name: &str) -> PoolResult<ResourcePool<F>> {
        let entry = self
            .pools
            .get(name)
            .ok_or_else(|| PoolError::PoolNotFound(name.to_string()))?;
        entry
            .pool
            .as_any()
            .downcast_ref::<ResourcePool<F>>()
            .cloned()
            .ok_or_else(|| PoolError::TypeMismatch(name.to_string()))
    }

    pub fn get_http_pool(&self, name: &str) -> PoolResult<HttpClientPool> {
        self.get_pool(name).map(HttpClientPool::from_pool)
    }

    /// Type-erased handle to a registered pool
    pub fn get_managed(&self, name: &str) -> PoolResult<Arc<dyn ManagedPool>> {
        self.pools
            .get(name)
            .map(|entry| Arc::clone(&entry.pool))
            .ok_or_else(|| PoolError::PoolNotFound(name.to_string()))
    }

    /// Unregister and destroy a pool
    pub async fn remove_pool(&self, name: &str) -> PoolResult<()> {
        let (_, registered) = self
            .pools
            .remove(name)
            .ok_or_else(|| PoolError::PoolNotFound(name.to_string()))?;
        registered.pool.destroy().await;
        info!(pool = %name, "Pool removed");
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pools.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn pool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Snapshot every pool, record it, and raise alerts for unhealthy pools
    pub fn collect_metrics(&self) -> MetricsSnapshot {
        let mut pools = BTreeMap::new();
        let mut raised = Vec::new();
        for (name, registered) in self.registered() {
            let stats = registered.pool.stats();
            let health = PoolHealth::from_stats(&stats);
            if health.status >= HealthState::Warning {
                raised.push(Alert {
                    pool: name.clone(),
                    level: health.status,
                    message: health.warnings.join("; "),
                    timestamp: unix_millis(),
                });
            }
            pools.insert(name, stats);
        }

        for alert in raised {
            self.raise(alert);
        }

        let snapshot = MetricsSnapshot {
            timestamp: unix_millis(),
            pools,
            process: self.process_usage(),
        };
        let mut history = self.history.lock();
        history.push_back(snapshot.clone());
        while history.len() > self.config.history_limit {
            history.pop_front();
        }
        debug!(pools = snapshot.pools.len(), "Collected pool metrics");
        snapshot
    }

    /// Clear every pool. Returns how many pools were cleared.
    pub async fn run_cleanup(&self) -> usize {
        let mut cleared = 0;
        for (name, registered) in self.registered() {
            match registered.pool.clear().await {
                Ok(()) => cleared += 1,
                Err(err) => warn!(pool = %name, error = %err, "Cleanup failed"),
            }
        }
        debug!(cleared, "Cleanup pass complete");
        cleared
    }

    pub fn metrics_history(&self) -> Vec<MetricsSnapshot> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().iter().cloned().collect()
    }

    pub fn get_all_pool_stats(&self) -> BTreeMap<String, PoolStats> {
        self.registered()
            .into_iter()
            .map(|(name, registered)| (name, registered.pool.stats()))
            .collect()
    }

    pub fn get_comprehensive_stats(&self) -> ComprehensiveStats {
        let pools = self.get_all_pool_stats();
        let mut totals = PoolTotals::default();
        for stats in pools.values() {
            totals.add(stats);
        }
        let recent_alerts = {
            let alerts = self.alerts.lock();
            let skip = alerts.len().saturating_sub(RECENT_ALERTS);
            alerts.iter().skip(skip).cloned().collect()
        };
        ComprehensiveStats {
            pools,
            totals,
            process: self.process_usage(),
            recent_alerts,
        }
    }

    /// Health of every pool; an empty manager is healthy
    pub fn health_check(&self) -> ManagerHealth {
        let mut status = HealthState::Healthy;
        let mut pools = BTreeMap::new();
        let mut issues = Vec::new();
        for (name, registered) in self.registered() {
            let health = registered.pool.health();
            status = status.max(health.status);
            issues.extend(health.warnings.iter().map(|w| format!("{name}: {w}")));
            pools.insert(name, health);
        }
        ManagerHealth {
            status,
            pools,
            issues,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stop background tasks and destroy every pool
    pub async fn destroy(&self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
        let names: Vec<String> = self.pools.iter().map(|entry| entry.key().clone()).collect();
        let mut destroyed = 0;
        for name in names {
            if let Some((_, registered)) = self.pools.remove(&name) {
                registered.pool.destroy().await;
                destroyed += 1;
            }
        }
        info!(destroyed, "Pool manager destroyed");
    }

    pub(crate) fn registered(&self) -> Vec<(String, RegisteredPool)> {
        let mut pools: Vec<_> = self
            .pools
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        pools.sort_by(|a, b| a.0.cmp(&b.0));
        pools
    }

    fn ensure_vacant(&self, name: &str) -> PoolResult<()> {
        if self.pools.contains_key(name) {
            return Err(PoolError::PoolAlreadyExists(name.to_string()));
        }
        Ok(())
    }

    async fn build<F: ResourceFactory>(
        &self,
        name: &str,
        factory: F,
        config: PoolConfig,
        descriptor: PoolDescriptor,
    ) -> PoolResult<ResourcePool<F>> {
        self.ensure_vacant(name)?;
        let pool = ResourcePool::named(name, factory, config)?;
        self.install(pool.clone(), descriptor).await?;
        Ok(pool)
    }

    /// Initialize and insert a pool, destroying it if the name was taken
    /// in the meantime
    async fn install<F: ResourceFactory>(
        &self,
        pool: ResourcePool<F>,
        descriptor: PoolDescriptor,
    ) -> PoolResult<()> {
        let name = pool.name().to_string();
        let kind = pool.factory().kind();
        pool.initialize().await?;

        let rejected = match self.pools.entry(name.clone()) {
            Entry::Occupied(_) => Some(pool),
            Entry::Vacant(slot) => {
                slot.insert(RegisteredPool {
                    pool: Arc::new(pool),
                    descriptor,
                });
                None
            }
        };
        if let Some(pool) = rejected {
            pool.destroy().await;
            return Err(PoolError::PoolAlreadyExists(name));
        }

        info!(pool = %name, kind, "Pool registered");
        Ok(())
    }

    fn raise(&self, alert: Alert) {
        warn!(pool = %alert.pool, level = %alert.level, message = %alert.message, "Pool alert");
        let mut alerts = self.alerts.lock();
        alerts.push_back(alert);
        while alerts.len() > self.config.alert_limit {
            alerts.pop_front();
        }
    }

    #[cfg(feature = "sysinfo")]
    fn process_usage(&self) -> ProcessUsage {
        use sysinfo::{ProcessesToUpdate, get_current_pid};

        let uptime = self.uptime();
        let Ok(pid) = get_current_pid() else {
            return ProcessUsage {
                uptime,
                ..Default::default()
            };
        };
        let mut system = self.system.lock();
        let _ = system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        match system.process(pid) {
            Some(process) => ProcessUsage {
                memory_bytes: process.memory(),
                virtual_memory_bytes: process.virtual_memory(),
                cpu_percent: process.cpu_usage(),
                uptime,
            },
            None => ProcessUsage {
                uptime,
                ..Default::default()
            },
        }
    }

    #[cfg(not(feature = "sysinfo"))]
    fn process_usage(&self) -> ProcessUsage {
        ProcessUsage {
            uptime: self.uptime(),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("pools", &self.pool_names())
            .field("config", &self.config)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum Job {
    Metrics,
    Cleanup,
}

fn spawn_job(manager: Weak<PoolManager>, period: Duration, job: Job) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(manager) = manager.upgrade() else {
                break;
            };
            match job {
                Job::Metrics => {
                    manager.collect_metrics();
                }
                Job::Cleanup => {
                    manager.run_cleanup().await;
                }
            }
        }
    })
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn small() -> PoolConfig {
        PoolConfig::new()
            .with_min(1)
            .with_max(2)
            .with_acquire_timeout(Duration::from_millis(50))
            .without_eviction()
    }

    fn quiet() -> ManagerConfig {
        ManagerConfig::default().with_metrics(false).with_auto_cleanup(false)
    }

    #[tokio::test]
    async fn test_create_and_get_typed_pool() {
        let manager = PoolManager::new(quiet());
        manager.create_buffer_pool("buffers", 64, small()).await.unwrap();

        let pool = manager.get_pool::<GenericFactory<Vec<u8>>>("buffers").unwrap();
        assert_eq!(pool.name(), "buffers");
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(manager.pool_names(), vec!["buffers".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let manager = PoolManager::new(quiet());
        manager.create_set_pool::<u32>("ids", small()).await.unwrap();

        let err = manager.create_map_pool::<String, u32>("ids", small()).await.unwrap_err();
        assert_eq!(err, PoolError::PoolAlreadyExists("ids".into()));
    }

    #[tokio::test]
    async fn test_wrong_type_and_missing_pool() {
        let manager = PoolManager::new(quiet());
        manager.create_buffer_pool("buffers", 8, small()).await.unwrap();

        let err = manager.get_pool::<GenericFactory<String>>("buffers").unwrap_err();
        assert_eq!(err, PoolError::TypeMismatch("buffers".into()));

        let err = manager.get_pool::<GenericFactory<Vec<u8>>>("nope").unwrap_err();
        assert_eq!(err, PoolError::PoolNotFound("nope".into()));
    }

    #[tokio::test]
    async fn test_remove_destroys_pool() {
        let manager = PoolManager::new(quiet());
        let pool = manager.create_buffer_pool("buffers", 8, small()).await.unwrap();

        manager.remove_pool("buffers").await.unwrap();
        assert!(pool.is_destroyed());
        assert!(manager.is_empty());
        assert_eq!(
            manager.remove_pool("buffers").await.unwrap_err(),
            PoolError::PoolNotFound("buffers".into())
        );
    }

    #[tokio::test]
    async fn test_register_existing_pool() {
        let manager = PoolManager::new(quiet());
        let factory = GenericFactory::new(|| Ok(String::from("conn")));
        let pool = ResourcePool::named("strings", factory, small()).unwrap();

        manager.register_pool(pool.clone()).await.unwrap();
        assert_eq!(pool.idle_count(), 1);
        assert!(manager.get_pool::<GenericFactory<String>>("strings").is_ok());
    }

    #[tokio::test]
    async fn test_health_is_worst_of_pools() {
        let manager = PoolManager::new(quiet());
        manager.create_buffer_pool("calm", 8, small()).await.unwrap();
        let busy = manager
            .create_buffer_pool("busy", 8, small().with_max(1))
            .await
            .unwrap();

        assert!(manager.health_check().is_healthy());

        let held = busy.borrow().await.unwrap();
        let health = manager.health_check();
        assert_eq!(health.status, HealthState::Critical);
        assert_eq!(health.pools["calm"].status, HealthState::Healthy);
        assert!(health.issues.iter().all(|issue| issue.starts_with("busy:")));
        busy.release(held).await;
    }

    #[tokio::test]
    async fn test_collect_metrics_records_alerts_and_history() {
        let manager = PoolManager::new(quiet().with_history_limit(2));
        let pool = manager
            .create_buffer_pool("hot", 8, small().with_max(1))
            .await
            .unwrap();
        let held = pool.borrow().await.unwrap();

        for _ in 0..3 {
            let snapshot = manager.collect_metrics();
            assert_eq!(snapshot.pools["hot"].in_use, 1);
        }

        assert_eq!(manager.metrics_history().len(), 2);
        let alerts = manager.alerts();
        assert_eq!(alerts.len(), 3);
        assert_eq!(alerts[0].level, HealthState::Critical);
        assert_eq!(manager.get_comprehensive_stats().recent_alerts.len(), 3);
        pool.release(held).await;
    }

    #[tokio::test]
    async fn test_comprehensive_totals() {
        let manager = PoolManager::new(quiet());
        manager.create_buffer_pool("a", 8, small()).await.unwrap();
        manager.create_set_pool::<u8>("b", small().with_min(2)).await.unwrap();

        let stats = manager.get_comprehensive_stats();
        assert_eq!(stats.totals.pools, 2);
        assert_eq!(stats.totals.idle, 3);
        assert_eq!(stats.totals.created, 3);
    }

    #[tokio::test]
    async fn test_cleanup_clears_every_pool() {
        let manager = PoolManager::new(quiet());
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let factory = GenericFactory::new(move || Ok(counter.fetch_add(1, Ordering::SeqCst)));
        manager.create_generic_pool("numbers", factory, small()).await.unwrap();

        assert_eq!(manager.run_cleanup().await, 1);
        assert_eq!(created.load(Ordering::SeqCst), 2);
        let stats = manager.get_all_pool_stats();
        assert_eq!(stats["numbers"].destroyed, 1);
        assert_eq!(stats["numbers"].idle, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_metrics_task() {
        let manager = Arc::new(PoolManager::new(
            ManagerConfig::default()
                .with_metrics_interval(Duration::from_millis(100))
                .with_auto_cleanup(false),
        ));
        manager.create_buffer_pool("buffers", 8, small()).await.unwrap();
        manager.start();

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(manager.metrics_history().len(), 3);

        manager.destroy().await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(manager.metrics_history().len(), 3);
    }

    #[tokio::test]
    async fn test_destroy_tears_down_everything() {
        let manager = PoolManager::new(quiet());
        let a = manager.create_buffer_pool("a", 8, small()).await.unwrap();
        let b = manager.create_map_pool::<u8, u8>("b", small()).await.unwrap();

        manager.destroy().await;
        assert!(a.is_destroyed());
        assert!(b.is_destroyed());
        assert!(manager.is_empty());
    }
}
