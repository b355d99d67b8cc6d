//! Idle bookkeeping and the background eviction pass

use crate::factory::ResourceFactory;
use crate::metrics::StatsTracker;
use crate::pool::{PoolInner, ResourceId, ResourcePool};

use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// A resource sitting in (or passing through) the idle set
pub(crate) struct IdleEntry<R> {
    pub id: ResourceId,
    pub resource: R,
    pub created_at: Instant,
    pub idle_since: Instant,
}

impl<R> IdleEntry<R> {
    pub fn new(id: ResourceId, resource: R) -> Self {
        Self::with_created_at(id, resource, Instant::now())
    }

    pub fn with_created_at(id: ResourceId, resource: R, created_at: Instant) -> Self {
        Self {
            id,
            resource,
            created_at,
            idle_since: Instant::now(),
        }
    }

    pub fn idle_for(&self) -> Duration {
        self.idle_since.elapsed()
    }
}

/// Outcome of one eviction pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Idle resources past the soft idle timeout that were examined
    pub sampled: usize,

    /// Sampled resources that failed validation and were destroyed
    pub evicted: usize,
}

impl<F: ResourceFactory> PoolInner<F> {
    /// Examine up to `evictions_per_run` resources idle past the soft idle
    /// timeout and destroy those that fail validation.
    ///
    /// A resource that is idle too long but still valid stays in the pool.
    /// Survivors rejoin the back of the idle set, so successive passes work
    /// through every idle resource instead of re-sampling the same few.
    pub(crate) async fn run_eviction(&self) -> EvictionReport {
        let sampled: Vec<IdleEntry<F::Resource>> = {
            let mut state = self.state.lock();
            if state.destroyed || !self.config.test_on_idle {
                return EvictionReport::default();
            }

            let soft = self.config.soft_idle_timeout;
            let limit = self.config.evictions_per_run;
            let mut sampled = Vec::with_capacity(limit);
            let mut index = 0;
            // scan from the front; survivors of earlier passes sit at the back
            while index < state.idle.len() && sampled.len() < limit {
                if state.idle[index].idle_for() > soft {
                    if let Some(entry) = state.idle.remove(index) {
                        sampled.push(entry);
                    }
                } else {
                    index += 1;
                }
            }
            state.pending += sampled.len();
            sampled
        };

        let mut report = EvictionReport {
            sampled: sampled.len(),
            evicted: 0,
        };
        let mut survivors = Vec::with_capacity(sampled.len());
        let mut invalid = Vec::new();
        for entry in sampled {
            if self.factory.validate(&entry.resource).await {
                survivors.push(entry);
            } else {
                invalid.push(entry);
            }
        }

        let leftovers: Vec<_> = {
            let mut state = self.state.lock();
            state.pending = state.pending.saturating_sub(survivors.len() + invalid.len());
            let leftovers = survivors
                .into_iter()
                .filter_map(|entry| state.place(entry, false))
                .collect();
            state.grant_capacity();
            leftovers
        };

        for entry in invalid {
            StatsTracker::incr(&self.stats.invalid_resources);
            StatsTracker::incr(&self.stats.idle_evictions);
            debug!(pool = %self.name, resource_id = %entry.id, idle = ?entry.idle_for(), "Evicting idle resource");
            self.destroy_resource(entry).await;
            report.evicted += 1;
        }
        for entry in leftovers {
            self.destroy_resource(entry).await;
        }

        report
    }
}

impl<F: ResourceFactory> ResourcePool<F> {
    /// Run one eviction pass now, then top the pool back up to `min`
    pub async fn evict(&self) -> EvictionReport {
        let report = self.inner().run_eviction().await;
        self.inner().fill_to_min().await;
        report
    }
}

/// Spawn the periodic eviction task. It stops once the pool is dropped
/// or destroyed.
pub(crate) fn spawn_evictor<F: ResourceFactory>(
    pool: Weak<PoolInner<F>>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(inner) = pool.upgrade() else {
                break;
            };
            if inner.is_destroyed() {
                break;
            }
            let report = inner.run_eviction().await;
            let (created, _) = inner.fill_to_min().await;
            if report.sampled > 0 || created > 0 {
                debug!(
                    pool = %inner.name,
                    sampled = report.sampled,
                    evicted = report.evicted,
                    refilled = created,
                    "Eviction pass complete"
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::generic::GenericFactory;
    use crate::config::PoolConfig;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn idle_config() -> PoolConfig {
        PoolConfig::new()
            .with_min(0)
            .with_max(5)
            .with_soft_idle_timeout(Duration::from_millis(10))
            .with_eviction(Duration::ZERO, 2)
    }

    async fn pool_with_idle(
        count: usize,
        healthy: Arc<AtomicBool>,
        config: PoolConfig,
    ) -> ResourcePool<GenericFactory<u8>> {
        let factory = GenericFactory::new(|| Ok(0u8))
            .with_validate(move |_| healthy.load(Ordering::SeqCst));
        let pool = ResourcePool::new(factory, config).unwrap();
        let mut held = Vec::new();
        for _ in 0..count {
            held.push(pool.borrow().await.unwrap());
        }
        for resource in held {
            pool.release(resource).await;
        }
        pool
    }

    #[tokio::test]
    async fn test_idle_entry_ages() {
        let entry = IdleEntry::new(ResourceId(1), ());
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(entry.idle_for() >= Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_eviction_samples_at_most_per_run() {
        let healthy = Arc::new(AtomicBool::new(true));
        let pool = pool_with_idle(4, Arc::clone(&healthy), idle_config()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        healthy.store(false, Ordering::SeqCst);
        let report = pool.evict().await;
        assert_eq!(report, EvictionReport { sampled: 2, evicted: 2 });
        assert_eq!(pool.idle_count(), 2);
        assert_eq!(pool.get_stats().idle_evictions, 2);
    }

    #[tokio::test]
    async fn test_recently_used_resources_are_not_sampled() {
        let healthy = Arc::new(AtomicBool::new(true));
        let config = idle_config().with_soft_idle_timeout(Duration::from_secs(60));
        let pool = pool_with_idle(3, Arc::clone(&healthy), config).await;

        healthy.store(false, Ordering::SeqCst);

        let report = pool.evict().await;
        assert_eq!(report.sampled, 0);
        assert_eq!(pool.idle_count(), 3);
    }

    #[tokio::test]
    async fn test_valid_idle_resources_survive_eviction() {
        let healthy = Arc::new(AtomicBool::new(true));
        let pool = pool_with_idle(3, healthy, idle_config()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        for _ in 0..5 {
            let report = pool.evict().await;
            assert_eq!(report.evicted, 0);
        }
        assert_eq!(pool.idle_count(), 3);
        assert_eq!(pool.get_stats().destroyed, 0);
    }

    #[tokio::test]
    async fn test_passes_rotate_through_whole_idle_set() {
        let next = Arc::new(AtomicUsize::new(0));
        let factory = GenericFactory::new(move || Ok(next.fetch_add(1, Ordering::SeqCst)))
            .with_validate(|value| *value != 4);
        let config = idle_config().with_max(6).with_validation(false, false, true);
        let pool = ResourcePool::new(factory, config).unwrap();

        let mut held = Vec::new();
        for _ in 0..6 {
            held.push(pool.borrow().await.unwrap());
        }
        for resource in held {
            pool.release(resource).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut evicted = 0;
        for _ in 0..3 {
            let report = pool.evict().await;
            assert_eq!(report.sampled, 2);
            evicted += report.evicted;
        }
        assert_eq!(evicted, 1);
        assert_eq!(pool.idle_count(), 5);
        assert_eq!(pool.get_stats().idle_evictions, 1);

        // the remaining five are valid and keep rotating without loss
        for _ in 0..4 {
            assert_eq!(pool.evict().await.evicted, 0);
        }
        assert_eq!(pool.idle_count(), 5);
    }

    #[tokio::test]
    async fn test_idle_validation_disabled_skips_pass() {
        let healthy = Arc::new(AtomicBool::new(false));
        let config = idle_config().with_validation(false, false, false);
        let pool = pool_with_idle(2, healthy, config).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(pool.evict().await, EvictionReport::default());
        assert_eq!(pool.idle_count(), 2);
    }

    #[tokio::test]
    async fn test_eviction_refills_to_min() {
        let healthy = Arc::new(AtomicBool::new(true));
        let config = idle_config().with_min(2);
        let pool = pool_with_idle(2, Arc::clone(&healthy), config).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        healthy.store(false, Ordering::SeqCst);
        pool.evict().await;
        assert_eq!(pool.idle_count(), 2);
        assert_eq!(pool.get_stats().created, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_timer_evicts() {
        let healthy = Arc::new(AtomicBool::new(true));
        let config = idle_config().with_eviction(Duration::from_millis(100), 5);
        let pool = pool_with_idle(3, Arc::clone(&healthy), config).await;
        pool.initialize().await.unwrap();

        healthy.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.get_stats().idle_evictions, 3);
        pool.destroy().await;
    }
}
