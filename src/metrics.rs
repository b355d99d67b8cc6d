//! Statistics collection and export for resource pools

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "metrics")]
use crate::errors::{PoolError, PoolResult};

/// Point-in-time statistics for a pool
///
/// Counters only ever grow; the size fields reflect the moment the
/// snapshot was taken.
///
/// # Examples
///
/// ```
/// use poolkeeper::PoolStats;
///
/// let stats = PoolStats { idle: 2, in_use: 6, ..Default::default() };
/// assert_eq!(stats.size(), 8);
/// assert_eq!(stats.utilization(), 75.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub created: u64,
    pub borrowed: u64,
    pub returned: u64,
    pub destroyed: u64,
    pub failed_borrows: u64,
    pub failed_returns: u64,
    pub timed_out_borrows: u64,
    pub idle_evictions: u64,
    pub invalid_resources: u64,

    /// Creations that failed while initializing or refilling to `min`
    pub failed_creations: u64,

    /// Resources currently idle
    pub idle: usize,

    /// Resources currently borrowed
    pub in_use: usize,

    /// Slots reserved by in-flight creation or validation
    pub pending: usize,

    /// Borrowers queued for a resource
    pub waiting: usize,

    /// Idle resources idle for longer than the idle timeout
    pub stale_idle: usize,

    pub min: usize,
    pub max: usize,
}

impl PoolStats {
    /// Idle plus borrowed resources
    pub fn size(&self) -> usize {
        self.idle + self.in_use
    }

    /// Borrowed share of live resources in percent
    pub fn utilization(&self) -> f64 {
        let size = self.size();
        if size == 0 {
            0.0
        } else {
            self.in_use as f64 / size as f64 * 100.0
        }
    }

    /// Failed borrows over all borrow attempts in percent
    pub fn failure_rate(&self) -> f64 {
        let attempts = self.borrowed + self.failed_borrows;
        if attempts == 0 {
            0.0
        } else {
            self.failed_borrows as f64 / attempts as f64 * 100.0
        }
    }

    /// Export stats as a flat string map
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("created".to_string(), self.created.to_string());
        metrics.insert("borrowed".to_string(), self.borrowed.to_string());
        metrics.insert("returned".to_string(), self.returned.to_string());
        metrics.insert("destroyed".to_string(), self.destroyed.to_string());
        metrics.insert("failed_borrows".to_string(), self.failed_borrows.to_string());
        metrics.insert("failed_returns".to_string(), self.failed_returns.to_string());
        metrics.insert("timed_out_borrows".to_string(), self.timed_out_borrows.to_string());
        metrics.insert("idle_evictions".to_string(), self.idle_evictions.to_string());
        metrics.insert("invalid_resources".to_string(), self.invalid_resources.to_string());
        metrics.insert("failed_creations".to_string(), self.failed_creations.to_string());
        metrics.insert("idle".to_string(), self.idle.to_string());
        metrics.insert("in_use".to_string(), self.in_use.to_string());
        metrics.insert("waiting".to_string(), self.waiting.to_string());
        metrics.insert("max".to_string(), self.max.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization()));
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Render stats in the Prometheus text exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use poolkeeper::{MetricsExporter, PoolStats};
    /// use std::collections::HashMap;
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let stats = PoolStats { in_use: 2, ..Default::default() };
    /// let output = MetricsExporter::export_prometheus(&stats, "db", Some(&tags)).unwrap();
    /// assert!(output.contains("poolkeeper_resources_in_use"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        stats: &PoolStats,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};

        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());
        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.insert(key.clone(), value.clone());
            }
        }

        let registry = Registry::new_custom(Some("poolkeeper".to_string()), Some(labels))
            .map_err(prometheus_error)?;

        let gauges = [
            ("resources_idle", "Current idle resources", stats.idle),
            ("resources_in_use", "Current borrowed resources", stats.in_use),
            ("resources_pending", "Slots reserved by in-flight work", stats.pending),
            ("borrowers_waiting", "Borrowers queued for a resource", stats.waiting),
            ("pool_max_size", "Configured maximum pool size", stats.max),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::new(name, help).map_err(prometheus_error)?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge)).map_err(prometheus_error)?;
        }

        let counters = [
            ("resources_created_total", "Resources created", stats.created),
            ("resources_destroyed_total", "Resources destroyed", stats.destroyed),
            ("borrows_total", "Successful borrows", stats.borrowed),
            ("returns_total", "Resources returned", stats.returned),
            ("borrows_failed_total", "Failed borrows", stats.failed_borrows),
            ("borrows_timed_out_total", "Borrows that hit the acquire timeout", stats.timed_out_borrows),
            ("returns_failed_total", "Returns rejected by validation", stats.failed_returns),
            ("idle_evictions_total", "Idle resources evicted", stats.idle_evictions),
            ("invalid_resources_total", "Validation failures", stats.invalid_resources),
            ("creations_failed_total", "Failed creations while refilling", stats.failed_creations),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::new(name, help).map_err(prometheus_error)?;
            counter.inc_by(value);
            registry.register(Box::new(counter)).map_err(prometheus_error)?;
        }

        let utilization = Gauge::new("utilization_percent", "Borrowed share of live resources")
            .map_err(prometheus_error)?;
        utilization.set(stats.utilization());
        registry.register(Box::new(utilization)).map_err(prometheus_error)?;

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .map_err(prometheus_error)?;
        String::from_utf8(buffer).map_err(|e| PoolError::Serialization(e.to_string()))
    }
}

#[cfg(feature = "metrics")]
fn prometheus_error(err: prometheus::Error) -> PoolError {
    PoolError::Serialization(err.to_string())
}

/// Current set sizes, captured under the pool lock
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PoolSizes {
    pub idle: usize,
    pub in_use: usize,
    pub pending: usize,
    pub waiting: usize,
    pub stale_idle: usize,
    pub min: usize,
    pub max: usize,
}

/// Internal counters tracker
#[derive(Default)]
pub(crate) struct StatsTracker {
    pub created: AtomicU64,
    pub borrowed: AtomicU64,
    pub returned: AtomicU64,
    pub destroyed: AtomicU64,
    pub failed_borrows: AtomicU64,
    pub failed_returns: AtomicU64,
    pub timed_out_borrows: AtomicU64,
    pub idle_evictions: AtomicU64,
    pub invalid_resources: AtomicU64,
    pub failed_creations: AtomicU64,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, sizes: PoolSizes) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            borrowed: self.borrowed.load(Ordering::Relaxed),
            returned: self.returned.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            failed_borrows: self.failed_borrows.load(Ordering::Relaxed),
            failed_returns: self.failed_returns.load(Ordering::Relaxed),
            timed_out_borrows: self.timed_out_borrows.load(Ordering::Relaxed),
            idle_evictions: self.idle_evictions.load(Ordering::Relaxed),
            invalid_resources: self.invalid_resources.load(Ordering::Relaxed),
            failed_creations: self.failed_creations.load(Ordering::Relaxed),
            idle: sizes.idle,
            in_use: sizes.in_use,
            pending: sizes.pending,
            waiting: sizes.waiting,
            stale_idle: sizes.stale_idle,
            min: sizes.min,
            max: sizes.max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reads_counters() {
        let tracker = StatsTracker::new();
        StatsTracker::incr(&tracker.created);
        StatsTracker::incr(&tracker.created);
        StatsTracker::incr(&tracker.borrowed);

        let stats = tracker.snapshot(PoolSizes {
            idle: 1,
            in_use: 1,
            max: 4,
            ..Default::default()
        });
        assert_eq!(stats.created, 2);
        assert_eq!(stats.borrowed, 1);
        assert_eq!(stats.size(), 2);
        assert_eq!(stats.max, 4);
    }

    #[test]
    fn test_failure_rate() {
        let stats = PoolStats {
            borrowed: 3,
            failed_borrows: 1,
            ..Default::default()
        };
        assert_eq!(stats.failure_rate(), 25.0);
        assert_eq!(PoolStats::default().failure_rate(), 0.0);
    }

    #[test]
    fn test_export_map() {
        let stats = PoolStats {
            idle: 1,
            in_use: 3,
            ..Default::default()
        };
        let exported = stats.export();
        assert_eq!(exported["in_use"], "3");
        assert_eq!(exported["utilization"], "75.00");
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_prometheus_counters_and_labels() {
        let stats = PoolStats {
            created: 7,
            timed_out_borrows: 2,
            ..Default::default()
        };
        let output = MetricsExporter::export_prometheus(&stats, "cache", None).unwrap();
        assert!(output.contains("# TYPE poolkeeper_resources_created_total counter"));
        assert!(output.contains("poolkeeper_borrows_timed_out_total{pool=\"cache\"} 2"));
    }
}
