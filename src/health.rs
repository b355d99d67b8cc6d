//! Health monitoring for resource pools

use crate::metrics::PoolStats;
use serde::{Deserialize, Serialize};
use std::fmt;

const WARNING_UTILIZATION: f64 = 70.0;
const CRITICAL_UTILIZATION: f64 = 90.0;
const WARNING_FAILED_BORROWS: u64 = 5;
const CRITICAL_FAILED_BORROWS: u64 = 10;

/// Coarse pool condition, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    /// Borrowers are queued
    Busy,
    Warning,
    Critical,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthState::Healthy => "healthy",
            HealthState::Busy => "busy",
            HealthState::Warning => "warning",
            HealthState::Critical => "critical",
        };
        f.write_str(label)
    }
}

/// Health of a single pool, derived from its current stats
///
/// # Examples
///
/// ```
/// use poolkeeper::{HealthState, PoolHealth, PoolStats};
///
/// let stats = PoolStats { idle: 3, in_use: 1, ..Default::default() };
/// let health = PoolHealth::from_stats(&stats);
///
/// assert_eq!(health.status, HealthState::Healthy);
/// assert_eq!(health.utilization, 25.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolHealth {
    pub status: HealthState,

    /// Borrowed share of live resources, in percent
    pub utilization: f64,

    /// Failed borrows over all borrow attempts, in percent
    pub failure_rate: f64,

    pub idle: usize,
    pub in_use: usize,
    pub waiting: usize,

    /// Human readable reasons for a non-healthy status
    pub warnings: Vec<String>,
}

impl PoolHealth {
    pub fn from_stats(stats: &PoolStats) -> Self {
        let utilization = stats.utilization();
        let mut warnings = Vec::new();
        let mut status = HealthState::Healthy;

        if stats.waiting > 0 {
            status = HealthState::Busy;
            warnings.push(format!("{} borrowers waiting", stats.waiting));
        }

        if utilization > CRITICAL_UTILIZATION || stats.failed_borrows > CRITICAL_FAILED_BORROWS {
            status = HealthState::Critical;
        } else if utilization > WARNING_UTILIZATION || stats.failed_borrows > WARNING_FAILED_BORROWS {
            status = HealthState::Warning;
        }

        if utilization > WARNING_UTILIZATION {
            warnings.push(format!("High utilization: {:.1}%", utilization));
        }
        if stats.failed_borrows > WARNING_FAILED_BORROWS {
            warnings.push(format!("{} failed borrows", stats.failed_borrows));
        }

        Self {
            status,
            utilization,
            failure_rate: stats.failure_rate(),
            idle: stats.idle,
            in_use: stats.in_use,
            waiting: stats.waiting,
            warnings,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(idle: usize, in_use: usize) -> PoolStats {
        PoolStats {
            idle,
            in_use,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_pool_is_healthy() {
        let health = PoolHealth::from_stats(&PoolStats::default());
        assert!(health.is_healthy());
        assert_eq!(health.utilization, 0.0);
        assert!(health.warnings.is_empty());
    }

    #[test]
    fn test_waiters_make_pool_busy() {
        let mut s = stats(5, 1);
        s.waiting = 2;
        assert_eq!(PoolHealth::from_stats(&s).status, HealthState::Busy);
    }

    #[test]
    fn test_utilization_escalation() {
        assert_eq!(PoolHealth::from_stats(&stats(2, 8)).status, HealthState::Warning);
        assert_eq!(PoolHealth::from_stats(&stats(0, 10)).status, HealthState::Critical);
        assert_eq!(PoolHealth::from_stats(&stats(3, 7)).status, HealthState::Healthy);
    }

    #[test]
    fn test_failed_borrows_escalation() {
        let mut s = stats(10, 0);
        s.failed_borrows = 6;
        assert_eq!(PoolHealth::from_stats(&s).status, HealthState::Warning);
        s.failed_borrows = 11;
        assert_eq!(PoolHealth::from_stats(&s).status, HealthState::Critical);
    }

    #[test]
    fn test_states_are_ordered() {
        assert!(HealthState::Critical > HealthState::Warning);
        assert!(HealthState::Warning > HealthState::Busy);
        assert!(HealthState::Busy > HealthState::Healthy);
    }
}
