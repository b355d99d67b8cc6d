//! Pool configuration options

use crate::errors::{PoolError, PoolResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Order in which idle resources are handed out.
///
/// Only affects which already-idle resource is picked; waiters are always
/// served first-come, first-served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleOrder {
    /// Most recently returned resource first (keeps a hot working set)
    #[default]
    Lifo,

    /// Least recently returned resource first (spreads use evenly)
    Fifo,
}

/// Configuration for pool behavior
///
/// # Examples
///
/// ```
/// use poolkeeper::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::new()
///     .with_min(2)
///     .with_max(20)
///     .with_acquire_timeout(Duration::from_secs(5))
///     .with_lifo(false);
///
/// assert_eq!(config.max, 20);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolConfig {
    /// Number of resources the pool tries to keep around
    pub min: usize,

    /// Hard ceiling on idle + borrowed resources
    pub max: usize,

    /// Idle duration after which a resource is reported as stale
    #[serde(with = "duration_ms")]
    pub idle_timeout: Duration,

    /// Idle duration after which a resource may be sampled by eviction
    #[serde(with = "duration_ms")]
    pub soft_idle_timeout: Duration,

    /// How long a borrower waits in the queue; zero waits forever
    #[serde(with = "duration_ms")]
    pub acquire_timeout: Duration,

    /// Period of the background eviction pass; zero disables it
    #[serde(with = "duration_ms")]
    pub eviction_interval: Duration,

    /// Upper bound on resources examined per eviction pass
    pub evictions_per_run: usize,

    /// Validate idle resources before handing them out
    pub test_on_borrow: bool,

    /// Validate resources when they come back
    pub test_on_return: bool,

    /// Validate resources sampled by the eviction pass
    pub test_on_idle: bool,

    /// Idle resource retrieval order
    ///
    /// Serialized as `"lifo"` / `"fifo"`. A boolean `lifo` key is accepted
    /// on input as well.
    #[serde(alias = "lifo", deserialize_with = "order_or_lifo_flag")]
    pub order: IdleOrder,

    /// New borrowers queue behind existing waiters instead of barging
    pub fairness: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min: 1,
            max: 10,
            idle_timeout: Duration::from_millis(30_000),
            soft_idle_timeout: Duration::from_millis(20_000),
            acquire_timeout: Duration::from_millis(60_000),
            eviction_interval: Duration::from_millis(10_000),
            evictions_per_run: 3,
            test_on_borrow: true,
            test_on_return: true,
            test_on_idle: true,
            order: IdleOrder::Lifo,
            fairness: true,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum pool size
    pub fn with_min(mut self, min: usize) -> Self {
        self.min = min;
        self
    }

    /// Set the maximum pool size
    ///
    /// # Examples
    ///
    /// ```
    /// use poolkeeper::PoolConfig;
    ///
    /// let config = PoolConfig::new().with_max(50);
    /// assert_eq!(config.max, 50);
    /// ```
    pub fn with_max(mut self, max: usize) -> Self {
        self.max = max;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_soft_idle_timeout(mut self, timeout: Duration) -> Self {
        self.soft_idle_timeout = timeout;
        self
    }

    /// Set how long `borrow` waits when the pool is exhausted
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set eviction period and per-pass sample size
    pub fn with_eviction(mut self, interval: Duration, per_run: usize) -> Self {
        self.eviction_interval = interval;
        self.evictions_per_run = per_run;
        self
    }

    /// Disable the background eviction timer
    pub fn without_eviction(mut self) -> Self {
        self.eviction_interval = Duration::ZERO;
        self
    }

    /// Set borrow / return / idle validation in one call
    pub fn with_validation(mut self, on_borrow: bool, on_return: bool, on_idle: bool) -> Self {
        self.test_on_borrow = on_borrow;
        self.test_on_return = on_return;
        self.test_on_idle = on_idle;
        self
    }

    pub fn with_order(mut self, order: IdleOrder) -> Self {
        self.order = order;
        self
    }

    /// `true` selects [`IdleOrder::Lifo`], `false` [`IdleOrder::Fifo`]
    pub fn with_lifo(mut self, lifo: bool) -> Self {
        self.order = if lifo { IdleOrder::Lifo } else { IdleOrder::Fifo };
        self
    }

    pub fn with_fairness(mut self, fairness: bool) -> Self {
        self.fairness = fairness;
        self
    }

    /// Check the bounds are consistent
    ///
    /// # Examples
    ///
    /// ```
    /// use poolkeeper::PoolConfig;
    ///
    /// assert!(PoolConfig::new().with_min(5).with_max(2).validate().is_err());
    /// ```
    pub fn validate(&self) -> PoolResult<()> {
        if self.max == 0 {
            return Err(PoolError::InvalidConfiguration(
                "max must be greater than zero".to_string(),
            ));
        }
        if self.min > self.max {
            return Err(PoolError::InvalidConfiguration(format!(
                "min ({}) must not exceed max ({})",
                self.min, self.max
            )));
        }
        if !self.eviction_interval.is_zero() && self.evictions_per_run == 0 {
            return Err(PoolError::InvalidConfiguration(
                "evictions_per_run must be greater than zero when eviction is enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// `None` when borrowers should wait without a deadline
    pub(crate) fn acquire_deadline(&self) -> Option<Duration> {
        if self.acquire_timeout.is_zero() {
            None
        } else {
            Some(self.acquire_timeout)
        }
    }
}

fn order_or_lifo_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<IdleOrder, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Flag(bool),
        Order(IdleOrder),
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::Flag(true) => IdleOrder::Lifo,
        Repr::Flag(false) => IdleOrder::Fifo,
        Repr::Order(order) => order,
    })
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
