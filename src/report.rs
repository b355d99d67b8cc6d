//! Performance reports, tuning recommendations and configuration export

use crate::adapters::http::HttpClientOptions;
use crate::config::PoolConfig;
use crate::errors::PoolResult;
use crate::health::{HealthState, PoolHealth};
use crate::manager::{Alert, PoolManager, unix_millis};
use crate::metrics::PoolStats;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

const HIGH_UTILIZATION: f64 = 90.0;
const LOW_UTILIZATION: f64 = 30.0;
const OVERSIZED_POOL: usize = 5;
const HIGH_FAILURE_RATE: f64 = 10.0;

/// Which adapter built a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    Generic,
    Buffer,
    Map,
    Set,
    Http,
    Database,
    Custom,
}

impl PoolKind {
    /// Map a [`ResourceFactory::kind`](crate::ResourceFactory::kind) label
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "generic" => PoolKind::Generic,
            "buffer" => PoolKind::Buffer,
            "map" => PoolKind::Map,
            "set" => PoolKind::Set,
            "http" => PoolKind::Http,
            "database" => PoolKind::Database,
            _ => PoolKind::Custom,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolKind::Generic => "generic",
            PoolKind::Buffer => "buffer",
            PoolKind::Map => "map",
            PoolKind::Set => "set",
            PoolKind::Http => "http",
            PoolKind::Database => "database",
            PoolKind::Custom => "custom",
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to describe (and for some kinds rebuild) a pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolDescriptor {
    #[serde(rename = "type")]
    pub kind: PoolKind,

    pub options: PoolConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpClientOptions>,
}

impl PoolDescriptor {
    pub fn new(kind: PoolKind, options: PoolConfig) -> Self {
        Self {
            kind,
            options,
            buffer_size: None,
            http: None,
        }
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    pub fn with_http(mut self, options: HttpClientOptions) -> Self {
        self.http = Some(options);
        self
    }
}

/// Exported manager setup: `{"pools": {name: {"type": ..., "options": ...}}}`
///
/// # Examples
///
/// ```
/// use poolkeeper::ManagerConfiguration;
///
/// let json = r#"{"pools": {"scratch": {"type": "buffer", "options": {"max": 4}, "bufferSize": 512}}}"#;
/// let config = ManagerConfiguration::from_json(json).unwrap();
/// assert_eq!(config.pools["scratch"].buffer_size, Some(512));
/// assert_eq!(config.pools["scratch"].options.max, 4);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfiguration {
    pub pools: BTreeMap<String, PoolDescriptor>,
}

impl ManagerConfiguration {
    pub fn to_json(&self) -> PoolResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> PoolResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Result of [`PoolManager::import_configuration`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Pools rebuilt from their options
    pub created: Vec<String>,

    /// Pools that need a caller-supplied factory, or whose name is taken
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecommendationKind {
    IncreaseMax,
    DecreaseMax,
    InvestigateFactory,
    RaiseAcquireTimeout,
    LowerMin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub pool: String,
    pub kind: RecommendationKind,
    pub message: String,
}

impl Recommendation {
    fn new(pool: &str, kind: RecommendationKind, message: String) -> Self {
        Self {
            pool: pool.to_string(),
            kind,
            message,
        }
    }
}

/// Tuning suggestions for one pool
///
/// # Examples
///
/// ```
/// use poolkeeper::{PoolStats, RecommendationKind, recommend};
///
/// let stats = PoolStats { idle: 0, in_use: 10, max: 10, ..Default::default() };
/// let advice = recommend("db", &stats);
/// assert_eq!(advice[0].kind, RecommendationKind::IncreaseMax);
/// ```
pub fn recommend(pool: &str, stats: &PoolStats) -> Vec<Recommendation> {
    let mut advice = Vec::new();
    let utilization = stats.utilization();

    if utilization > HIGH_UTILIZATION {
        advice.push(Recommendation::new(
            pool,
            RecommendationKind::IncreaseMax,
            format!(
                "Utilization is {:.1}%; consider raising max above {}",
                utilization, stats.max
            ),
        ));
    } else if utilization < LOW_UTILIZATION && stats.size() > OVERSIZED_POOL {
        advice.push(Recommendation::new(
            pool,
            RecommendationKind::DecreaseMax,
            format!(
                "Utilization is {:.1}% across {} resources; consider lowering max",
                utilization,
                stats.size()
            ),
        ));
    }

    let failure_rate = stats.failure_rate();
    if failure_rate > HIGH_FAILURE_RATE {
        advice.push(Recommendation::new(
            pool,
            RecommendationKind::InvestigateFactory,
            format!(
                "{:.1}% of borrows fail; check resource creation and validation",
                failure_rate
            ),
        ));
    }

    if stats.timed_out_borrows > 0 {
        advice.push(Recommendation::new(
            pool,
            RecommendationKind::RaiseAcquireTimeout,
            format!(
                "{} borrows timed out; raise acquireTimeout or max",
                stats.timed_out_borrows
            ),
        ));
    }

    if stats.stale_idle > 0 && stats.idle > stats.min {
        advice.push(Recommendation::new(
            pool,
            RecommendationKind::LowerMin,
            format!(
                "{} of {} idle resources are stale; min ({}) may be too high",
                stats.stale_idle, stats.idle, stats.min
            ),
        ));
    }

    advice
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolReport {
    pub kind: PoolKind,
    pub stats: PoolStats,
    pub health: PoolHealth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_pools: usize,
    pub total_resources: usize,
    pub in_use: usize,
    pub waiting: usize,

    /// Mean of the per-pool utilization, in percent
    pub average_utilization: f64,

    /// Worst health of any pool
    pub status: HealthState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    /// Milliseconds since the Unix epoch
    pub generated_at: u64,
    pub summary: ReportSummary,
    pub pools: BTreeMap<String, PoolReport>,
    pub recommendations: Vec<Recommendation>,
    pub alerts: Vec<Alert>,
}

impl PoolManager {
    /// Current stats of every pool with tuning recommendations
    pub fn generate_performance_report(&self) -> PerformanceReport {
        let mut pools = BTreeMap::new();
        let mut recommendations = Vec::new();
        let mut status = HealthState::Healthy;
        let mut total_resources = 0;
        let mut in_use = 0;
        let mut waiting = 0;
        let mut utilization_sum = 0.0;

        for (name, registered) in self.registered() {
            let stats = registered.pool.stats();
            let health = PoolHealth::from_stats(&stats);
            status = status.max(health.status);
            total_resources += stats.size();
            in_use += stats.in_use;
            waiting += stats.waiting;
            utilization_sum += stats.utilization();
            recommendations.extend(recommend(&name, &stats));
            pools.insert(
                name,
                PoolReport {
                    kind: registered.descriptor.kind,
                    stats,
                    health,
                },
            );
        }

        let total_pools = pools.len();
        let average_utilization = if total_pools == 0 {
            0.0
        } else {
            utilization_sum / total_pools as f64
        };

        PerformanceReport {
            generated_at: unix_millis(),
            summary: ReportSummary {
                total_pools,
                total_resources,
                in_use,
                waiting,
                average_utilization,
                status,
            },
            pools,
            recommendations,
            alerts: self.alerts(),
        }
    }

    /// Describe every registered pool
    pub fn export_configuration(&self) -> ManagerConfiguration {
        let pools = self
            .registered()
            .into_iter()
            .map(|(name, registered)| {
                let descriptor = PoolDescriptor {
                    options: registered.pool.config(),
                    ..registered.descriptor
                };
                (name, descriptor)
            })
            .collect();
        ManagerConfiguration { pools }
    }

    /// Rebuild the pools a configuration describes
    ///
    /// HTTP and buffer pools are recreated from their options. Generic, map,
    /// set, database and custom pools hold caller code and are skipped, as
    /// are names already registered.
    pub async fn import_configuration(&self, config: &ManagerConfiguration) -> PoolResult<ImportSummary> {
        let mut summary = ImportSummary::default();
        for (name, descriptor) in &config.pools {
            if self.contains(name) {
                warn!(pool = %name, "Pool already registered, skipping import");
                summary.skipped.push(name.clone());
                continue;
            }
            let options = descriptor.options.clone();
            match (descriptor.kind, descriptor.buffer_size, &descriptor.http) {
                (PoolKind::Buffer, Some(size), _) => {
                    self.create_buffer_pool(name, size, options).await?;
                }
                (PoolKind::Http, _, Some(http)) => {
                    self.create_http_pool(name, http.clone(), options).await?;
                }
                (kind, _, _) => {
                    warn!(pool = %name, kind = %kind, "Pool kind needs a factory, skipping import");
                    summary.skipped.push(name.clone());
                    continue;
                }
            }
            summary.created.push(name.clone());
        }
        info!(
            created = summary.created.len(),
            skipped = summary.skipped.len(),
            "Configuration imported"
        );
        Ok(summary)
    }
}
