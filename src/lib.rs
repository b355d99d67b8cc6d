//! # poolkeeper
//!
//! Generic async resource pooling for Rust: bounded pools of expensive
//! objects (connections, HTTP clients, buffers) with validation, idle
//! eviction, elastic resizing and a manager for many named pools.
//!
//! ## Features
//!
//! - One engine for every resource kind, driven by a [`ResourceFactory`]
//! - Strict FIFO wait queue with per-borrow timeouts
//! - Automatic return of resources via RAII (Drop trait)
//! - Scoped use with guaranteed release on error and panic
//! - Validation on borrow, return and idle, with background eviction
//! - Live resizing
//! - Health monitoring and Prometheus metrics export
//! - Ready-made adapters for buffers, maps, sets, HTTP clients and databases
//! - A [`PoolManager`] with periodic metrics, alerts, cleanup and reports
//!
//! ## Quick Start
//!
//! ```rust
//! use poolkeeper::{GenericFactory, PoolConfig, ResourcePool};
//!
//! # #[tokio::main]
//! # async fn main() -> poolkeeper::PoolResult<()> {
//! let factory = GenericFactory::new(|| Ok(Vec::<u8>::with_capacity(1024)))
//!     .with_reset(|buf| buf.clear());
//! let pool = ResourcePool::new(factory, PoolConfig::new().with_max(4))?;
//!
//! {
//!     let mut buf = pool.borrow().await?;
//!     buf.extend_from_slice(b"payload");
//!     // Resource automatically returned when `buf` goes out of scope
//! }
//!
//! println!("{:?}", pool.get_stats());
//! # Ok(())
//! # }
//! ```

pub mod adapters;
mod config;
mod errors;
mod eviction;
mod factory;
mod health;
mod manager;
mod metrics;
mod pool;
mod report;

pub use adapters::database::{DatabaseDriver, DatabaseFactory};
pub use adapters::generic::{BufferPool, GenericFactory, MapPool, SetPool};
pub use adapters::http::{HttpClient, HttpClientFactory, HttpClientOptions, HttpClientPool, HttpResponse};
pub use config::{IdleOrder, PoolConfig};
pub use errors::{PoolError, PoolResult};
pub use eviction::EvictionReport;
pub use factory::ResourceFactory;
pub use health::{HealthState, PoolHealth};
pub use manager::{
    Alert, ComprehensiveStats, ManagedPool, ManagerConfig, ManagerHealth, MetricsSnapshot,
    PoolManager, PoolTotals, ProcessUsage,
};
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::PoolStats;
pub use pool::{PooledResource, ResourceId, ResourcePool};
pub use report::{
    ImportSummary, ManagerConfiguration, PerformanceReport, PoolDescriptor, PoolKind, PoolReport,
    Recommendation, RecommendationKind, ReportSummary, recommend,
};
