//! The lifecycle contract a pool delegates to

use crate::errors::PoolResult;
use async_trait::async_trait;

/// Creates, destroys, validates and resets one kind of resource.
///
/// The pool owns all concurrency; a factory only knows how to handle a
/// single resource at a time.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use poolkeeper::{PoolResult, ResourceFactory};
///
/// struct Counter;
///
/// #[async_trait]
/// impl ResourceFactory for Counter {
///     type Resource = u64;
///
///     async fn create(&self) -> PoolResult<u64> {
///         Ok(0)
///     }
///
///     fn reset(&self, value: &mut u64) {
///         *value = 0;
///     }
/// }
/// ```
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    type Resource: Send + Sync + 'static;

    /// Build a new resource. Errors surface as `CreationFailure`.
    async fn create(&self) -> PoolResult<Self::Resource>;

    /// Release a resource. Failures are logged by the pool, never propagated.
    async fn destroy(&self, resource: Self::Resource) -> PoolResult<()> {
        drop(resource);
        Ok(())
    }

    /// `false` makes the pool destroy the resource.
    async fn validate(&self, _resource: &Self::Resource) -> bool {
        true
    }

    /// Called before a reused resource is handed to a new borrower.
    fn reset(&self, _resource: &mut Self::Resource) {}

    /// Short label used in logs and reports.
    fn kind(&self) -> &'static str {
        "custom"
    }
}
