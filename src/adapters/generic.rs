//! Closure-backed factories for arbitrary in-memory objects

use crate::errors::PoolResult;
use crate::factory::ResourceFactory;
use crate::pool::ResourcePool;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

type CreateFn<R> = dyn Fn() -> PoolResult<R> + Send + Sync;
type DestroyFn<R> = dyn Fn(R) + Send + Sync;
type ValidateFn<R> = dyn Fn(&R) -> bool + Send + Sync;
type ResetFn<R> = dyn Fn(&mut R) + Send + Sync;

pub type BufferPool = ResourcePool<GenericFactory<Vec<u8>>>;
pub type MapPool<K, V> = ResourcePool<GenericFactory<HashMap<K, V>>>;
pub type SetPool<T> = ResourcePool<GenericFactory<HashSet<T>>>;

/// Factory built from caller-supplied closures
///
/// Only `create` is required; the other hooks default to dropping the
/// value, accepting it, and leaving it untouched.
///
/// # Examples
///
/// ```
/// use poolkeeper::GenericFactory;
///
/// let factory = GenericFactory::new(|| Ok(String::with_capacity(64)))
///     .with_validate(|s| s.capacity() >= 64)
///     .with_reset(|s| s.clear());
/// ```
pub struct GenericFactory<R> {
    create: Arc<CreateFn<R>>,
    destroy: Option<Arc<DestroyFn<R>>>,
    validate: Option<Arc<ValidateFn<R>>>,
    reset: Option<Arc<ResetFn<R>>>,
    kind: &'static str,
}

impl<R> Clone for GenericFactory<R> {
    fn clone(&self) -> Self {
        Self {
            create: Arc::clone(&self.create),
            destroy: self.destroy.clone(),
            validate: self.validate.clone(),
            reset: self.reset.clone(),
            kind: self.kind,
        }
    }
}

impl<R> GenericFactory<R> {
    pub fn new<F>(create: F) -> Self
    where
        F: Fn() -> PoolResult<R> + Send + Sync + 'static,
    {
        Self {
            create: Arc::new(create),
            destroy: None,
            validate: None,
            reset: None,
            kind: "generic",
        }
    }

    pub fn with_destroy<F>(mut self, destroy: F) -> Self
    where
        F: Fn(R) + Send + Sync + 'static,
    {
        self.destroy = Some(Arc::new(destroy));
        self
    }

    pub fn with_validate<F>(mut self, validate: F) -> Self
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(validate));
        self
    }

    pub fn with_reset<F>(mut self, reset: F) -> Self
    where
        F: Fn(&mut R) + Send + Sync + 'static,
    {
        self.reset = Some(Arc::new(reset));
        self
    }

    pub(crate) fn with_kind(mut self, kind: &'static str) -> Self {
        self.kind = kind;
        self
    }

    /// Whether reused values are reset before being handed out
    pub fn resets(&self) -> bool {
        self.reset.is_some()
    }
}

#[async_trait]
impl<R: Send + Sync + 'static> ResourceFactory for GenericFactory<R> {
    type Resource = R;

    async fn create(&self) -> PoolResult<R> {
        (self.create)()
    }

    async fn destroy(&self, resource: R) -> PoolResult<()> {
        match &self.destroy {
            Some(destroy) => destroy(resource),
            None => drop(resource),
        }
        Ok(())
    }

    async fn validate(&self, resource: &R) -> bool {
        self.validate.as_ref().is_none_or(|validate| validate(resource))
    }

    fn reset(&self, resource: &mut R) {
        if let Some(reset) = &self.reset {
            reset(resource);
        }
    }

    fn kind(&self) -> &'static str {
        self.kind
    }
}

/// Fixed-size zeroed byte buffers, re-zeroed in place on reuse
///
/// # Examples
///
/// ```
/// use poolkeeper::adapters::generic::buffer_factory;
/// use poolkeeper::{PoolConfig, ResourcePool};
///
/// # #[tokio::main]
/// # async fn main() -> poolkeeper::PoolResult<()> {
/// let pool = ResourcePool::new(buffer_factory(1024), PoolConfig::new())?;
/// let buf = pool.borrow().await?;
/// assert_eq!(buf.len(), 1024);
/// # Ok(())
/// # }
/// ```
pub fn buffer_factory(size: usize) -> GenericFactory<Vec<u8>> {
    GenericFactory::new(move || Ok(vec![0u8; size]))
        .with_validate(move |buf| buf.capacity() >= size)
        .with_reset(move |buf| {
            buf.clear();
            buf.resize(size, 0);
        })
        .with_kind("buffer")
}

/// Empty maps, cleared in place on reuse
pub fn map_factory<K, V>() -> GenericFactory<HashMap<K, V>>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    GenericFactory::new(|| Ok(HashMap::new()))
        .with_reset(|map| map.clear())
        .with_kind("map")
}

/// Empty sets, cleared in place on reuse
pub fn set_factory<T>() -> GenericFactory<HashSet<T>>
where
    T: Eq + Hash + Send + Sync + 'static,
{
    GenericFactory::new(|| Ok(HashSet::new()))
        .with_reset(|set| set.clear())
        .with_kind("set")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> PoolConfig {
        PoolConfig::new().with_min(0).with_max(1).without_eviction()
    }

    #[tokio::test]
    async fn test_default_hooks() {
        let factory = GenericFactory::new(|| Ok(5u32));
        assert_eq!(factory.create().await.unwrap(), 5);
        assert!(factory.validate(&5).await);
        assert!(!factory.resets());
        assert_eq!(factory.kind(), "generic");
    }

    #[tokio::test]
    async fn test_destroy_hook_runs() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&destroyed);
        let factory = GenericFactory::new(|| Ok(1u8)).with_destroy(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        factory.destroy(1).await.unwrap();
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_buffer_is_rezeroed_without_reallocating() {
        let pool = ResourcePool::new(buffer_factory(16), config()).unwrap();

        let mut buf = pool.borrow().await.unwrap();
        buf[0] = 0xff;
        buf.truncate(4);
        let ptr = buf.as_ptr();
        pool.release(buf).await;

        let buf = pool.borrow().await.unwrap();
        assert_eq!(buf.len(), 16);
        assert!(buf.iter().all(|b| *b == 0));
        assert_eq!(buf.as_ptr(), ptr);
    }

    #[tokio::test]
    async fn test_map_and_set_are_cleared() {
        let maps = ResourcePool::new(map_factory::<String, u32>(), config()).unwrap();
        let mut map = maps.borrow().await.unwrap();
        map.insert("a".into(), 1);
        maps.release(map).await;
        assert!(maps.borrow().await.unwrap().is_empty());

        let sets = ResourcePool::new(set_factory::<u32>(), config()).unwrap();
        let mut set = sets.borrow().await.unwrap();
        set.insert(3);
        sets.release(set).await;
        assert!(sets.borrow().await.unwrap().is_empty());
        assert_eq!(sets.name(), "set");
    }
}
