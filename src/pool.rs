//! Core resource pool engine

use crate::config::{IdleOrder, PoolConfig};
use crate::errors::{PoolError, PoolResult};
use crate::eviction::IdleEntry;
use crate::factory::ResourceFactory;
use crate::health::PoolHealth;
use crate::metrics::{PoolSizes, PoolStats, StatsTracker};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Identity of a pooled resource. Never reused within a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) u64);

impl ResourceId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) struct BorrowRecord {
    pub borrowed_at: Instant,
    pub last_access: Instant,
}

impl BorrowRecord {
    fn now() -> Self {
        let now = Instant::now();
        Self {
            borrowed_at: now,
            last_access: now,
        }
    }
}

/// What a queued borrower is handed.
pub(crate) enum Grant<R> {
    /// A returned resource, already recorded as borrowed by the waiter
    Resource(IdleEntry<R>),
    /// A reserved slot the waiter must fill by creating a resource
    Capacity,
}

pub(crate) struct Waiter<R> {
    id: u64,
    enqueued_at: Instant,
    deadline: Option<Instant>,
    tx: oneshot::Sender<Grant<R>>,
}

/// Everything guarded by the pool lock.
///
/// `idle.len() + borrowed.len() + pending <= max` holds whenever the lock
/// is released, except after `resize` shrank below the borrowed count.
pub(crate) struct PoolState<R> {
    pub idle: VecDeque<IdleEntry<R>>,
    pub borrowed: HashMap<ResourceId, BorrowRecord>,
    pub waiters: VecDeque<Waiter<R>>,
    pub pending: usize,
    pub max: usize,
    pub destroyed: bool,
    next_waiter_id: u64,
}

impl<R> PoolState<R> {
    fn new(max: usize) -> Self {
        Self {
            idle: VecDeque::with_capacity(max),
            borrowed: HashMap::with_capacity(max),
            waiters: VecDeque::new(),
            pending: 0,
            max,
            destroyed: false,
            next_waiter_id: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.idle.len() + self.borrowed.len() + self.pending
    }

    pub fn has_capacity(&self) -> bool {
        self.total() < self.max
    }

    fn pop_idle(&mut self, order: IdleOrder) -> Option<IdleEntry<R>> {
        match order {
            IdleOrder::Lifo => self.idle.pop_back(),
            IdleOrder::Fifo => self.idle.pop_front(),
        }
    }

    fn enqueue(&mut self, timeout: Option<Duration>) -> (u64, oneshot::Receiver<Grant<R>>) {
        let (tx, rx) = oneshot::channel();
        let id = self.next_waiter_id;
        self.next_waiter_id += 1;
        let now = Instant::now();
        self.waiters.push_back(Waiter {
            id,
            enqueued_at: now,
            deadline: timeout.map(|t| now + t),
            tx,
        });
        (id, rx)
    }

    /// Oldest waiter whose deadline has not passed. Expired waiters are
    /// dropped; their own timers report the timeout.
    fn next_waiter(&mut self) -> Option<Waiter<R>> {
        let now = Instant::now();
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.deadline {
                Some(deadline) if deadline <= now => continue,
                _ => return Some(waiter),
            }
        }
        None
    }

    /// Hand a resource to the oldest waiter, or park it idle.
    ///
    /// Returns the entry back when the pool has no room for it.
    pub fn place(&mut self, mut entry: IdleEntry<R>, front: bool) -> Option<IdleEntry<R>> {
        if self.destroyed || self.total() >= self.max {
            return Some(entry);
        }
        while let Some(waiter) = self.next_waiter() {
            let id = entry.id;
            self.borrowed.insert(id, BorrowRecord::now());
            match waiter.tx.send(Grant::Resource(entry)) {
                Ok(()) => {
                    debug!(resource_id = %id, waited = ?waiter.enqueued_at.elapsed(), "Handed resource to waiter");
                    return None;
                }
                Err(Grant::Resource(returned)) => {
                    self.borrowed.remove(&id);
                    entry = returned;
                }
                Err(Grant::Capacity) => unreachable!("a resource grant comes back as a resource"),
            }
        }
        if front {
            self.idle.push_front(entry);
        } else {
            self.idle.push_back(entry);
        }
        None
    }

    /// Give any free capacity to waiters, oldest first.
    pub fn grant_capacity(&mut self) {
        while self.has_capacity() {
            let Some(waiter) = self.next_waiter() else {
                return;
            };
            self.pending += 1;
            if waiter.tx.send(Grant::Capacity).is_err() {
                self.pending -= 1;
            }
        }
    }

    /// Release a reserved slot and pass it on.
    pub fn release_slot(&mut self) {
        self.pending = self.pending.saturating_sub(1);
        self.grant_capacity();
    }

    fn remove_waiter(&mut self, id: u64) -> bool {
        match self.waiters.iter().position(|w| w.id == id) {
            Some(pos) => {
                self.waiters.remove(pos);
                true
            }
            None => false,
        }
    }
}

pub(crate) struct PoolInner<F: ResourceFactory> {
    pub name: String,
    pub factory: F,
    pub config: PoolConfig,
    pub state: Mutex<PoolState<F::Resource>>,
    pub stats: StatsTracker,
    next_id: AtomicU64,
    initialized: AtomicBool,
    evictor: Mutex<Option<JoinHandle<()>>>,
}

impl<F: ResourceFactory> PoolInner<F> {
    fn next_resource_id(&self) -> ResourceId {
        ResourceId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    async fn create_entry(&self) -> PoolResult<IdleEntry<F::Resource>> {
        match self.factory.create().await {
            Ok(resource) => {
                let id = self.next_resource_id();
                StatsTracker::incr(&self.stats.created);
                debug!(pool = %self.name, resource_id = %id, "Created resource");
                Ok(IdleEntry::new(id, resource))
            }
            Err(err) => {
                warn!(pool = %self.name, error = %err, "Resource creation failed");
                Err(match err {
                    PoolError::CreationFailure(msg) => PoolError::CreationFailure(msg),
                    other => PoolError::CreationFailure(other.to_string()),
                })
            }
        }
    }

    /// Destroy a resource already removed from every set.
    pub async fn destroy_resource(&self, entry: IdleEntry<F::Resource>) {
        let id = entry.id;
        if let Err(err) = self.factory.destroy(entry.resource).await {
            warn!(pool = %self.name, resource_id = %id, error = %err, "Failed to destroy resource");
        }
        StatsTracker::incr(&self.stats.destroyed);
        debug!(pool = %self.name, resource_id = %id, "Destroyed resource");
    }

    async fn acquire(self: &Arc<Self>) -> PoolResult<Lease<F::Resource>> {
        enum Step<R> {
            Check(IdleEntry<R>),
            Create,
            Wait(u64, oneshot::Receiver<Grant<R>>),
        }

        loop {
            let step = {
                let mut state = self.state.lock();
                if state.destroyed {
                    return Err(PoolError::PoolDestroyed);
                }
                let must_queue = self.config.fairness && !state.waiters.is_empty();
                if must_queue {
                    let (id, rx) = state.enqueue(self.config.acquire_deadline());
                    Step::Wait(id, rx)
                } else if let Some(entry) = state.pop_idle(self.config.order) {
                    state.pending += 1;
                    Step::Check(entry)
                } else if state.has_capacity() {
                    state.pending += 1;
                    Step::Create
                } else {
                    let (id, rx) = state.enqueue(self.config.acquire_deadline());
                    Step::Wait(id, rx)
                }
            };

            match step {
                Step::Check(entry) => {
                    let slot = Reservation::adopt(self);
                    let mut entry = if self.config.test_on_borrow {
                        let (entry, valid) = Validating::idle(self, entry).run().await;
                        if !valid {
                            StatsTracker::incr(&self.stats.invalid_resources);
                            debug!(pool = %self.name, resource_id = %entry.id, "Idle resource failed validation on borrow");
                            drop(slot);
                            self.destroy_resource(entry).await;
                            continue;
                        }
                        entry
                    } else {
                        entry
                    };
                    self.factory.reset(&mut entry.resource);
                    return slot.commit(entry).await;
                }
                Step::Create => {
                    let slot = Reservation::adopt(self);
                    let entry = self.create_entry().await?;
                    return slot.commit(entry).await;
                }
                Step::Wait(id, rx) => {
                    debug!(pool = %self.name, waiter = id, "Pool exhausted, queueing borrower");
                    return self.wait_for_grant(id, rx).await;
                }
            }
        }
    }

    async fn wait_for_grant(
        self: &Arc<Self>,
        id: u64,
        rx: oneshot::Receiver<Grant<F::Resource>>,
    ) -> PoolResult<Lease<F::Resource>> {
        let mut ticket = WaitTicket {
            pool: Arc::clone(self),
            id,
            rx: Some(rx),
        };
        let timeout = self.config.acquire_deadline();

        let received = match (timeout, ticket.rx.as_mut()) {
            (Some(limit), Some(rx)) => tokio::time::timeout(limit, rx).await.ok(),
            (None, Some(rx)) => Some(rx.await),
            (_, None) => None,
        };

        let grant = match received {
            Some(Ok(grant)) => {
                ticket.rx = None;
                grant
            }
            Some(Err(_)) => {
                ticket.rx = None;
                return Err(if self.is_destroyed() {
                    PoolError::PoolDestroyed
                } else {
                    self.timed_out()
                });
            }
            None => {
                ticket.cancel();
                return Err(self.timed_out());
            }
        };

        match grant {
            Grant::Resource(mut entry) => {
                self.factory.reset(&mut entry.resource);
                Ok(Lease::from_entry(entry))
            }
            Grant::Capacity => {
                let slot = Reservation::adopt(self);
                let entry = self.create_entry().await?;
                slot.commit(entry).await
            }
        }
    }

    fn timed_out(&self) -> PoolError {
        StatsTracker::incr(&self.stats.timed_out_borrows);
        debug!(pool = %self.name, timeout = ?self.config.acquire_timeout, "Borrow timed out");
        PoolError::AcquisitionTimeout(self.config.acquire_timeout)
    }

    /// Validate and check a borrowed resource back in.
    async fn give_back(self: &Arc<Self>, entry: IdleEntry<F::Resource>) {
        if self.is_destroyed() {
            self.state.lock().borrowed.remove(&entry.id);
            self.destroy_resource(entry).await;
            return;
        }

        let (entry, valid) = if self.config.test_on_return {
            Validating::borrowed(self, entry).run().await
        } else {
            (entry, true)
        };
        if !valid {
            StatsTracker::incr(&self.stats.invalid_resources);
            StatsTracker::incr(&self.stats.failed_returns);
            debug!(pool = %self.name, resource_id = %entry.id, "Returned resource failed validation");
            {
                let mut state = self.state.lock();
                state.borrowed.remove(&entry.id);
                state.grant_capacity();
            }
            self.destroy_resource(entry).await;
            return;
        }

        if let Some(entry) = self.check_in(entry) {
            self.destroy_resource(entry).await;
        }
    }

    /// Move a borrowed resource back without validation. Returns it when
    /// it has to be destroyed instead.
    fn check_in(&self, entry: IdleEntry<F::Resource>) -> Option<IdleEntry<F::Resource>> {
        let mut state = self.state.lock();
        if state.borrowed.remove(&entry.id).is_none() {
            // untracked by destroy()
            return Some(entry);
        }
        StatsTracker::incr(&self.stats.returned);
        let leftover = state.place(entry, false);
        if leftover.is_some() {
            state.grant_capacity();
        }
        leftover
    }

    /// Reserve and create resources until `min` are idle or capacity runs out.
    ///
    /// Returns `(created, failed)`.
    pub async fn fill_to_min(&self) -> (usize, usize) {
        let wanted = {
            let mut state = self.state.lock();
            if state.destroyed {
                return (0, 0);
            }
            let deficit = self.config.min.saturating_sub(state.idle.len());
            let room = state.max.saturating_sub(state.total());
            let wanted = deficit.min(room);
            state.pending += wanted;
            wanted
        };

        let mut created = 0;
        let mut failed = 0;
        for _ in 0..wanted {
            let slot = Reservation::adopt(self);
            match self.create_entry().await {
                Ok(entry) => {
                    slot.disarm();
                    let leftover = {
                        let mut state = self.state.lock();
                        state.pending = state.pending.saturating_sub(1);
                        state.place(entry, false)
                    };
                    if let Some(entry) = leftover {
                        self.destroy_resource(entry).await;
                    }
                    created += 1;
                }
                Err(_) => {
                    StatsTracker::incr(&self.stats.failed_creations);
                    failed += 1;
                }
            }
        }
        (created, failed)
    }

    pub fn sizes(&self) -> PoolSizes {
        let state = self.state.lock();
        let stale_idle = state
            .idle
            .iter()
            .filter(|entry| entry.idle_for() > self.config.idle_timeout)
            .count();
        PoolSizes {
            idle: state.idle.len(),
            in_use: state.borrowed.len(),
            pending: state.pending,
            waiting: state.waiters.len(),
            stale_idle,
            min: self.config.min,
            max: state.max,
        }
    }

    /// Return a resource from a context that cannot await.
    fn give_back_detached(self: &Arc<Self>, entry: IdleEntry<F::Resource>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pool = Arc::clone(self);
                handle.spawn(async move { pool.give_back(entry).await });
            }
            Err(_) => {
                if let Some(entry) = self.check_in(entry) {
                    debug!(pool = %self.name, resource_id = %entry.id, "Dropping resource without a runtime");
                    StatsTracker::incr(&self.stats.destroyed);
                    drop(entry);
                }
            }
        }
    }
}

/// A resource slot counted as pending until committed or dropped.
struct Reservation<'a, F: ResourceFactory> {
    pool: &'a PoolInner<F>,
    armed: bool,
}

impl<'a, F: ResourceFactory> Reservation<'a, F> {
    /// Take ownership of a slot already counted in `pending`.
    fn adopt(pool: &'a PoolInner<F>) -> Self {
        Self { pool, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }

    /// Turn the slot into a borrowed resource.
    async fn commit(mut self, entry: IdleEntry<F::Resource>) -> PoolResult<Lease<F::Resource>> {
        self.armed = false;
        let destroyed = {
            let mut state = self.pool.state.lock();
            state.pending = state.pending.saturating_sub(1);
            if !state.destroyed {
                state.borrowed.insert(entry.id, BorrowRecord::now());
            }
            state.destroyed
        };
        if destroyed {
            self.pool.destroy_resource(entry).await;
            return Err(PoolError::PoolDestroyed);
        }
        Ok(Lease::from_entry(entry))
    }
}

impl<F: ResourceFactory> Drop for Reservation<'_, F> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.state.lock().release_slot();
        }
    }
}

/// A resource held across a `validate` await.
///
/// Dropped before `run` finishes, the resource is destroyed and its slot
/// handed on.
struct Validating<F: ResourceFactory> {
    pool: Arc<PoolInner<F>>,
    entry: Option<IdleEntry<F::Resource>>,
    borrowed: bool,
}

impl<F: ResourceFactory> Validating<F> {
    /// An entry taken off the idle set, its slot held by a `Reservation`
    fn idle(pool: &Arc<PoolInner<F>>, entry: IdleEntry<F::Resource>) -> Self {
        Self {
            pool: Arc::clone(pool),
            entry: Some(entry),
            borrowed: false,
        }
    }

    /// An entry still recorded in the borrowed set
    fn borrowed(pool: &Arc<PoolInner<F>>, entry: IdleEntry<F::Resource>) -> Self {
        Self {
            pool: Arc::clone(pool),
            entry: Some(entry),
            borrowed: true,
        }
    }

    async fn run(mut self) -> (IdleEntry<F::Resource>, bool) {
        let valid = match self.entry.as_ref() {
            Some(entry) => self.pool.factory.validate(&entry.resource).await,
            None => false,
        };
        let entry = self.entry.take().expect("Value already taken");
        (entry, valid)
    }
}

impl<F: ResourceFactory> Drop for Validating<F> {
    fn drop(&mut self) {
        let Some(entry) = self.entry.take() else {
            return;
        };
        debug!(pool = %self.pool.name, resource_id = %entry.id, "Validation interrupted, destroying resource");
        if self.borrowed {
            let mut state = self.pool.state.lock();
            state.borrowed.remove(&entry.id);
            state.grant_capacity();
        }
        self.pool.give_back_detached_untracked(entry);
    }
}

/// A queued borrow. Dropping it leaves the queue and passes on anything
/// granted in the meantime.
struct WaitTicket<F: ResourceFactory> {
    pool: Arc<PoolInner<F>>,
    id: u64,
    rx: Option<oneshot::Receiver<Grant<F::Resource>>>,
}

impl<F: ResourceFactory> WaitTicket<F> {
    fn cancel(&mut self) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };
        let leftover = {
            let mut state = self.pool.state.lock();
            if state.remove_waiter(self.id) {
                return;
            }
            match rx.try_recv() {
                Ok(Grant::Resource(entry)) => {
                    state.borrowed.remove(&entry.id);
                    let leftover = state.place(entry, false);
                    if leftover.is_some() {
                        state.grant_capacity();
                    }
                    leftover
                }
                Ok(Grant::Capacity) => {
                    state.release_slot();
                    None
                }
                Err(_) => None,
            }
        };
        if let Some(entry) = leftover {
            self.pool.give_back_detached_untracked(entry);
        }
    }
}

impl<F: ResourceFactory> Drop for WaitTicket<F> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<F: ResourceFactory> PoolInner<F> {
    /// Destroy an untracked resource from a context that cannot await.
    fn give_back_detached_untracked(self: &Arc<Self>, entry: IdleEntry<F::Resource>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pool = Arc::clone(self);
                handle.spawn(async move { pool.destroy_resource(entry).await });
            }
            Err(_) => {
                StatsTracker::incr(&self.stats.destroyed);
                drop(entry);
            }
        }
    }
}

/// A resource on loan, before it is wrapped in a guard.
struct Lease<R> {
    id: ResourceId,
    created_at: Instant,
    resource: R,
}

impl<R> Lease<R> {
    fn from_entry(entry: IdleEntry<R>) -> Self {
        Self {
            id: entry.id,
            created_at: entry.created_at,
            resource: entry.resource,
        }
    }
}

/// A borrowed resource that goes back to its pool when dropped
///
/// Prefer [`PooledResource::release`] in async code: it validates and
/// checks the resource in before returning. Dropping the guard does the
/// same on a spawned task.
pub struct PooledResource<F: ResourceFactory> {
    value: Option<F::Resource>,
    id: ResourceId,
    created_at: Instant,
    pool: Arc<PoolInner<F>>,
}

impl<F: ResourceFactory> PooledResource<F> {
    fn new(lease: Lease<F::Resource>, pool: Arc<PoolInner<F>>) -> Self {
        Self {
            value: Some(lease.resource),
            id: lease.id,
            created_at: lease.created_at,
            pool,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Time since the underlying resource was created
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since this borrow started
    pub fn borrowed_for(&self) -> Duration {
        self.pool
            .state
            .lock()
            .borrowed
            .get(&self.id)
            .map(|record| record.borrowed_at.elapsed())
            .unwrap_or_default()
    }

    /// Record activity on the resource
    pub fn touch(&self) {
        if let Some(record) = self.pool.state.lock().borrowed.get_mut(&self.id) {
            record.last_access = Instant::now();
        }
    }

    /// Time since the last `touch` (or the borrow itself)
    pub fn idle_for(&self) -> Duration {
        self.pool
            .state
            .lock()
            .borrowed
            .get(&self.id)
            .map(|record| record.last_access.elapsed())
            .unwrap_or_default()
    }

    /// Return the resource to the pool now
    pub async fn release(mut self) {
        if let Some(entry) = self.take_entry() {
            self.pool.give_back(entry).await;
        }
    }

    /// Take the resource out of the pool for good
    ///
    /// The slot it occupied becomes free capacity.
    pub fn detach(mut self) -> F::Resource {
        let entry = self.take_entry().expect("Value already taken");
        let mut state = self.pool.state.lock();
        state.borrowed.remove(&entry.id);
        state.grant_capacity();
        entry.resource
    }

    fn take_entry(&mut self) -> Option<IdleEntry<F::Resource>> {
        self.value
            .take()
            .map(|resource| IdleEntry::with_created_at(self.id, resource, self.created_at))
    }
}

impl<F: ResourceFactory> Deref for PooledResource<F> {
    type Target = F::Resource;

    fn deref(&self) -> &Self::Target {
        self.value.as_ref().expect("Value already taken")
    }
}

impl<F: ResourceFactory> DerefMut for PooledResource<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.value.as_mut().expect("Value already taken")
    }
}

impl<F: ResourceFactory> Drop for PooledResource<F> {
    fn drop(&mut self) {
        if let Some(entry) = self.take_entry() {
            self.pool.give_back_detached(entry);
        }
    }
}

impl<F: ResourceFactory> fmt::Debug for PooledResource<F>
where
    F::Resource: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledResource")
            .field("id", &self.id)
            .field("value", &self.value)
            .finish()
    }
}

/// Bounded, concurrently shared pool of resources built by a [`ResourceFactory`]
///
/// Cloning is cheap and yields a handle to the same pool.
///
/// # Examples
///
/// ```
/// use poolkeeper::{GenericFactory, PoolConfig, ResourcePool};
///
/// # #[tokio::main]
/// # async fn main() -> poolkeeper::PoolResult<()> {
/// let factory = GenericFactory::new(|| Ok(String::from("conn")));
/// let pool = ResourcePool::new(factory, PoolConfig::new().with_max(2))?;
/// pool.initialize().await?;
///
/// let conn = pool.borrow().await?;
/// assert_eq!(conn.as_str(), "conn");
/// pool.release(conn).await;
///
/// pool.destroy().await;
/// # Ok(())
/// # }
/// ```
pub struct ResourcePool<F: ResourceFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ResourceFactory> Clone for ResourcePool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ResourceFactory> fmt::Debug for ResourcePool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("name", &self.inner.name)
            .field("stats", &self.get_stats())
            .finish()
    }
}

impl<F: ResourceFactory> ResourcePool<F> {
    /// Create a pool named after the factory kind
    pub fn new(factory: F, config: PoolConfig) -> PoolResult<Self> {
        let name = factory.kind().to_string();
        Self::named(name, factory, config)
    }

    /// Create a named pool. Nothing is created until `initialize` or the
    /// first `borrow`.
    pub fn named(name: impl Into<String>, factory: F, config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;
        let max = config.max;
        Ok(Self {
            inner: Arc::new(PoolInner {
                name: name.into(),
                factory,
                state: Mutex::new(PoolState::new(max)),
                config,
                stats: StatsTracker::new(),
                next_id: AtomicU64::new(0),
                initialized: AtomicBool::new(false),
                evictor: Mutex::new(None),
            }),
        })
    }

    /// Pre-create `min` resources and start the eviction timer
    ///
    /// Individual creation failures are logged; the call only fails when
    /// resources were wanted and none could be created.
    pub async fn initialize(&self) -> PoolResult<()> {
        let inner = &self.inner;
        if inner.is_destroyed() {
            return Err(PoolError::PoolDestroyed);
        }
        if inner.initialized.swap(true, Ordering::AcqRel) {
            debug!(pool = %inner.name, "Pool already initialized");
            return Ok(());
        }

        let (created, failed) = inner.fill_to_min().await;

        if !inner.config.eviction_interval.is_zero() {
            let handle = crate::eviction::spawn_evictor(
                Arc::downgrade(inner),
                inner.config.eviction_interval,
            );
            *inner.evictor.lock() = Some(handle);
        }

        if failed > 0 && created == 0 {
            error!(pool = %inner.name, failed, "Pool initialization could not create any resource");
            return Err(PoolError::PoolInitialization { created, failed });
        }
        if failed > 0 {
            warn!(pool = %inner.name, created, failed, "Pool partially initialized");
        }
        info!(
            pool = %inner.name,
            kind = inner.factory.kind(),
            min = inner.config.min,
            max = inner.config.max,
            created,
            "Pool initialized"
        );
        Ok(())
    }

    /// Borrow a resource, waiting in line when the pool is exhausted
    pub async fn borrow(&self) -> PoolResult<PooledResource<F>> {
        match self.inner.acquire().await {
            Ok(lease) => {
                StatsTracker::incr(&self.inner.stats.borrowed);
                Ok(PooledResource::new(lease, Arc::clone(&self.inner)))
            }
            Err(err) => {
                StatsTracker::incr(&self.inner.stats.failed_borrows);
                Err(err)
            }
        }
    }

    /// Borrow without waiting: `None` when nothing is available right now
    pub async fn try_borrow(&self) -> Option<PooledResource<F>> {
        {
            let state = self.inner.state.lock();
            let queued_behind = self.inner.config.fairness && !state.waiters.is_empty();
            if state.destroyed || queued_behind || (state.idle.is_empty() && !state.has_capacity()) {
                return None;
            }
        }
        self.borrow().await.ok()
    }

    /// Return a borrowed resource
    pub async fn release(&self, resource: PooledResource<F>) {
        resource.release().await;
    }

    /// Borrow, run `callback`, and hand the resource back on every exit
    /// path, including errors and panics
    ///
    /// # Examples
    ///
    /// ```
    /// use poolkeeper::{GenericFactory, PoolConfig, PoolError, ResourcePool};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), PoolError> {
    /// let pool = ResourcePool::new(GenericFactory::new(|| Ok(Vec::<u8>::new())), PoolConfig::new())?;
    ///
    /// let len = pool
    ///     .with_resource(|buf| Box::pin(async move {
    ///         buf.extend_from_slice(b"hello");
    ///         Ok::<_, PoolError>(buf.len())
    ///     }))
    ///     .await?;
    /// assert_eq!(len, 5);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_resource<T, E, C>(&self, callback: C) -> Result<T, E>
    where
        C: for<'r> FnOnce(&'r mut F::Resource) -> BoxFuture<'r, Result<T, E>>,
        E: From<PoolError>,
    {
        let mut resource = self.borrow().await?;
        let outcome = AssertUnwindSafe(callback(&mut *resource)).catch_unwind().await;
        resource.release().await;
        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Destroy every idle resource and refill to `min`
    pub async fn clear(&self) -> PoolResult<()> {
        let drained: Vec<_> = {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return Err(PoolError::PoolDestroyed);
            }
            let drained = state.idle.drain(..).collect();
            state.grant_capacity();
            drained
        };
        debug!(pool = %self.inner.name, cleared = drained.len(), "Clearing idle resources");
        for entry in drained {
            self.inner.destroy_resource(entry).await;
        }
        self.inner.fill_to_min().await;
        Ok(())
    }

    /// Change the maximum size
    ///
    /// Shrinking destroys idle resources, oldest first, down to the new
    /// ceiling. Borrowed resources are destroyed on return while the pool
    /// is still above it.
    pub async fn resize(&self, new_max: usize) -> PoolResult<()> {
        let min = self.inner.config.min;
        if new_max < min || new_max == 0 {
            return Err(PoolError::InvalidResize {
                requested: new_max,
                min,
            });
        }

        let (old_max, excess): (usize, Vec<_>) = {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return Err(PoolError::PoolDestroyed);
            }
            let old_max = state.max;
            state.max = new_max;
            let surplus = state.total().saturating_sub(new_max).min(state.idle.len());
            let excess = state.idle.drain(..surplus).collect();
            state.grant_capacity();
            (old_max, excess)
        };

        info!(pool = %self.inner.name, old_max, new_max, destroyed = excess.len(), "Pool resized");
        for entry in excess {
            self.inner.destroy_resource(entry).await;
        }
        Ok(())
    }

    /// Shut the pool down for good
    ///
    /// Waiters are rejected with `PoolDestroyed` and idle resources are
    /// destroyed. Borrowed resources are destroyed as they come back.
    pub async fn destroy(&self) {
        let (idle, waiters, borrowed) = {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            let idle: Vec<_> = state.idle.drain(..).collect();
            let waiters: Vec<_> = state.waiters.drain(..).collect();
            let borrowed = state.borrowed.len();
            state.borrowed.clear();
            (idle, waiters, borrowed)
        };

        if let Some(handle) = self.inner.evictor.lock().take() {
            handle.abort();
        }

        let rejected = waiters.len();
        drop(waiters);

        let destroyed = idle.len();
        for entry in idle {
            self.inner.destroy_resource(entry).await;
        }
        info!(
            pool = %self.inner.name,
            destroyed,
            rejected,
            outstanding = borrowed,
            "Pool destroyed"
        );
    }

    pub fn get_stats(&self) -> PoolStats {
        self.inner.stats.snapshot(self.inner.sizes())
    }

    pub fn health_check(&self) -> PoolHealth {
        PoolHealth::from_stats(&self.get_stats())
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn factory(&self) -> &F {
        &self.inner.factory
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }

    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    pub fn borrowed_count(&self) -> usize {
        self.inner.state.lock().borrowed.len()
    }

    pub fn waiting_count(&self) -> usize {
        self.inner.state.lock().waiters.len()
    }

    /// Slots reserved by in-flight creation or validation
    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending
    }

    /// Idle plus borrowed resources
    pub fn size(&self) -> usize {
        let state = self.inner.state.lock();
        state.idle.len() + state.borrowed.len()
    }

    pub fn min(&self) -> usize {
        self.inner.config.min
    }

    /// Current maximum, reflecting any `resize`
    pub fn max(&self) -> usize {
        self.inner.state.lock().max
    }

    pub(crate) fn inner(&self) -> &Arc<PoolInner<F>> {
        &self.inner
    }
}
