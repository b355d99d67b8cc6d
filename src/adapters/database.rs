//! Database connection pooling over a caller-supplied driver

use crate::errors::PoolResult;
use crate::factory::ResourceFactory;

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// The pieces of a database driver a pool needs
#[async_trait]
pub trait DatabaseDriver: Send + Sync + 'static {
    type Connection: Send + Sync + 'static;

    async fn connect(&self) -> PoolResult<Self::Connection>;

    async fn disconnect(&self, connection: Self::Connection) -> PoolResult<()>;

    /// A trivial round trip such as `SELECT 1`
    async fn ping(&self, connection: &Self::Connection) -> PoolResult<()>;
}

/// Maps the pool lifecycle onto a [`DatabaseDriver`]
pub struct DatabaseFactory<D> {
    driver: D,
    ping_timeout: Duration,
}

impl<D: DatabaseDriver> DatabaseFactory<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            ping_timeout: Duration::from_secs(5),
        }
    }

    /// A ping slower than this marks the connection invalid
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }
}

#[async_trait]
impl<D: DatabaseDriver> ResourceFactory for DatabaseFactory<D> {
    type Resource = D::Connection;

    async fn create(&self) -> PoolResult<D::Connection> {
        self.driver.connect().await
    }

    async fn destroy(&self, connection: D::Connection) -> PoolResult<()> {
        self.driver.disconnect(connection).await
    }

    async fn validate(&self, connection: &D::Connection) -> bool {
        match tokio::time::timeout(self.ping_timeout, self.driver.ping(connection)).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                debug!(error = %err, "Connection ping failed");
                false
            }
            Err(_) => {
                debug!(timeout = ?self.ping_timeout, "Connection ping timed out");
                false
            }
        }
    }

    fn kind(&self) -> &'static str {
        "database"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::errors::PoolError;
    use crate::pool::ResourcePool;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeDriver {
        connects: AtomicUsize,
        disconnects: AtomicUsize,
        reachable: Arc<AtomicBool>,
        stall: bool,
    }

    struct FakeConnection {
        id: usize,
    }

    #[async_trait]
    impl DatabaseDriver for FakeDriver {
        type Connection = FakeConnection;

        async fn connect(&self) -> PoolResult<FakeConnection> {
            if !self.reachable.load(Ordering::SeqCst) {
                return Err(PoolError::CreationFailure("connection refused".into()));
            }
            let id = self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(FakeConnection { id })
        }

        async fn disconnect(&self, _connection: FakeConnection) -> PoolResult<()> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn ping(&self, _connection: &FakeConnection) -> PoolResult<()> {
            if self.stall {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.reachable.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(PoolError::RequestFailed("server gone".into()))
            }
        }
    }

    fn driver() -> FakeDriver {
        FakeDriver {
            reachable: Arc::new(AtomicBool::new(true)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_connections_are_pooled() {
        let factory = DatabaseFactory::new(driver());
        let pool = ResourcePool::new(factory, PoolConfig::new().with_min(2).with_max(4).without_eviction()).unwrap();
        pool.initialize().await.unwrap();

        let conn = pool.borrow().await.unwrap();
        assert!(conn.id < 2);
        pool.release(conn).await;
        assert_eq!(pool.factory().driver().connects.load(Ordering::SeqCst), 2);

        pool.destroy().await;
        assert_eq!(pool.factory().driver().disconnects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_ping_invalidates() {
        let driver = driver();
        let reachable = Arc::clone(&driver.reachable);
        let factory = DatabaseFactory::new(driver);
        let conn = factory.create().await.unwrap();
        assert!(factory.validate(&conn).await);

        reachable.store(false, Ordering::SeqCst);
        assert!(!factory.validate(&conn).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_ping_invalidates() {
        let factory = DatabaseFactory::new(FakeDriver {
            stall: true,
            ..driver()
        })
        .with_ping_timeout(Duration::from_millis(100));
        let conn = factory.create().await.unwrap();
        assert!(!factory.validate(&conn).await);
    }
}
