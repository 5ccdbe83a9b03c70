//! Generic bounded connection pool.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::{HeimdallError, Result};

/// Creates and disposes of pooled resources.
#[async_trait]
pub trait ManageConnection: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Create a new resource.
    async fn connect(&self) -> Result<Self::Connection>;

    /// Dispose of a resource that will not be reused.
    fn close(&self, conn: Self::Connection) {
        drop(conn);
    }
}

/// Pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Resources alive at once (in use plus idle). Default: 10.
    pub max_size: usize,
    /// Idle resources kept for reuse; extras are closed on release.
    /// Default: `max_size`.
    pub max_idle: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(10)
    }
}

impl PoolConfig {
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            max_size,
            max_idle: max_size,
        }
    }

    pub fn max_idle(mut self, n: usize) -> Self {
        self.max_idle = n.min(self.max_size);
        self
    }
}

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub max_size: usize,
    pub in_use: usize,
    pub idle: usize,
}

struct PoolInner<M: ManageConnection> {
    manager: M,
    config: PoolConfig,
    slots: Arc<Semaphore>,
    idle: Mutex<Vec<M::Connection>>,
}

impl<M: ManageConnection> PoolInner<M> {
    fn idle(&self) -> MutexGuard<'_, Vec<M::Connection>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self, conn: M::Connection, broken: bool) {
        if broken || self.slots.is_closed() {
            self.manager.close(conn);
            return;
        }
        let mut idle = self.idle();
        if idle.len() < self.config.max_idle {
            idle.push(conn);
        } else {
            drop(idle);
            debug!("idle set full, closing connection");
            self.manager.close(conn);
        }
    }
}

/// Bounded pool of resources created by a [`ManageConnection`].
///
/// [`acquire`](Self::acquire) hands out an idle resource, creates one if
/// the pool is under capacity, and otherwise waits until one is
/// released. The returned guard releases on drop, so every exit path
/// returns the slot exactly once.
pub struct ConnectionPool<M: ManageConnection> {
    inner: Arc<PoolInner<M>>,
}

impl<M: ManageConnection> Clone for ConnectionPool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: ManageConnection> fmt::Debug for ConnectionPool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("status", &self.status())
            .finish()
    }
}

impl<M: ManageConnection> ConnectionPool<M> {
    pub fn new(manager: M, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                manager,
                slots: Arc::new(Semaphore::new(config.max_size)),
                idle: Mutex::new(Vec::with_capacity(config.max_idle)),
                config,
            }),
        }
    }

    /// Take a resource, waiting for a release when the pool is exhausted.
    pub async fn acquire(&self) -> Result<PooledConnection<M>> {
        let permit = self
            .inner
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| HeimdallError::Internal("connection pool closed".to_string()))?;

        let reused = self.inner.idle().pop();
        let conn = match reused {
            Some(conn) => conn,
            // A failed connect drops the permit, freeing the slot.
            None => self.inner.manager.connect().await?,
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            broken: false,
            _permit: permit,
        })
    }

    /// Stop handing out resources and close every idle one.
    ///
    /// Resources still in use are closed when released.
    pub fn close(&self) {
        self.inner.slots.close();
        let drained: Vec<M::Connection> = self.inner.idle().drain(..).collect();
        for conn in drained {
            self.inner.manager.close(conn);
        }
    }

    pub fn status(&self) -> PoolStatus {
        let max_size = self.inner.config.max_size;
        PoolStatus {
            max_size,
            in_use: max_size.saturating_sub(self.inner.slots.available_permits()),
            idle: self.inner.idle().len(),
        }
    }
}

/// A checked-out resource. Returned to the pool on drop.
pub struct PooledConnection<M: ManageConnection> {
    /// Always `Some` until dropped.
    conn: Option<M::Connection>,
    pool: Arc<PoolInner<M>>,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl<M: ManageConnection> PooledConnection<M> {
    /// Close the resource instead of returning it to the idle set.
    pub fn discard(mut self) {
        self.broken = true;
    }
}

impl<M: ManageConnection> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection held until drop")
    }
}

impl<M: ManageConnection> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection held until drop")
    }
}

impl<M: ManageConnection> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, self.broken);
        }
    }
}
