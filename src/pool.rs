//! Bounded pools of exclusive engine connections.
//!
//! The engine's connections are not thread-safe, so each one is wrapped in a
//! [`Resource`] that exactly one caller may hold at a time. Two independent
//! pools exist per process, one sized for writes and one for reads; a resource
//! never crosses operation classes.
//!
//! Acquisition polls the available list under a mutex and backs off for a
//! random 0-500ms interval between attempts. The jitter keeps many blocked
//! callers from retrying in lockstep. There is no fairness guarantee:
//! whichever caller polls first after a release wins.

use crate::engine::{EngineConnection, StorageEngine};
use crate::{Error, Result};

use parking_lot::Mutex;
use rand::Rng;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Upper bound on the randomized retry back-off.
const MAX_BACKOFF: Duration = Duration::from_millis(500);

/// Which operation class a pool serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    Write,
    Read,
}

impl OperationClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationClass::Write => "write",
            OperationClass::Read => "read",
        }
    }
}

/// One pooled connection plus its identifier.
pub struct Resource {
    id: usize,
    conn: Box<dyn EngineConnection>,
}

impl Resource {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Exclusive access to the underlying connection.
    pub fn connection(&mut self) -> &mut dyn EngineConnection {
        self.conn.as_mut()
    }
}

/// Fixed-capacity pool for one operation class.
pub struct ResourcePool {
    class: OperationClass,
    capacity: usize,
    timeout: Duration,
    available: Mutex<Vec<Resource>>,
}

impl ResourcePool {
    /// Open exactly `capacity` connections against the shared engine handle.
    pub fn new(
        engine: &dyn StorageEngine,
        class: OperationClass,
        capacity: usize,
        timeout: Duration,
    ) -> Result<Arc<Self>> {
        let mut resources = Vec::with_capacity(capacity);
        for id in 0..capacity {
            let conn = engine.connect().map_err(|e| {
                Error::Engine(format!(
                    "failed to open {} pool connection {}: {}",
                    class.as_str(),
                    id,
                    e
                ))
            })?;
            resources.push(Resource { id, conn });
        }

        Ok(Arc::new(Self {
            class,
            capacity,
            timeout,
            available: Mutex::new(resources),
        }))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn class(&self) -> OperationClass {
        self.class
    }

    /// Number of resources currently sitting idle. Primarily a test hook.
    pub fn idle_count(&self) -> usize {
        self.available.lock().len()
    }

    /// Acquire a resource, waiting up to the pool's configured timeout.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledResource> {
        self.acquire_timeout(self.timeout).await
    }

    /// Acquire a resource, waiting up to `timeout`.
    ///
    /// A zero timeout makes a single attempt and fails immediately if the
    /// pool is empty.
    pub async fn acquire_timeout(self: &Arc<Self>, timeout: Duration) -> Result<PooledResource> {
        let start = Instant::now();
        loop {
            {
                let mut available = self.available.lock();
                if !available.is_empty() {
                    let resource = available.remove(0);
                    return Ok(PooledResource {
                        resource: Some(resource),
                        pool: Arc::clone(self),
                    });
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(Error::PoolTimeout {
                    class: self.class.as_str(),
                    waited_ms: elapsed.as_millis(),
                });
            }

            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..500));
            let remaining = timeout - elapsed;
            tokio::time::sleep(jitter.min(MAX_BACKOFF).min(remaining)).await;
        }
    }

    fn release(&self, resource: Resource) {
        let mut available = self.available.lock();
        debug_assert!(
            available.len() < self.capacity,
            "release would exceed pool capacity"
        );
        available.push(resource);
    }

    /// Drop every idle connection. Called on shutdown after the listener has
    /// stopped handing out new work; outstanding guards return their
    /// resources through the normal release path first.
    pub fn drain(&self) {
        let drained = {
            let mut available = self.available.lock();
            std::mem::take(&mut *available)
        };
        debug!(
            class = self.class.as_str(),
            count = drained.len(),
            "drained pool connections"
        );
    }
}

/// A resource checked out from the pool.
///
/// Returns the resource on drop, so every exit path of the operation using it
/// releases exactly once.
pub struct PooledResource {
    resource: Option<Resource>,
    pool: Arc<ResourcePool>,
}

impl std::fmt::Debug for PooledResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledResource").finish_non_exhaustive()
    }
}

impl Deref for PooledResource {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        self.resource.as_ref().expect("resource taken")
    }
}

impl DerefMut for PooledResource {
    fn deref_mut(&mut self) -> &mut Resource {
        self.resource.as_mut().expect("resource taken")
    }
}

impl Drop for PooledResource {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.pool.release(resource);
        }
    }
}
