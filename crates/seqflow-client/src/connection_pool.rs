//! Round-robin resource pools.
//!
//! A write session spreads its channels over a fixed set of data connections
//! (and flush executors, see [`crate::executor_pool`]) so that independent
//! channels do not queue behind one another. Resources are handed out in
//! strict round-robin order; there is no affinity and no exclusivity. Two
//! channels may share a connection, which is why transports must be safe for
//! concurrent use.
//!
//! ## Design
//!
//! - Resources are created up front. Creation is all-or-nothing: if one
//!   connection fails, the ones already opened are closed and the error is
//!   returned.
//! - `get_next()` is a single atomic increment: resource `i mod N` on the
//!   i-th call.
//! - `close()` marks the pool closed and releases every resource. Any later
//!   `get_next()` or `close()` fails with [`ClientError::PoolClosed`].
//!
//! ## Thread Safety
//!
//! Pools are `Send + Sync` and are shared through `Arc`.
//!
//! ## Examples
//!
//! ```ignore
//! let pool = ConnectionPool::connect(&connector, "localhost", 6726, 4, timeout).await?;
//! let transport = pool.get_next()?;
//! pool.close().await?;
//! ```

use crate::error::{ClientError, Result};
use crate::transport::{Connector, FlightTransport};
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fixed array of shared resources with a round-robin cursor.
#[derive(Debug)]
pub struct ResourcePool<T> {
    resources: Vec<T>,
    cursor: AtomicUsize,
    closed: AtomicBool,
}

impl<T: Clone> ResourcePool<T> {
    pub fn new(resources: Vec<T>) -> Self {
        Self {
            resources,
            cursor: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Next resource in round-robin order.
    pub fn get_next(&self) -> Result<T> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::PoolClosed);
        }
        if self.resources.is_empty() {
            return Err(ClientError::Internal("resource pool is empty".to_string()));
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.resources.len();
        Ok(self.resources[index].clone())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Marks the pool closed and returns its resources for release.
    ///
    /// Only the first caller gets the resources; later callers get
    /// [`ClientError::PoolClosed`].
    pub(crate) fn shut(&self) -> Result<&[T]> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(ClientError::PoolClosed);
        }
        Ok(&self.resources)
    }
}

/// Opens one connection, bounded by `timeout`.
pub(crate) async fn connect_with_timeout(
    connector: &dyn Connector,
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<Arc<dyn FlightTransport>> {
    match tokio::time::timeout(timeout, connector.connect(host, port)).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Timeout(timeout.as_millis() as u64)),
    }
}

/// Pool of data connections used by channel writers.
pub struct ConnectionPool {
    pool: ResourcePool<Arc<dyn FlightTransport>>,
}

impl ConnectionPool {
    /// Opens `size` connections concurrently.
    ///
    /// Fails with the first connection error; connections that did open are
    /// closed before returning.
    pub async fn connect(
        connector: &dyn Connector,
        host: &str,
        port: u16,
        size: usize,
        timeout: Duration,
    ) -> Result<Self> {
        if size == 0 {
            return Err(ClientError::Config(
                "connection pool size must be greater than zero".to_string(),
            ));
        }

        debug!(host = %host, port = port, size = size, "Opening connection pool");

        let attempts = join_all(
            (0..size).map(|_| connect_with_timeout(connector, host, port, timeout)),
        )
        .await;

        let mut opened = Vec::with_capacity(size);
        let mut first_error = None;
        for attempt in attempts {
            match attempt {
                Ok(transport) => opened.push(transport),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(_) => {}
            }
        }

        if let Some(err) = first_error {
            warn!(
                host = %host,
                opened = opened.len(),
                error = %err,
                "Connection pool creation failed, releasing opened connections"
            );
            for transport in &opened {
                if let Err(e) = transport.close().await {
                    debug!(error = %e, "Failed to close connection during pool rollback");
                }
            }
            return Err(err);
        }

        info!(host = %host, port = port, size = size, "Connection pool ready");
        Ok(Self {
            pool: ResourcePool::new(opened),
        })
    }

    pub fn get_next(&self) -> Result<Arc<dyn FlightTransport>> {
        self.pool.get_next()
    }

    pub fn size(&self) -> usize {
        self.pool.len()
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Closes every pooled connection.
    ///
    /// Individual close failures are logged; the pool is closed regardless.
    pub async fn close(&self) -> Result<()> {
        let transports = self.pool.shut()?;
        for transport in transports {
            if let Err(e) = transport.close().await {
                warn!(error = %e, "Failed to close pooled connection");
            }
        }
        debug!(size = transports.len(), "Connection pool closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_order() {
        let pool = ResourcePool::new(vec![0usize, 1, 2]);
        let picked: Vec<usize> = (0..7).map(|_| pool.get_next().unwrap()).collect();
        assert_eq!(picked, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_closed_pool_rejects() {
        let pool = ResourcePool::new(vec!["a", "b"]);
        assert_eq!(pool.shut().unwrap().len(), 2);
        assert!(pool.is_closed());
        assert!(matches!(pool.get_next(), Err(ClientError::PoolClosed)));
        assert!(matches!(pool.shut(), Err(ClientError::PoolClosed)));
    }
}
