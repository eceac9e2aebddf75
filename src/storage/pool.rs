//! Connection pools for the SQL and Redis backends, built on r2d2.
//!
//! Connections are checked out as [`Pooled`] guards and go back to the pool
//! when the guard is dropped.

use std::fmt;

use r2d2::{HandleError, ManageConnection, PooledConnection};

use super::StoreError;
use crate::domain::{Backend, PoolConfig};

/// A checked-out connection.
pub type Pooled<M> = PooledConnection<M>;

/// A pool of at most `max_connections` connections to one backend.
pub struct Pool<M: ManageConnection> {
    inner: r2d2::Pool<M>,
    backend: Backend,
}

impl<M: ManageConnection> Pool<M> {
    /// Creates a pool and waits for `min_connections` connections, so an
    /// unreachable store is reported before any work starts.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connect`] if the initial connections cannot be
    /// opened within the pool's connection timeout.
    pub fn new(backend: Backend, manager: M, config: PoolConfig) -> Result<Self, StoreError> {
        let max_size = u32::try_from(config.max_connections.max(1)).unwrap_or(u32::MAX);
        let min_idle = u32::try_from(config.min_connections)
            .unwrap_or(u32::MAX)
            .min(max_size);

        let inner = r2d2::Pool::builder()
            .max_size(max_size)
            .min_idle(Some(min_idle))
            .connection_timeout(config.connection_timeout())
            .error_handler(Box::new(LogErrors(backend)))
            .build(manager)
            .map_err(|error| StoreError::connect(backend, error))?;
        tracing::debug!("Opened {min_idle} {backend} connections (max {max_size})");

        Ok(Self { inner, backend })
    }

    /// Checks out a connection, waiting up to the connection timeout for one
    /// to come free.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PoolExhausted`] if no connection could be
    /// handed out in time.
    pub fn get(&self) -> Result<Pooled<M>, StoreError> {
        self.inner.get().map_err(|source| StoreError::PoolExhausted {
            backend: self.backend,
            source,
        })
    }

    /// Open and idle connection counts.
    #[must_use]
    pub fn state(&self) -> r2d2::State {
        self.inner.state()
    }
}

impl<M: ManageConnection> fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("backend", &self.backend)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Sends connection errors raised inside the pool to the log.
#[derive(Debug, Clone, Copy)]
struct LogErrors(Backend);

impl<E: fmt::Display> HandleError<E> for LogErrors {
    fn handle_error(&self, error: E) {
        tracing::warn!("{} connection failed: {error}", self.0);
    }
}
