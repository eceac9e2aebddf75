//! Backing stores for the domain set.
//!
//! Every backend implements [`DomainStore`], a small capability interface
//! over a set of unique strings. The concrete backend is picked from the
//! [`Config`] at startup by [`open`].

use std::{collections::HashSet, num::NonZeroUsize};

use crate::domain::{Backend, Config};

pub mod memory;
pub mod pool;
pub mod postgresql;
pub mod redis_set;
mod scan;
pub mod sqlite;

pub use memory::MemoryStore;
pub use pool::{Pool, Pooled};
pub use postgresql::PostgresStore;
pub use redis_set::RedisStore;
pub use scan::Scan;
pub use sqlite::SqliteStore;

/// A store holding a set of unique domain strings.
///
/// Uniqueness is exact, case-sensitive string equality. Each call is one
/// logical operation; connections checked out for it are released before
/// it returns (or, for [`DomainStore::scan`], when the scan is dropped).
pub trait DomainStore {
    /// The backend kind, for messages.
    fn backend(&self) -> Backend;

    /// Inserts one domain, returning `true` if it was not already present.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be reached or the write
    /// fails.
    fn add_one(&self, domain: &str) -> Result<bool, StoreError>;

    /// Inserts a batch, returning how many were new.
    ///
    /// Domains already present (or repeated within the batch) are skipped
    /// rather than failing the batch.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the batch could not be written.
    fn add_many(&self, domains: &[String]) -> Result<u64, StoreError>;

    /// Removes one domain, returning `true` if it was present.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be reached or the write
    /// fails.
    fn remove_one(&self, domain: &str) -> Result<bool, StoreError>;

    /// Removes a batch, returning how many were present.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the batch could not be removed.
    fn remove_many(&self, domains: &[String]) -> Result<u64, StoreError>;

    /// Returns `true` if the set holds at least one domain.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be queried.
    fn exists_any(&self) -> Result<bool, StoreError>;

    /// Returns the number of domains in the set.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be queried.
    fn count(&self) -> Result<u64, StoreError>;

    /// Removes every domain, returning `true` if there was anything to remove.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be cleared.
    fn clear_all(&self) -> Result<bool, StoreError>;

    /// Loads the whole set into memory.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be queried.
    fn all(&self) -> Result<HashSet<String>, StoreError>;

    /// Iterates the set lazily, fetching `batch_size` domains per round trip.
    ///
    /// The scan is finite and cannot be restarted; dropping it early is
    /// fine and releases its connection.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the scan cannot be started. Errors while
    /// fetching later batches are yielded by the iterator.
    fn scan(&self, batch_size: NonZeroUsize) -> Result<Scan<'_>, StoreError>;
}

/// Opens the backend selected by `config`.
///
/// SQL backends create their schema if it is missing.
///
/// # Errors
///
/// Returns a [`StoreError`] if the backend cannot be reached.
pub fn open(config: &Config) -> Result<Box<dyn DomainStore>, StoreError> {
    let store: Box<dyn DomainStore> = match config.backend {
        Backend::Sqlite => Box::new(SqliteStore::open(&config.sqlite, config.pool)?),
        Backend::Postgres => Box::new(PostgresStore::open(&config.postgresql, config.pool)?),
        Backend::Redis => Box::new(RedisStore::open(&config.redis, config.pool)?),
        Backend::Memory => Box::new(MemoryStore::new()),
    };
    tracing::debug!("Opened {} store", store.backend());
    Ok(store)
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by a [`DomainStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("failed to connect to the {backend} store")]
    Connect {
        /// The backend.
        backend: Backend,
        /// The underlying error.
        #[source]
        source: BoxError,
    },

    /// A query or command failed.
    #[error("{backend} store operation failed")]
    Operation {
        /// The backend.
        backend: Backend,
        /// The underlying error.
        #[source]
        source: BoxError,
    },

    /// No pooled connection became free within the connection timeout.
    #[error("no {backend} connection became available")]
    PoolExhausted {
        /// The backend.
        backend: Backend,
        /// The pool's error, carrying the last connection failure if any.
        #[source]
        source: r2d2::Error,
    },
}

impl StoreError {
    /// A connection failure for `backend`.
    pub fn connect(backend: Backend, source: impl Into<BoxError>) -> Self {
        Self::Connect {
            backend,
            source: source.into(),
        }
    }

    /// A failed query or command on `backend`.
    pub fn operation(backend: Backend, source: impl Into<BoxError>) -> Self {
        Self::Operation {
            backend,
            source: source.into(),
        }
    }
}

/// Converts a row count reported by a SQL backend.
fn row_count(count: i64) -> u64 {
    u64::try_from(count).unwrap_or_default()
}

/// Converts a batch size into a SQL `LIMIT`.
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
