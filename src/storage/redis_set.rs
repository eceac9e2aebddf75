//! A store backed by a single Redis set.

use std::{collections::HashSet, num::NonZeroUsize};

use redis::Commands;

use super::{DomainStore, Pool, Scan, StoreError};
use crate::domain::{Backend, PoolConfig, RedisConfig};

impl From<redis::RedisError> for StoreError {
    fn from(error: redis::RedisError) -> Self {
        Self::operation(Backend::Redis, error)
    }
}

/// Domains stored as members of one Redis set.
///
/// Scans use `SSCAN`, which may return a member more than once if the set
/// is modified mid-scan.
pub struct RedisStore {
    pool: Pool<redis::Client>,
    key: String,
}

impl RedisStore {
    /// Connects to the server at `config.url`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the URL is malformed or the server
    /// cannot be reached.
    pub fn open(config: &RedisConfig, pool: PoolConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|error| StoreError::connect(Backend::Redis, error))?;
        let store = Self {
            pool: Pool::new(Backend::Redis, client, pool)?,
            key: config.key.clone(),
        };
        tracing::debug!("Using Redis set '{}'", store.key);
        Ok(store)
    }
}

impl DomainStore for RedisStore {
    fn backend(&self) -> Backend {
        Backend::Redis
    }

    fn add_one(&self, domain: &str) -> Result<bool, StoreError> {
        let added: u64 = self.pool.get()?.sadd(&self.key, domain)?;
        Ok(added == 1)
    }

    fn add_many(&self, domains: &[String]) -> Result<u64, StoreError> {
        // SADD with no members is a syntax error.
        if domains.is_empty() {
            return Ok(0);
        }
        Ok(self.pool.get()?.sadd(&self.key, domains)?)
    }

    fn remove_one(&self, domain: &str) -> Result<bool, StoreError> {
        let removed: u64 = self.pool.get()?.srem(&self.key, domain)?;
        Ok(removed == 1)
    }

    fn remove_many(&self, domains: &[String]) -> Result<u64, StoreError> {
        if domains.is_empty() {
            return Ok(0);
        }
        Ok(self.pool.get()?.srem(&self.key, domains)?)
    }

    fn exists_any(&self) -> Result<bool, StoreError> {
        Ok(self.pool.get()?.exists(&self.key)?)
    }

    fn count(&self) -> Result<u64, StoreError> {
        Ok(self.pool.get()?.scard(&self.key)?)
    }

    fn clear_all(&self) -> Result<bool, StoreError> {
        let deleted: u64 = self.pool.get()?.del(&self.key)?;
        Ok(deleted > 0)
    }

    fn all(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self.pool.get()?.smembers(&self.key)?)
    }

    fn scan(&self, batch_size: NonZeroUsize) -> Result<Scan<'_>, StoreError> {
        let mut connection = self.pool.get()?;
        let key = self.key.as_str();
        // `None` once the server hands back cursor 0.
        let mut cursor = Some(0_u64);

        Ok(Scan::from_pages(move || {
            let Some(current) = cursor else {
                return Ok(None);
            };
            let (next, page): (u64, Vec<String>) = redis::cmd("SSCAN")
                .arg(key)
                .arg(current)
                .arg("COUNT")
                .arg(batch_size.get())
                .query(&mut *connection)?;
            cursor = (next != 0).then_some(next);
            Ok(Some(page))
        }))
    }
}
