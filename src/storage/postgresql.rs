//! A store backed by a table in PostgreSQL.

use std::{collections::HashSet, num::NonZeroUsize, time::Duration};

use postgres::{NoTls, Row};
use r2d2_postgres::PostgresConnectionManager;

use super::{DomainStore, Pool, Scan, StoreError, row_count, sql_limit};
use crate::domain::{Backend, PoolConfig, PostgresConfig};

// "C" collation keeps ordering and uniqueness byte-wise, matching the
// other backends.
const SCHEMA: &str = r#"CREATE TABLE IF NOT EXISTS domains (domain TEXT COLLATE "C" PRIMARY KEY)"#;
const FIRST_PAGE: &str = "SELECT domain FROM domains ORDER BY domain LIMIT $1";
const NEXT_PAGE: &str = "SELECT domain FROM domains WHERE domain > $1 ORDER BY domain LIMIT $2";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

impl From<postgres::Error> for StoreError {
    fn from(error: postgres::Error) -> Self {
        Self::operation(Backend::Postgres, error)
    }
}

/// Domains stored in the `domains` table of a PostgreSQL database.
pub struct PostgresStore {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl PostgresStore {
    /// Connects and creates the `domains` table if it is missing.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the server cannot be reached or the
    /// schema cannot be applied.
    pub fn open(config: &PostgresConfig, pool: PoolConfig) -> Result<Self, StoreError> {
        let mut client_config = postgres::Config::new();
        client_config
            .host(&config.host)
            .port(config.port)
            .dbname(&config.database)
            .user(&config.user)
            .application_name("bountycatch")
            .connect_timeout(CONNECT_TIMEOUT);
        if !config.password.is_empty() {
            client_config.password(&config.password);
        }

        tracing::debug!(
            "Connecting to PostgreSQL at {}:{}/{}",
            config.host,
            config.port,
            config.database
        );
        let store = Self {
            pool: Pool::new(
                Backend::Postgres,
                PostgresConnectionManager::new(client_config, NoTls),
                pool,
            )?,
        };
        store.pool.get()?.batch_execute(SCHEMA)?;
        Ok(store)
    }
}

impl DomainStore for PostgresStore {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    fn add_one(&self, domain: &str) -> Result<bool, StoreError> {
        let inserted = self.pool.get()?.execute(
            "INSERT INTO domains (domain) VALUES ($1) ON CONFLICT DO NOTHING",
            &[&domain],
        )?;
        Ok(inserted == 1)
    }

    fn add_many(&self, domains: &[String]) -> Result<u64, StoreError> {
        if domains.is_empty() {
            return Ok(0);
        }
        // One statement per batch; ON CONFLICT also absorbs repeats within
        // the batch.
        Ok(self.pool.get()?.execute(
            "INSERT INTO domains (domain) SELECT unnest($1::text[]) ON CONFLICT DO NOTHING",
            &[&domains],
        )?)
    }

    fn remove_one(&self, domain: &str) -> Result<bool, StoreError> {
        let removed = self
            .pool
            .get()?
            .execute("DELETE FROM domains WHERE domain = $1", &[&domain])?;
        Ok(removed == 1)
    }

    fn remove_many(&self, domains: &[String]) -> Result<u64, StoreError> {
        if domains.is_empty() {
            return Ok(0);
        }
        Ok(self
            .pool
            .get()?
            .execute("DELETE FROM domains WHERE domain = ANY($1)", &[&domains])?)
    }

    fn exists_any(&self) -> Result<bool, StoreError> {
        let row = self
            .pool
            .get()?
            .query_one("SELECT EXISTS (SELECT 1 FROM domains)", &[])?;
        Ok(row.try_get(0)?)
    }

    fn count(&self) -> Result<u64, StoreError> {
        let row = self
            .pool
            .get()?
            .query_one("SELECT COUNT(*) FROM domains", &[])?;
        Ok(row_count(row.try_get(0)?))
    }

    fn clear_all(&self) -> Result<bool, StoreError> {
        let mut client = self.pool.get()?;
        let mut transaction = client.transaction()?;
        let had_data: bool = transaction
            .query_one("SELECT EXISTS (SELECT 1 FROM domains)", &[])?
            .try_get(0)?;
        if had_data {
            transaction.batch_execute("TRUNCATE TABLE domains")?;
        }
        transaction.commit()?;
        Ok(had_data)
    }

    fn all(&self) -> Result<HashSet<String>, StoreError> {
        let rows = self
            .pool
            .get()?
            .query("SELECT domain FROM domains", &[])?;
        Ok(rows
            .iter()
            .map(domain_column)
            .collect::<Result<HashSet<String>, _>>()?)
    }

    fn scan(&self, batch_size: NonZeroUsize) -> Result<Scan<'_>, StoreError> {
        let mut client = self.pool.get()?;
        Ok(Scan::keyset(batch_size, move |after, limit| {
            let limit = sql_limit(limit);
            let rows = match after {
                None => client.query(FIRST_PAGE, &[&limit])?,
                Some(after) => client.query(NEXT_PAGE, &[&after, &limit])?,
            };
            Ok(rows
                .iter()
                .map(domain_column)
                .collect::<Result<Vec<String>, _>>()?)
        }))
    }
}

fn domain_column(row: &Row) -> Result<String, postgres::Error> {
    row.try_get(0)
}
