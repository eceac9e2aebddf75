//! A store backed by a table in a local SQLite database.

use std::{collections::HashSet, num::NonZeroUsize, time::Duration};

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Row, params};

use super::{DomainStore, Pool, Scan, StoreError, row_count, sql_limit};
use crate::domain::{Backend, PoolConfig, SqliteConfig};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS domains (domain TEXT PRIMARY KEY NOT NULL) WITHOUT ROWID";
const INSERT: &str = "INSERT OR IGNORE INTO domains (domain) VALUES (?1)";
const DELETE: &str = "DELETE FROM domains WHERE domain = ?1";
const FIRST_PAGE: &str = "SELECT domain FROM domains ORDER BY domain LIMIT ?1";
const NEXT_PAGE: &str = "SELECT domain FROM domains WHERE domain > ?1 ORDER BY domain LIMIT ?2";

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::operation(Backend::Sqlite, error)
    }
}

/// Domains stored in the `domains` table of a SQLite database file.
///
/// The text primary key gives byte-wise uniqueness and ordering, which
/// scans page through by key.
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `config.path`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the file or its parent directory cannot
    /// be created, or the schema cannot be applied.
    pub fn open(config: &SqliteConfig, pool: PoolConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|error| StoreError::connect(Backend::Sqlite, error))?;
        }

        let manager = SqliteConnectionManager::file(&config.path)
            .with_init(|connection| connection.busy_timeout(BUSY_TIMEOUT));
        let store = Self {
            pool: Pool::new(Backend::Sqlite, manager, pool)?,
        };
        store.pool.get()?.execute_batch(SCHEMA)?;
        tracing::debug!("Using SQLite database at {}", config.path.display());
        Ok(store)
    }

    fn write_each(&self, sql: &str, domains: &[String]) -> Result<u64, StoreError> {
        if domains.is_empty() {
            return Ok(0);
        }

        let mut connection = self.pool.get()?;
        let transaction = connection.transaction()?;
        let mut changed = 0;
        {
            let mut statement = transaction.prepare_cached(sql)?;
            for domain in domains {
                changed += statement.execute(params![domain])? as u64;
            }
        }
        transaction.commit()?;
        Ok(changed)
    }
}

impl DomainStore for SqliteStore {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn add_one(&self, domain: &str) -> Result<bool, StoreError> {
        Ok(self.pool.get()?.execute(INSERT, params![domain])? == 1)
    }

    fn add_many(&self, domains: &[String]) -> Result<u64, StoreError> {
        self.write_each(INSERT, domains)
    }

    fn remove_one(&self, domain: &str) -> Result<bool, StoreError> {
        Ok(self.pool.get()?.execute(DELETE, params![domain])? == 1)
    }

    fn remove_many(&self, domains: &[String]) -> Result<u64, StoreError> {
        self.write_each(DELETE, domains)
    }

    fn exists_any(&self) -> Result<bool, StoreError> {
        let connection = self.pool.get()?;
        Ok(connection.query_row("SELECT EXISTS (SELECT 1 FROM domains)", [], |row| {
            row.get(0)
        })?)
    }

    fn count(&self) -> Result<u64, StoreError> {
        let connection = self.pool.get()?;
        let count: i64 = connection.query_row("SELECT COUNT(*) FROM domains", [], |row| row.get(0))?;
        Ok(row_count(count))
    }

    fn clear_all(&self) -> Result<bool, StoreError> {
        Ok(self.pool.get()?.execute("DELETE FROM domains", [])? > 0)
    }

    fn all(&self) -> Result<HashSet<String>, StoreError> {
        let connection = self.pool.get()?;
        let mut statement = connection.prepare("SELECT domain FROM domains")?;
        let domains = statement
            .query_map([], domain_column)?
            .collect::<Result<HashSet<String>, _>>()?;
        Ok(domains)
    }

    fn scan(&self, batch_size: NonZeroUsize) -> Result<Scan<'_>, StoreError> {
        let connection = self.pool.get()?;
        Ok(Scan::keyset(batch_size, move |after, limit| {
            Ok(page(&connection, after, sql_limit(limit))?)
        }))
    }
}

fn page(connection: &Connection, after: Option<&str>, limit: i64) -> rusqlite::Result<Vec<String>> {
    let mut statement;
    let rows = match after {
        None => {
            statement = connection.prepare_cached(FIRST_PAGE)?;
            statement.query_map(params![limit], domain_column)?
        }
        Some(after) => {
            statement = connection.prepare_cached(NEXT_PAGE)?;
            statement.query_map(params![after, limit], domain_column)?
        }
    };
    rows.collect()
}

fn domain_column(row: &Row<'_>) -> rusqlite::Result<String> {
    row.get(0)
}
