use std::{
    fmt,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::{Deserialize, Serialize};

/// Runtime configuration.
///
/// Loaded from a TOML file (see [`Config::discover`]) and then overridden
/// from the environment (see [`Config::apply_env`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "toml::Table", into = "Versions")]
pub struct Config {
    /// Which store holds the domain set.
    pub backend: Backend,

    /// Domains buffered per insert during ingestion.
    ingest_batch_size: usize,

    /// Domains fetched per round trip while scanning.
    scan_batch_size: usize,

    /// Domains removed per round trip when removing from a list.
    remove_batch_size: usize,

    /// Connection pool bounds.
    pub pool: PoolConfig,

    /// Settings for the `sqlite` backend.
    pub sqlite: SqliteConfig,

    /// Settings for the `postgres` backend.
    pub postgresql: PostgresConfig,

    /// Settings for the `redis` backend.
    pub redis: RedisConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            ingest_batch_size: default_ingest_batch_size(),
            scan_batch_size: default_scan_batch_size(),
            remove_batch_size: default_remove_batch_size(),
            pool: PoolConfig::default(),
            sqlite: SqliteConfig::default(),
            postgresql: PostgresConfig::default(),
            redis: RedisConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, if the TOML content is
    /// invalid, or if the values fail [`Config::validate`].
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration from `explicit` if given, otherwise from the
    /// first file in [`Config::search_paths`] that exists.
    ///
    /// Falls back to the defaults when no file is found.
    ///
    /// # Errors
    ///
    /// Returns an error if the chosen file cannot be loaded.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, LoadError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match Self::search_paths().into_iter().find(|path| path.is_file()) {
            Some(path) => {
                tracing::debug!("Loading config from {}", path.display());
                Self::load(&path)
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// The locations checked by [`Config::discover`], most specific first.
    #[must_use]
    pub fn search_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|dir| dir.join("bountycatch").join("config.toml")),
            dirs::home_dir().map(|dir| dir.join(".bountycatch").join("config.toml")),
            Some(PathBuf::from("/etc/bountycatch/config.toml")),
            Some(PathBuf::from("bountycatch.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Applies environment overrides, reading variables through `var`.
    ///
    /// Recognised: `BOUNTYCATCH_BACKEND`, `BOUNTYCATCH_SQLITE_PATH`,
    /// `PGHOST`, `PGPORT`, `PGDATABASE`, `PGUSER`, `PGPASSWORD`, `REDIS_URL`
    /// and `BOUNTYCATCH_REDIS_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Invalid`] if a variable holds a value that does
    /// not parse, or leaves the configuration invalid.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), LoadError> {
        if let Some(backend) = var("BOUNTYCATCH_BACKEND") {
            self.backend = backend
                .parse()
                .map_err(|e| LoadError::Invalid(format!("BOUNTYCATCH_BACKEND: {e}")))?;
        }
        if let Some(path) = var("BOUNTYCATCH_SQLITE_PATH") {
            self.sqlite.path = PathBuf::from(path);
        }
        if let Some(host) = var("PGHOST") {
            self.postgresql.host = host;
        }
        if let Some(port) = var("PGPORT") {
            self.postgresql.port = port
                .parse()
                .map_err(|e| LoadError::Invalid(format!("PGPORT '{port}': {e}")))?;
        }
        if let Some(database) = var("PGDATABASE") {
            self.postgresql.database = database;
        }
        if let Some(user) = var("PGUSER") {
            self.postgresql.user = user;
        }
        if let Some(password) = var("PGPASSWORD") {
            self.postgresql.password = password;
        }
        if let Some(url) = var("REDIS_URL") {
            self.redis.url = url;
        }
        if let Some(key) = var("BOUNTYCATCH_REDIS_KEY") {
            self.redis.key = key;
        }
        self.validate()
    }

    /// Checks that batch sizes are non-zero and the pool bounds are ordered.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), LoadError> {
        for (name, value) in [
            ("ingest_batch_size", self.ingest_batch_size),
            ("scan_batch_size", self.scan_batch_size),
            ("remove_batch_size", self.remove_batch_size),
            ("pool.max_connections", self.pool.max_connections),
        ] {
            if value == 0 {
                return Err(LoadError::Invalid(format!("{name} must be at least 1")));
            }
        }
        if self.pool.connection_timeout_secs == 0 {
            return Err(LoadError::Invalid(
                "pool.connection_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.pool.min_connections > self.pool.max_connections {
            return Err(LoadError::Invalid(format!(
                "pool.min_connections ({}) exceeds pool.max_connections ({})",
                self.pool.min_connections, self.pool.max_connections
            )));
        }
        if self.redis.key.is_empty() {
            return Err(LoadError::Invalid("redis.key must not be empty".to_string()));
        }
        Ok(())
    }

    /// Domains buffered per insert during ingestion.
    #[must_use]
    pub fn ingest_batch_size(&self) -> NonZeroUsize {
        non_zero(self.ingest_batch_size)
    }

    /// Domains fetched per round trip while scanning.
    #[must_use]
    pub fn scan_batch_size(&self) -> NonZeroUsize {
        non_zero(self.scan_batch_size)
    }

    /// Domains removed per round trip when removing from a list.
    #[must_use]
    pub fn remove_batch_size(&self) -> NonZeroUsize {
        non_zero(self.remove_batch_size)
    }
}

fn non_zero(value: usize) -> NonZeroUsize {
    NonZeroUsize::new(value).unwrap_or(NonZeroUsize::MIN)
}

/// The kind of store holding the domain set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// A local SQLite database file.
    #[default]
    Sqlite,
    /// A PostgreSQL table.
    Postgres,
    /// A Redis set.
    Redis,
    /// An in-process set, discarded on exit.
    Memory,
}

impl Backend {
    /// Every backend, in display order.
    pub const ALL: [Self; 4] = [Self::Sqlite, Self::Postgres, Self::Redis, Self::Memory];

    /// The name used in configuration files and on the command line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::Redis => "redis",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "postgresql" | "pg" => Ok(Self::Postgres),
            _ => Self::ALL
                .into_iter()
                .find(|backend| backend.name() == lower)
                .ok_or_else(|| UnknownBackend(s.to_string())),
        }
    }
}

/// Error returned when a backend name is not recognised.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown backend '{0}' (expected one of: sqlite, postgres, redis, memory)")]
pub struct UnknownBackend(String);

/// Bounds for a backend's connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections opened up front.
    pub min_connections: usize,
    /// Hard cap on open connections.
    pub max_connections: usize,
    /// Seconds to wait for a connection before giving up.
    pub connection_timeout_secs: u64,
}

impl PoolConfig {
    /// How long a checkout may wait for a connection.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(if self.connection_timeout_secs == 0 {
            1
        } else {
            self.connection_timeout_secs
        })
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            connection_timeout_secs: 30,
        }
    }
}

/// Settings for the `sqlite` backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file, created if missing.
    pub path: PathBuf,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        let path = dirs::data_dir().map_or_else(
            || PathBuf::from("bountycatch.db"),
            |dir| dir.join("bountycatch").join("domains.db"),
        );
        Self { path }
    }
}

/// Settings for the `postgres` backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Role to connect as.
    pub user: String,
    /// Password for `user`; empty for none.
    pub password: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "bountycatch".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
        }
    }
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Settings for the `redis` backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379/0`.
    pub url: String,
    /// Key of the set holding the domains.
    pub key: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            key: "domains".to_string(),
        }
    }
}

/// Errors loading or validating the configuration.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The file could not be read.
    #[error("failed to read config file {}", .path.display())]
    Read {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this configuration.
    #[error("failed to parse config file {}", .path.display())]
    Parse {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

const fn default_ingest_batch_size() -> usize {
    100_000
}

const fn default_scan_batch_size() -> usize {
    500_000
}

const fn default_remove_batch_size() -> usize {
    10_000
}

/// The serialized versions of the configuration.
/// This allows the file format to change without breaking existing files.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default)]
        backend: Backend,

        #[serde(default = "default_ingest_batch_size")]
        ingest_batch_size: usize,

        #[serde(default = "default_scan_batch_size")]
        scan_batch_size: usize,

        #[serde(default = "default_remove_batch_size")]
        remove_batch_size: usize,

        #[serde(default)]
        pool: PoolConfig,

        #[serde(default)]
        sqlite: SqliteConfig,

        #[serde(default)]
        postgresql: PostgresConfig,

        #[serde(default)]
        redis: RedisConfig,
    },
}

impl TryFrom<toml::Table> for Config {
    type Error = toml::de::Error;

    fn try_from(mut table: toml::Table) -> Result<Self, Self::Error> {
        // Files without a `_version` use the first layout.
        table
            .entry("_version")
            .or_insert(toml::Value::String("1".to_string()));
        Ok(toml::Value::Table(table).try_into::<Versions>()?.into())
    }
}

impl From<Versions> for Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                backend,
                ingest_batch_size,
                scan_batch_size,
                remove_batch_size,
                pool,
                sqlite,
                postgresql,
                redis,
            } => Self {
                backend,
                ingest_batch_size,
                scan_batch_size,
                remove_batch_size,
                pool,
                sqlite,
                postgresql,
                redis,
            },
        }
    }
}

impl From<Config> for Versions {
    fn from(config: Config) -> Self {
        Self::V1 {
            backend: config.backend,
            ingest_batch_size: config.ingest_batch_size,
            scan_batch_size: config.scan_batch_size,
            remove_batch_size: config.remove_batch_size,
            pool: config.pool,
            sqlite: config.sqlite,
            postgresql: config.postgresql,
            redis: config.redis,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, io::Write};

    use super::*;

    #[test]
    fn load_reads_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"_version = \"1\"\nbackend = \"redis\"\ningest_batch_size = 50\n\n[pool]\nmax_connections = 4\n\n[redis]\nkey = \"acme\"\n",
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.backend, Backend::Redis);
        assert_eq!(config.ingest_batch_size().get(), 50);
        assert_eq!(config.scan_batch_size().get(), 500_000);
        assert_eq!(config.pool.min_connections, 1);
        assert_eq!(config.pool.max_connections, 4);
        assert_eq!(config.redis.key, "acme");
        assert_eq!(config.redis.url, RedisConfig::default().url);
    }

    #[test]
    fn load_missing_file_returns_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing.toml");

        let error = Config::load(&missing).unwrap_err();
        assert!(matches!(error, LoadError::Read { .. }));
    }

    #[test]
    fn load_invalid_toml_returns_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"_version = \"1\"\nbackend = \"mongo\"\n").unwrap();

        let error = Config::load(file.path()).unwrap_err();
        assert!(matches!(error, LoadError::Parse { .. }));
    }

    #[test]
    fn load_rejects_zero_batch_size() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"_version = \"1\"\nscan_batch_size = 0\n").unwrap();

        let error = Config::load(file.path()).unwrap_err();
        assert_eq!(
            error.to_string(),
            "invalid configuration: scan_batch_size must be at least 1"
        );
    }

    #[test]
    fn load_rejects_inverted_pool_bounds() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"_version = \"1\"\n[pool]\nmin_connections = 5\nmax_connections = 2\n")
            .unwrap();

        assert!(matches!(
            Config::load(file.path()).unwrap_err(),
            LoadError::Invalid(_)
        ));
    }

    #[test]
    fn load_accepts_the_documented_layout_without_a_version() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        let db = tmp.path().join("domains.db");
        std::fs::write(
            &path,
            format!(
                r#"backend = "sqlite"          # sqlite | postgres | redis | memory
ingest_batch_size = 100000
scan_batch_size = 500000
remove_batch_size = 10000

[pool]
min_connections = 1
max_connections = 10

[sqlite]
path = "{}"

[postgresql]
host = "localhost"
port = 5432
database = "bountycatch"
user = "postgres"
password = ""

[redis]
url = "redis://127.0.0.1:6379/0"
key = "domains"
"#,
                db.display()
            ),
        )
        .unwrap();

        let config = Config::load(&path).unwrap();

        assert_eq!(config.backend, Backend::Sqlite);
        assert_eq!(config.sqlite.path, db);
        assert_eq!(config.remove_batch_size().get(), 10_000);
        assert_eq!(config.pool, PoolConfig::default());
        assert_eq!(config.postgresql, PostgresConfig::default());
        assert_eq!(config.redis, RedisConfig::default());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"_version = \"2\"\nbackend = \"redis\"\n").unwrap();

        assert!(matches!(
            Config::load(file.path()).unwrap_err(),
            LoadError::Parse { .. }
        ));
    }

    #[test]
    fn serialized_config_carries_its_version() {
        let written = toml::to_string(&Config::default()).unwrap();
        assert!(written.starts_with("_version = \"1\""));
        assert_eq!(toml::from_str::<Config>(&written).unwrap(), Config::default());
    }

    #[test]
    fn versioned_empty_file_returns_default() {
        let expected = Config::default();
        let actual: Config = toml::from_str(r#"_version = "1""#).unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("BOUNTYCATCH_BACKEND", "postgresql"),
            ("PGHOST", "db.internal"),
            ("PGPORT", "6543"),
            ("PGPASSWORD", "hunter2"),
            ("BOUNTYCATCH_REDIS_KEY", "scope"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|name| env.get(name).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.backend, Backend::Postgres);
        assert_eq!(config.postgresql.host, "db.internal");
        assert_eq!(config.postgresql.port, 6543);
        assert_eq!(config.postgresql.password, "hunter2");
        assert_eq!(config.postgresql.database, "bountycatch");
        assert_eq!(config.redis.key, "scope");
    }

    #[test]
    fn environment_rejects_bad_port() {
        let mut config = Config::default();
        let error = config
            .apply_env(|name| (name == "PGPORT").then(|| "not-a-port".to_string()))
            .unwrap_err();
        assert!(matches!(error, LoadError::Invalid(_)));
    }

    #[test]
    fn password_is_not_debug_printed() {
        let config = PostgresConfig {
            password: "hunter2".to_string(),
            ..PostgresConfig::default()
        };
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn backend_names_round_trip() {
        for backend in Backend::ALL {
            assert_eq!(backend.name().parse::<Backend>(), Ok(backend));
        }
        assert_eq!("PG".parse::<Backend>(), Ok(Backend::Postgres));
        assert!("mongo".parse::<Backend>().is_err());
    }
}
