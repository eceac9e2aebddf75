//! Domain names and the settings that govern how they are stored.
//!
//! This module holds the validation rules for domain names, the filters
//! used to select domains for output or removal, and configuration.

mod config;
pub use config::{
    Backend, Config, LoadError, PoolConfig, PostgresConfig, RedisConfig, SqliteConfig,
    UnknownBackend,
};

/// Domain filters for printing, counting, exporting and removal.
pub mod filter;
pub use filter::{Filter, FilterError};

/// Syntactic validation of domain names.
pub mod validate;
pub use validate::{Domain, InvalidDomain, MAX_DOMAIN_LEN, Reason, check, is_valid};
