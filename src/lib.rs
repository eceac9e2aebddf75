//! A deduplicated store of bug-bounty target domains.
//!
//! Domains are validated on the way in, kept as a set in one of several
//! backends (SQLite, PostgreSQL, Redis or memory), and streamed back out
//! filtered, sorted or exported.

pub mod domain;
pub use domain::{Backend, Config, Filter};

/// Batched ingestion, filtered streaming and removal.
pub mod pipeline;
pub use pipeline::{IngestSummary, Pipeline, RemovalSummary};

/// Backends holding the domain set.
pub mod storage;
pub use storage::{DomainStore, StoreError};

pub mod export;
