//! Writing domain sets out as text or JSON, and reading JSON back in.

use std::io::{self, BufRead, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::StoreError;

/// The JSON export document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDocument {
    /// Number of entries in `domains`.
    pub domain_count: usize,
    /// When the export was taken.
    pub exported_at: DateTime<Utc>,
    /// The exported domains.
    pub domains: Vec<String>,
}

impl ExportDocument {
    /// A document holding `domains`, stamped with the current time.
    #[must_use]
    pub fn new(domains: Vec<String>) -> Self {
        Self {
            domain_count: domains.len(),
            exported_at: Utc::now(),
            domains,
        }
    }
}

/// Errors raised while exporting or importing.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Reading from the store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The output could not be written.
    #[error("failed to write output")]
    Io(#[from] io::Error),

    /// The JSON document could not be encoded or decoded.
    #[error("malformed export document")]
    Json(#[from] serde_json::Error),
}

impl ExportError {
    /// Returns `true` if the reader of the output went away, which ends
    /// a pipeline like `bountycatch print | head` without being a failure.
    #[must_use]
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, Self::Io(error) if error.kind() == io::ErrorKind::BrokenPipe)
    }
}

/// Writes one domain per line, returning how many were written.
///
/// Domains are written as they arrive; nothing is buffered beyond the
/// writer's own buffer.
///
/// # Errors
///
/// Stops at the first store error or write failure.
pub fn write_text<W, I>(mut out: W, domains: I) -> Result<u64, ExportError>
where
    W: Write,
    I: IntoIterator<Item = Result<String, StoreError>>,
{
    let mut written = 0;
    for domain in domains {
        writeln!(out, "{}", domain?)?;
        written += 1;
    }
    out.flush()?;
    Ok(written)
}

/// Writes an [`ExportDocument`] as pretty-printed JSON, returning how many
/// domains it holds.
///
/// The document records its length up front, so the domains are collected
/// before anything is written.
///
/// # Errors
///
/// Stops at the first store error or write failure.
pub fn write_json<W, I>(mut out: W, domains: I) -> Result<u64, ExportError>
where
    W: Write,
    I: IntoIterator<Item = Result<String, StoreError>>,
{
    let document = ExportDocument::new(domains.into_iter().collect::<Result<_, _>>()?);
    serde_json::to_writer_pretty(&mut out, &document)?;
    writeln!(out)?;
    out.flush()?;
    Ok(document.domains.len() as u64)
}

/// Reads an [`ExportDocument`] written by [`write_json`].
///
/// # Errors
///
/// Returns an error if the input cannot be read or is not a valid
/// document.
pub fn read_json<R: BufRead>(input: R) -> Result<ExportDocument, ExportError> {
    let document: ExportDocument = serde_json::from_reader(input)?;
    if document.domain_count != document.domains.len() {
        tracing::warn!(
            "Export document claims {} domains but lists {}",
            document.domain_count,
            document.domains.len()
        );
    }
    Ok(document)
}
