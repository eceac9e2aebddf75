//! Batched, streaming operations over a [`DomainStore`].
//!
//! The pipeline sits between line-oriented input and output and the store:
//! it validates and batches incoming domains, filters outgoing ones, and
//! turns filtered selections into batched removals. Memory use is bounded
//! by the batch size, except where sorting or filter-based removal has to
//! hold a full selection.

use std::{error::Error, num::NonZeroUsize};

use crate::{
    domain::{Filter, validate},
    storage::{DomainStore, StoreError},
};

/// A lazy sequence of domains read from a store.
pub type Stream<'a> = Box<dyn Iterator<Item = Result<String, StoreError>> + 'a>;

/// The operations the command line exposes, bound to one store.
#[derive(Clone, Copy)]
pub struct Pipeline<'a> {
    store: &'a dyn DomainStore,
}

impl<'a> Pipeline<'a> {
    /// Binds a pipeline to `store`.
    #[must_use]
    pub const fn new(store: &'a dyn DomainStore) -> Self {
        Self { store }
    }

    /// Yields the domains selected by `filter`.
    ///
    /// Unsorted output streams straight from a scan and never holds more
    /// than one batch. Sorted output loads the whole set, filters it, and
    /// yields it in ascending byte order.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read cannot start. Unsorted streams
    /// can also yield errors part way through.
    pub fn stream(
        &self,
        filter: Option<Filter>,
        sort: bool,
        batch_size: NonZeroUsize,
    ) -> Result<Stream<'a>, StoreError> {
        if sort {
            let mut domains: Vec<String> = self
                .store
                .all()?
                .into_iter()
                .filter(|domain| selects(filter.as_ref(), domain))
                .collect();
            domains.sort_unstable();
            return Ok(Box::new(domains.into_iter().map(Ok)));
        }

        let scan = self.store.scan(batch_size)?;
        Ok(Box::new(scan.filter(move |item| match item {
            Ok(domain) => selects(filter.as_ref(), domain),
            Err(_) => true,
        })))
    }

    /// Counts the domains selected by `filter`.
    ///
    /// Without a filter this asks the store directly.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be read.
    pub fn count(&self, filter: Option<Filter>, batch_size: NonZeroUsize) -> Result<u64, StoreError> {
        if filter.is_none() {
            return self.store.count();
        }
        self.stream(filter, false, batch_size)?
            .try_fold(0, |count, item| item.map(|_| count + 1))
    }

    /// Starts a batched ingestion; see [`Ingest`].
    #[must_use]
    pub fn ingest(&self, validate: bool, batch_size: NonZeroUsize) -> Ingest<'a> {
        Ingest {
            store: self.store,
            validate,
            batch_size: batch_size.get(),
            buffer: Vec::with_capacity(batch_size.get().min(PREALLOCATE_LIMIT)),
            summary: IngestSummary::default(),
        }
    }

    /// Ingests every line of `lines`.
    ///
    /// Convenience for [`Pipeline::ingest`] when the input cannot fail.
    pub fn ingest_lines<I>(&self, lines: I, validate: bool, batch_size: NonZeroUsize) -> IngestSummary
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut ingest = self.ingest(validate, batch_size);
        for line in lines {
            ingest.push(line.as_ref());
        }
        ingest.finish()
    }

    /// Removes every domain selected by `filter`, returning how many went.
    ///
    /// The selection is collected in full before anything is removed, so
    /// removal never disturbs the scan that found it. Writes landing between
    /// the two phases are not seen.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the selection cannot be read or the
    /// removal fails.
    pub fn remove_by_filter(&self, filter: Filter, batch_size: NonZeroUsize) -> Result<u64, StoreError> {
        let selected = self
            .stream(Some(filter), false, batch_size)?
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!("Selected {} domains for removal", selected.len());
        if selected.is_empty() {
            return Ok(0);
        }
        self.store.remove_many(&selected)
    }

    /// Removes the domains listed in `lines`, one batch at a time.
    ///
    /// Lines are trimmed and blank lines skipped. The first failed batch
    /// aborts the removal; earlier batches stay removed.
    ///
    /// # Errors
    ///
    /// Returns the [`StoreError`] of the first failed batch.
    pub fn remove_lines<I>(&self, lines: I, batch_size: NonZeroUsize) -> Result<RemovalSummary, StoreError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut summary = RemovalSummary::default();
        let mut batch = Vec::new();
        for line in lines {
            let domain = line.as_ref().trim();
            if domain.is_empty() {
                continue;
            }
            summary.total += 1;
            batch.push(domain.to_string());
            if batch.len() >= batch_size.get() {
                summary.removed += self.store.remove_many(&batch)?;
                batch.clear();
            }
        }
        summary.removed += self.store.remove_many(&batch)?;
        Ok(summary)
    }

    /// Removes a single domain, returning `true` if it was present.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be written.
    pub fn remove_one(&self, domain: &str) -> Result<bool, StoreError> {
        self.store.remove_one(domain)
    }

    /// Empties the store, returning `true` if it held anything.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be cleared.
    pub fn clear(&self) -> Result<bool, StoreError> {
        self.store.clear_all()
    }
}

impl std::fmt::Debug for Pipeline<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("backend", &self.store.backend())
            .finish()
    }
}

// Batch sizes are often large; grow the buffer past this on demand.
const PREALLOCATE_LIMIT: usize = 10_000;

fn selects(filter: Option<&Filter>, domain: &str) -> bool {
    filter.is_none_or(|filter| filter.matches(domain))
}

/// An ingestion in progress.
///
/// Lines are pushed one at a time; accepted domains are buffered and
/// written with one `add_many` call per full batch. A batch the store
/// rejects is logged and counted as failed, and ingestion carries on.
/// [`Ingest::finish`] writes the final partial batch.
pub struct Ingest<'a> {
    store: &'a dyn DomainStore,
    validate: bool,
    batch_size: usize,
    buffer: Vec<String>,
    summary: IngestSummary,
}

impl Ingest<'_> {
    /// Adds one input line.
    pub fn push(&mut self, line: &str) {
        let candidate = line.trim();
        if candidate.is_empty() {
            return;
        }
        self.summary.total += 1;

        if self.validate {
            if let Err(reason) = validate::check(candidate) {
                tracing::debug!("Skipping invalid domain '{candidate}': {reason}");
                self.summary.invalid += 1;
                return;
            }
        }

        self.buffer.push(candidate.to_string());
        if self.buffer.len() >= self.batch_size {
            self.flush();
        }
    }

    /// The counts so far. Domains still buffered are in `total` only.
    #[must_use]
    pub const fn progress(&self) -> &IngestSummary {
        &self.summary
    }

    /// Writes any buffered domains and returns the final counts.
    #[must_use]
    pub fn finish(mut self) -> IngestSummary {
        self.flush();
        self.summary
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let size = self.buffer.len() as u64;
        match self.store.add_many(&self.buffer) {
            Ok(inserted) => {
                tracing::info!("Wrote batch of {size} domains ({inserted} new)");
                self.summary.inserted += inserted;
            }
            Err(error) => {
                tracing::error!(
                    error = &error as &dyn Error,
                    "Failed to write batch of {size} domains"
                );
                self.summary.failed += size;
            }
        }
        self.buffer.clear();
    }
}

impl std::fmt::Debug for Ingest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingest")
            .field("validate", &self.validate)
            .field("batch_size", &self.batch_size)
            .field("buffered", &self.buffer.len())
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

/// Counts reported at the end of an ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Non-blank lines processed.
    pub total: u64,
    /// Domains that were new to the store.
    pub inserted: u64,
    /// Lines rejected by validation.
    pub invalid: u64,
    /// Domains in batches the store failed to write.
    pub failed: u64,
}

impl IngestSummary {
    /// Domains that were already present or repeated in the input.
    #[must_use]
    pub const fn duplicates(&self) -> u64 {
        self.total
            .saturating_sub(self.invalid)
            .saturating_sub(self.failed)
            .saturating_sub(self.inserted)
    }

    /// Duplicates as a share of the domains that reached the store.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duplicate_percentage(&self) -> f64 {
        let written = self
            .total
            .saturating_sub(self.invalid)
            .saturating_sub(self.failed);
        if written == 0 {
            return 0.0;
        }
        self.duplicates() as f64 / written as f64 * 100.0
    }
}

/// Counts reported by [`Pipeline::remove_lines`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalSummary {
    /// Non-blank lines read.
    pub total: u64,
    /// Domains that were present and removed.
    pub removed: u64,
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use test_case::test_case;

    use super::*;
    use crate::{
        domain::Backend,
        storage::{MemoryStore, Scan},
    };

    const fn batch(size: usize) -> NonZeroUsize {
        match NonZeroUsize::new(size) {
            Some(size) => size,
            None => panic!("zero batch size"),
        }
    }

    fn collect(stream: Stream<'_>) -> Vec<String> {
        stream.collect::<Result<_, _>>().unwrap()
    }

    /// Wraps a [`MemoryStore`] and refuses any batch containing a domain
    /// that starts with `fail`.
    #[derive(Default)]
    struct Flaky {
        inner: MemoryStore,
        batches: std::cell::Cell<usize>,
    }

    impl DomainStore for Flaky {
        fn backend(&self) -> Backend {
            Backend::Memory
        }

        fn add_one(&self, domain: &str) -> Result<bool, StoreError> {
            self.inner.add_one(domain)
        }

        fn add_many(&self, domains: &[String]) -> Result<u64, StoreError> {
            self.batches.set(self.batches.get() + 1);
            if domains.iter().any(|domain| domain.starts_with("fail")) {
                return Err(StoreError::operation(Backend::Memory, "constraint violated"));
            }
            self.inner.add_many(domains)
        }

        fn remove_one(&self, domain: &str) -> Result<bool, StoreError> {
            self.inner.remove_one(domain)
        }

        fn remove_many(&self, domains: &[String]) -> Result<u64, StoreError> {
            if domains.iter().any(|domain| domain.starts_with("fail")) {
                return Err(StoreError::operation(Backend::Memory, "constraint violated"));
            }
            self.inner.remove_many(domains)
        }

        fn exists_any(&self) -> Result<bool, StoreError> {
            self.inner.exists_any()
        }

        fn count(&self) -> Result<u64, StoreError> {
            self.inner.count()
        }

        fn clear_all(&self) -> Result<bool, StoreError> {
            self.inner.clear_all()
        }

        fn all(&self) -> Result<HashSet<String>, StoreError> {
            self.inner.all()
        }

        fn scan(&self, batch_size: NonZeroUsize) -> Result<Scan<'_>, StoreError> {
            self.inner.scan(batch_size)
        }
    }

    #[test]
    fn ingest_skips_blank_and_invalid_lines() {
        let store = MemoryStore::new();
        let pipeline = Pipeline::new(&store);
        let lines = [
            "a.example.com",
            "",
            "   ",
            "*.example.com",
            "not a domain",
            "  b.example.com  ",
            "*abc.com",
            "svc-*.example.com",
        ];

        let summary = pipeline.ingest_lines(lines, true, batch(2));

        assert_eq!(
            summary,
            IngestSummary {
                total: 6,
                inserted: 4,
                invalid: 2,
                failed: 0,
            }
        );
        // N lines, K blank, M invalid, no duplicates.
        assert_eq!(store.count().unwrap(), 8 - 2 - 2);
        assert!(store.all().unwrap().contains("b.example.com"));
    }

    #[test]
    fn ingest_without_validation_keeps_everything() {
        let store = MemoryStore::new();
        let summary = Pipeline::new(&store).ingest_lines(["not a domain", "*abc.com"], false, batch(10));
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.invalid, 0);
    }

    #[test]
    fn ingesting_twice_counts_duplicates() {
        let store = MemoryStore::new();
        let pipeline = Pipeline::new(&store);

        let first = pipeline.ingest_lines(["x.com", "x.com"], true, batch(10));
        let second = pipeline.ingest_lines(["x.com"], true, batch(10));

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!((first.inserted, first.duplicates()), (1, 1));
        assert_eq!((second.inserted, second.duplicates()), (0, 1));
    }

    #[test_case(1, 5; "one per batch")]
    #[test_case(2, 3; "partial final batch")]
    #[test_case(5, 1; "exact fit")]
    #[test_case(100, 1; "single flush")]
    fn ingest_flushes_full_batches_and_the_remainder(size: usize, expected_batches: usize) {
        let store = Flaky::default();
        let lines = ["a.com", "b.com", "c.com", "d.com", "e.com"];

        let summary = Pipeline::new(&store).ingest_lines(lines, true, batch(size));

        assert_eq!(store.batches.get(), expected_batches);
        assert_eq!(summary.inserted, 5);
    }

    #[test]
    fn a_failed_batch_is_counted_and_ingestion_continues() {
        let store = Flaky::default();
        let lines = ["a.com", "fail.com", "b.com", "c.com", "bad domain"];

        let summary = Pipeline::new(&store).ingest_lines(lines, true, batch(2));

        assert_eq!(
            summary,
            IngestSummary {
                total: 5,
                inserted: 2,
                invalid: 1,
                failed: 2,
            }
        );
        assert_eq!(summary.duplicates(), 0);
        let stored = store.all().unwrap();
        assert!(stored.contains("b.com") && stored.contains("c.com"));
        assert!(!stored.contains("a.com"));
    }

    #[test]
    fn progress_reports_buffered_lines() {
        let store = MemoryStore::new();
        let pipeline = Pipeline::new(&store);
        let mut ingest = pipeline.ingest(true, batch(10));

        ingest.push("a.com");
        ingest.push("b.com");
        assert_eq!(ingest.progress().total, 2);
        assert_eq!(ingest.progress().inserted, 0);

        assert_eq!(ingest.finish().inserted, 2);
    }

    #[test]
    fn duplicates_never_underflow() {
        let summary = IngestSummary {
            total: 1,
            inserted: 3,
            invalid: 0,
            failed: 0,
        };
        assert_eq!(summary.duplicates(), 0);
    }

    #[test]
    fn sorted_stream_is_ordered_and_matches_the_scan() {
        let store: MemoryStore = ["b.com", "a.com", "_x.a.com", "c.org", "*.b.com"]
            .into_iter()
            .collect();
        let pipeline = Pipeline::new(&store);

        let sorted = collect(pipeline.stream(None, true, batch(2)).unwrap());
        let unsorted = collect(pipeline.stream(None, false, batch(2)).unwrap());

        assert!(sorted.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(
            sorted.iter().collect::<HashSet<_>>(),
            unsorted.iter().collect::<HashSet<_>>()
        );
        assert_eq!(sorted.len(), 5);
    }

    #[test_case(Filter::contains(".com"), &["a.com", "b.com"]; "substring")]
    #[test_case(Filter::regex(r"^a\.").unwrap(), &["a.com", "a.org"]; "regex search")]
    #[test_case(Filter::regex("org$").unwrap(), &["a.org"]; "anchored regex")]
    fn stream_applies_the_filter(filter: Filter, expected: &[&str]) {
        let store: MemoryStore = ["a.com", "b.com", "a.org"].into_iter().collect();
        let pipeline = Pipeline::new(&store);

        let selected = collect(pipeline.stream(Some(filter.clone()), true, batch(1)).unwrap());
        assert_eq!(selected, expected);

        let count = pipeline.count(Some(filter), batch(1)).unwrap();
        assert_eq!(count, expected.len() as u64);
    }

    #[test]
    fn unfiltered_count_asks_the_store() {
        let store: MemoryStore = ["a.com", "b.com"].into_iter().collect();
        assert_eq!(Pipeline::new(&store).count(None, batch(1)).unwrap(), 2);
    }

    #[test]
    fn filtered_removal_leaves_nothing_to_match() {
        let store: MemoryStore = ["a.test.com", "b.test.com", "keep.org", "test.net"]
            .into_iter()
            .collect();
        let pipeline = Pipeline::new(&store);
        let filter = Filter::regex(r"\.test\.").unwrap();

        let removed = pipeline.remove_by_filter(filter.clone(), batch(1)).unwrap();

        assert_eq!(removed, 2);
        assert!(collect(pipeline.stream(Some(filter), false, batch(1)).unwrap()).is_empty());
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn removal_with_no_matches_removes_nothing() {
        let store: MemoryStore = ["a.com"].into_iter().collect();
        let removed = Pipeline::new(&store)
            .remove_by_filter(Filter::contains("zzz"), batch(10))
            .unwrap();
        assert_eq!(removed, 0);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn remove_lines_trims_and_batches() {
        let store: MemoryStore = ["a.com", "b.com", "c.com"].into_iter().collect();
        let summary = Pipeline::new(&store)
            .remove_lines([" a.com ", "", "c.com", "missing.com"], batch(2))
            .unwrap();

        assert_eq!(summary, RemovalSummary { total: 3, removed: 2 });
        assert_eq!(store.all().unwrap(), HashSet::from(["b.com".to_string()]));
    }

    #[test]
    fn remove_lines_stops_at_the_first_failed_batch() {
        let store = Flaky::default();
        store.inner.add_many(&["a.com".into(), "b.com".into()]).unwrap();

        let result = Pipeline::new(&store).remove_lines(["a.com", "fail.com", "b.com"], batch(1));

        assert!(result.is_err());
        assert_eq!(store.all().unwrap(), HashSet::from(["b.com".to_string()]));
    }

    #[test]
    fn remove_one_and_clear() {
        let store: MemoryStore = ["a.com", "b.com"].into_iter().collect();
        let pipeline = Pipeline::new(&store);

        assert!(pipeline.remove_one("a.com").unwrap());
        assert!(!pipeline.remove_one("a.com").unwrap());

        assert!(pipeline.clear().unwrap());
        assert_eq!(store.count().unwrap(), 0);
        assert!(!pipeline.clear().unwrap());
    }

    #[test_case(IngestSummary::default(), 0.0; "nothing read")]
    #[test_case(IngestSummary { total: 4, inserted: 1, invalid: 0, failed: 0 }, 75.0; "mostly duplicates")]
    #[test_case(IngestSummary { total: 10, inserted: 4, invalid: 2, failed: 4 }, 0.0; "invalid and failed excluded")]
    #[test_case(IngestSummary { total: 3, inserted: 0, invalid: 3, failed: 0 }, 0.0; "all invalid")]
    fn duplicate_percentage(summary: IngestSummary, expected: f64) {
        assert!((summary.duplicate_percentage() - expected).abs() < f64::EPSILON);
    }
}
