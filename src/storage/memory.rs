//! An in-process store, used by tests and for throwaway runs.

use std::{
    collections::{BTreeSet, HashSet},
    num::NonZeroUsize,
    ops::Bound,
    sync::{Mutex, MutexGuard, PoisonError},
};

use super::{DomainStore, Scan, StoreError};
use crate::domain::Backend;

/// A domain set held in memory, discarded when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    domains: Mutex<BTreeSet<String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.domains.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: Into<String>> FromIterator<S> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            domains: Mutex::new(iter.into_iter().map(Into::into).collect()),
        }
    }
}

impl DomainStore for MemoryStore {
    fn backend(&self) -> Backend {
        Backend::Memory
    }

    fn add_one(&self, domain: &str) -> Result<bool, StoreError> {
        Ok(self.lock().insert(domain.to_string()))
    }

    fn add_many(&self, domains: &[String]) -> Result<u64, StoreError> {
        let mut set = self.lock();
        Ok(domains
            .iter()
            .filter(|domain| set.insert((*domain).clone()))
            .count() as u64)
    }

    fn remove_one(&self, domain: &str) -> Result<bool, StoreError> {
        Ok(self.lock().remove(domain))
    }

    fn remove_many(&self, domains: &[String]) -> Result<u64, StoreError> {
        let mut set = self.lock();
        Ok(domains
            .iter()
            .filter(|domain| set.remove(domain.as_str()))
            .count() as u64)
    }

    fn exists_any(&self) -> Result<bool, StoreError> {
        Ok(!self.lock().is_empty())
    }

    fn count(&self) -> Result<u64, StoreError> {
        Ok(self.lock().len() as u64)
    }

    fn clear_all(&self) -> Result<bool, StoreError> {
        let mut set = self.lock();
        let had_data = !set.is_empty();
        set.clear();
        Ok(had_data)
    }

    fn all(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self.lock().iter().cloned().collect())
    }

    fn scan(&self, batch_size: NonZeroUsize) -> Result<Scan<'_>, StoreError> {
        // The lock is taken per page, never across the whole scan.
        Ok(Scan::keyset(batch_size, move |after, limit| {
            let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
            Ok(self
                .lock()
                .range::<str, _>((lower, Bound::Unbounded))
                .take(limit)
                .cloned()
                .collect())
        }))
    }
}
