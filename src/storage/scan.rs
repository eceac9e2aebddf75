use std::{fmt, num::NonZeroUsize, vec};

use super::StoreError;

type NextPage<'a> = Box<dyn FnMut() -> Result<Option<Vec<String>>, StoreError> + 'a>;

/// A lazy, page-at-a-time iterator over a store's domains.
///
/// At most one page is held in memory. After an error the scan is
/// finished.
pub struct Scan<'a> {
    page: vec::IntoIter<String>,
    next_page: NextPage<'a>,
    finished: bool,
}

impl<'a> Scan<'a> {
    /// Builds a scan from a page source.
    ///
    /// `next_page` returns `Ok(None)` once the set is exhausted. Empty pages
    /// are skipped.
    pub fn from_pages(
        next_page: impl FnMut() -> Result<Option<Vec<String>>, StoreError> + 'a,
    ) -> Self {
        Self {
            page: Vec::new().into_iter(),
            next_page: Box::new(next_page),
            finished: false,
        }
    }

    /// Builds a scan over an ordered key space.
    ///
    /// `fetch(after, limit)` returns up to `limit` keys in ascending order,
    /// all greater than `after` (or the smallest keys when `after` is
    /// `None`). A page shorter than `limit` ends the scan.
    pub fn keyset(
        batch_size: NonZeroUsize,
        mut fetch: impl FnMut(Option<&str>, usize) -> Result<Vec<String>, StoreError> + 'a,
    ) -> Self {
        let limit = batch_size.get();
        let mut after: Option<String> = None;
        let mut exhausted = false;

        Self::from_pages(move || {
            if exhausted {
                return Ok(None);
            }
            let page = fetch(after.as_deref(), limit)?;
            exhausted = page.len() < limit;
            match page.last() {
                Some(last) => after = Some(last.clone()),
                None => return Ok(None),
            }
            Ok(Some(page))
        })
    }

    /// A scan that yields nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_pages(|| Ok(None))
    }
}

impl Iterator for Scan<'_> {
    type Item = Result<String, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(domain) = self.page.next() {
                return Some(Ok(domain));
            }
            if self.finished {
                return None;
            }
            match (self.next_page)() {
                Ok(Some(page)) => self.page = page.into_iter(),
                Ok(None) => self.finished = true,
                Err(error) => {
                    self.finished = true;
                    return Some(Err(error));
                }
            }
        }
    }
}

impl fmt::Debug for Scan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scan")
            .field("buffered", &self.page.len())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, collections::BTreeSet, ops::Bound};

    use super::*;
    use crate::domain::Backend;

    fn keys(n: usize) -> BTreeSet<String> {
        (0..n).map(|i| format!("k{i:03}")).collect()
    }

    #[test]
    fn keyset_walks_the_whole_key_space() {
        let set = keys(10);
        let fetches = Cell::new(0);

        let scan = Scan::keyset(NonZeroUsize::new(4).unwrap(), |after, limit| {
            fetches.set(fetches.get() + 1);
            let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
            Ok(set
                .range::<str, _>((lower, Bound::Unbounded))
                .take(limit)
                .cloned()
                .collect())
        });

        let scanned: Vec<String> = scan.collect::<Result<_, _>>().unwrap();
        assert_eq!(scanned, set.iter().cloned().collect::<Vec<_>>());
        // 4 + 4 + 2; the short page ends the scan.
        assert_eq!(fetches.get(), 3);
    }

    #[test]
    fn keyset_stops_on_an_empty_page() {
        let set = keys(8);
        let fetches = Cell::new(0);

        let scan = Scan::keyset(NonZeroUsize::new(4).unwrap(), |after, limit| {
            fetches.set(fetches.get() + 1);
            let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
            Ok(set
                .range::<str, _>((lower, Bound::Unbounded))
                .take(limit)
                .cloned()
                .collect())
        });

        assert_eq!(scan.count(), 8);
        assert_eq!(fetches.get(), 3);
    }

    #[test]
    fn empty_pages_are_skipped() {
        let mut pages = vec![None, Some(vec!["b".to_string()]), Some(vec![]), Some(vec!["a".to_string()])];
        let scan = Scan::from_pages(move || Ok(pages.pop().flatten()));
        // Pops from the back: ["a"], [], ["b"], None.
        let scanned: Vec<String> = scan.collect::<Result<_, _>>().unwrap();
        assert_eq!(scanned, ["a", "b"]);
    }

    #[test]
    fn an_error_finishes_the_scan() {
        let mut calls = 0;
        let scan = Scan::from_pages(move || {
            calls += 1;
            match calls {
                1 => Ok(Some(vec!["a.com".to_string()])),
                2 => Err(StoreError::operation(Backend::Memory, "lost connection")),
                _ => Ok(Some(vec!["never.com".to_string()])),
            }
        });

        let results: Vec<_> = scan.collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_deref().unwrap(), "a.com");
        assert!(results[1].is_err());
    }

    #[test]
    fn empty_scan_yields_nothing() {
        assert_eq!(Scan::empty().count(), 0);
    }
}
