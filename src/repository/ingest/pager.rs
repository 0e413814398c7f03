//! Paged revision iteration.
//!
//! Fetches revisions from the provider in bounded pages rather than one at
//! a time, trading round-trips for memory. The sequence is ordered by
//! revno and restartable only from the range start.

use std::collections::VecDeque;

use tracing::debug;

use crate::provider::{LogProvider, ProviderResult, RawRevision};

/// Lazy, ordered window over the revisions in `[start, end]`.
///
/// `end = 0` resolves to the head revision once, at construction: revisions
/// created while iterating are not observed in this pass.
pub struct RevisionPager<'a, P: LogProvider> {
    provider: &'a P,
    cursor: i64,
    end: i64,
    window: usize,
    page: VecDeque<RawRevision>,
    done: bool,
}

impl<'a, P: LogProvider> RevisionPager<'a, P> {
    pub fn new(provider: &'a P, start: i64, end: i64, window: usize) -> ProviderResult<Self> {
        let end = if end == 0 { provider.head_revision()? } else { end };
        Ok(Self {
            provider,
            cursor: start.max(1),
            end,
            window: window.max(1),
            page: VecDeque::new(),
            done: false,
        })
    }

    /// Resolved end of the range (the head snapshot for open-ended runs).
    pub fn end_revno(&self) -> i64 {
        self.end
    }

    /// Next revision in order, refilling the page window as needed.
    ///
    /// A failed page fetch surfaces the provider error before anything from
    /// that page is yielded; previously yielded revisions are unaffected.
    pub fn next_revision(&mut self) -> ProviderResult<Option<RawRevision>> {
        // Revision numbering may have holes for this search path, so an
        // empty window is skipped, not treated as the end.
        while self.page.is_empty() && !self.done {
            self.fetch_page()?;
        }
        Ok(self.page.pop_front())
    }

    fn fetch_page(&mut self) -> ProviderResult<()> {
        if self.cursor > self.end {
            self.done = true;
            return Ok(());
        }
        let page_end = (self.cursor + self.window as i64 - 1).min(self.end);
        debug!(start = self.cursor, end = page_end, "fetching revision page");
        let revisions = self.provider.log_range(self.cursor, page_end, true)?;
        match revisions.last() {
            Some(last) => self.cursor = last.revno + 1,
            None => self.cursor = page_end + 1,
        }
        self.page.extend(revisions);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryProvider;

    fn history(revs: i64) -> MemoryProvider {
        let mut b = MemoryProvider::builder();
        for revno in 1..=revs {
            b.begin(revno, revno * 100, "alice", "change")
                .add_file(&format!("/f{}.txt", revno), "x\n")
                .commit();
        }
        b.build()
    }

    #[test]
    fn test_yields_all_revisions_in_order() {
        let provider = history(10);
        let mut pager = RevisionPager::new(&provider, 1, 0, 4).unwrap();
        let mut seen = Vec::new();
        while let Some(rev) = pager.next_revision().unwrap() {
            seen.push(rev.revno);
        }
        assert_eq!(seen, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_fetches_in_window_sized_pages() {
        let provider = history(10);
        let mut pager = RevisionPager::new(&provider, 1, 0, 4).unwrap();
        while pager.next_revision().unwrap().is_some() {}
        // 10 revisions in windows of 4: pages [1..4], [5..8], [9..10].
        assert_eq!(provider.log_calls(), 3);
    }

    #[test]
    fn test_explicit_end_bounds_the_range() {
        let provider = history(10);
        let mut pager = RevisionPager::new(&provider, 3, 7, 50).unwrap();
        let mut seen = Vec::new();
        while let Some(rev) = pager.next_revision().unwrap() {
            seen.push(rev.revno);
        }
        assert_eq!(seen, vec![3, 4, 5, 6, 7]);
        assert_eq!(pager.end_revno(), 7);
    }

    #[test]
    fn test_hole_spanning_a_whole_window_is_skipped() {
        let mut b = MemoryProvider::builder();
        b.begin(1, 100, "alice", "first").add_file("/a.txt", "x\n").commit();
        b.begin(9, 900, "alice", "much later").add_file("/b.txt", "y\n").commit();
        let provider = b.build();

        let mut pager = RevisionPager::new(&provider, 1, 0, 3).unwrap();
        let mut seen = Vec::new();
        while let Some(rev) = pager.next_revision().unwrap() {
            seen.push(rev.revno);
        }
        assert_eq!(seen, vec![1, 9]);
    }

    #[test]
    fn test_empty_range() {
        let provider = history(5);
        let mut pager = RevisionPager::new(&provider, 6, 0, 10).unwrap();
        assert!(pager.next_revision().unwrap().is_none());
    }

    #[test]
    fn test_head_resolved_once() {
        let provider = history(5);
        let pager = RevisionPager::new(&provider, 1, 0, 10).unwrap();
        assert_eq!(pager.end_revno(), 5);
    }
}
