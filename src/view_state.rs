//! Pagination, sort and filter state for one table.
//!
//! The store is the single source of truth driving fetches: every mutator
//! reports whether the state actually changed, and a change means the
//! controller issues a new query.

use crate::model::{FilterModel, SortOrder, SortSpec, ViewQuery};
use std::num::NonZeroU64;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct ViewStateStore {
    page: u64,
    page_size: NonZeroU64,
    sort: SortSpec,
    filter: FilterModel,
}

impl ViewStateStore {
    pub fn new(page_size: NonZeroU64, sort: SortSpec) -> Self {
        Self {
            page: 0,
            page_size,
            sort,
            filter: FilterModel::default(),
        }
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn page_size(&self) -> NonZeroU64 {
        self.page_size
    }

    pub fn sort(&self) -> &SortSpec {
        &self.sort
    }

    pub fn filter(&self) -> &FilterModel {
        &self.filter
    }

    pub fn set_page(&mut self, page: u64) -> bool {
        if self.page == page {
            return false;
        }
        self.page = page;
        true
    }

    /// Keeps the current page index.
    pub fn set_page_size(&mut self, page_size: NonZeroU64) -> bool {
        if self.page_size == page_size {
            return false;
        }
        self.page_size = page_size;
        true
    }

    /// Keeps the current page index.
    pub fn set_sort(&mut self, field: impl Into<String>, order: SortOrder) -> bool {
        let next = SortSpec {
            field: field.into(),
            order,
        };
        if self.sort == next {
            return false;
        }
        self.sort = next;
        true
    }

    /// Replaces the filter and rewinds to the first page in one update, so
    /// a page index from the old filter is never fetched under the new one.
    pub fn set_filter(&mut self, filter: FilterModel) -> bool {
        if self.filter == filter {
            return false;
        }
        self.filter = filter;
        self.page = 0;
        true
    }

    pub fn query(&self) -> ViewQuery {
        let limit = self.page_size.get();
        ViewQuery {
            skip: self.page.saturating_mul(limit),
            limit,
            sort_field: self.sort.field.clone(),
            sort_order: self.sort.order,
            filter: self.filter.clone(),
        }
    }
}

/// Debounces free-text quick-filter input before it reaches the store.
#[derive(Debug, Clone)]
pub struct QuickFilter {
    debounce: Duration,
    pending: Option<(String, Instant)>,
}

impl QuickFilter {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pending: None,
        }
    }

    /// Records new input and restarts the quiet window.
    pub fn input(&mut self, text: impl Into<String>, now: Instant) {
        self.pending = Some((text.into(), now + self.debounce));
    }

    /// Drops pending input without committing it.
    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at)
    }

    /// Returns the predicate to commit once input has been quiet long enough.
    pub fn take_due(&mut self, now: Instant) -> Option<FilterModel> {
        match &self.pending {
            Some((_, at)) if *at <= now => self
                .pending
                .take()
                .map(|(text, _)| FilterModel::quick(&text)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ViewStateStore {
        ViewStateStore::new(NonZeroU64::new(15).unwrap(), SortSpec::default())
    }

    #[test]
    fn defaults_produce_first_page_query() {
        let q = store().query();
        assert_eq!(q.skip, 0);
        assert_eq!(q.limit, 15);
        assert_eq!(q.sort_field, "pk");
        assert_eq!(q.sort_order, SortOrder::Desc);
        assert_eq!(q.filter, FilterModel::default());
    }

    #[test]
    fn skip_is_page_times_page_size() {
        let mut s = store();
        assert!(s.set_page(3));
        assert_eq!(s.query().skip, 45);
        assert!(s.set_page_size(NonZeroU64::new(30).unwrap()));
        assert_eq!(s.page(), 3);
        assert_eq!(s.query().skip, 90);
    }

    #[test]
    fn filter_change_rewinds_page() {
        for start in [0u64, 1, 7, 250] {
            let mut s = store();
            s.set_page(start);
            assert!(s.set_filter(FilterModel::quick("multiply")));
            assert_eq!(s.page(), 0);
            assert_eq!(s.query().skip, 0);
        }
    }

    #[test]
    fn sort_change_keeps_page() {
        let mut s = store();
        s.set_page(2);
        assert!(s.set_sort("ctime", SortOrder::Asc));
        assert_eq!(s.page(), 2);
    }

    #[test]
    fn unchanged_values_do_not_trigger_fetch() {
        let mut s = store();
        assert!(!s.set_page(0));
        assert!(!s.set_sort("pk", SortOrder::Desc));
        assert!(!s.set_filter(FilterModel::default()));
        assert!(!s.set_page_size(NonZeroU64::new(15).unwrap()));
    }

    #[test]
    fn same_filter_does_not_rewind_page() {
        let mut s = store();
        s.set_filter(FilterModel::quick("x"));
        s.set_page(4);
        assert!(!s.set_filter(FilterModel::quick("x")));
        assert_eq!(s.page(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn quick_filter_waits_for_quiet_window() {
        let mut qf = QuickFilter::new(Duration::from_millis(500));
        let t0 = Instant::now();
        qf.input("add", t0);
        assert!(qf.take_due(t0 + Duration::from_millis(499)).is_none());

        // New keystroke restarts the window.
        qf.input("add mul", t0 + Duration::from_millis(300));
        assert!(qf.take_due(t0 + Duration::from_millis(600)).is_none());
        let committed = qf.take_due(t0 + Duration::from_millis(800)).unwrap();
        assert_eq!(committed, FilterModel::quick("add mul"));
        assert!(qf.deadline().is_none());
    }
}
