//! The display window.
//!
//! A `DisplayWindow` is the bounded, ordered, deduplicated slice of records
//! currently materialized for one page. It is replaced wholesale by `load`
//! and patched incrementally by `apply_create_batch` / `apply_update`.
//!
//! After every call:
//! - `items.len() <= page_size`
//! - items are ordered by the active sort, ties in insertion order
//! - no two items share an identity key

use crate::pagination::{sort_truncate, QueryScope};
use std::cmp::Ordering;
use std::collections::HashMap;
use visitrack_protocol::{
    IdentityKey, Pagination, SortDirection, SortField, SortSpec, VisitRecord,
};

/// Something the window can hold.
pub trait WindowItem: Clone {
    /// Key used to deduplicate and upsert.
    fn identity(&self) -> IdentityKey;

    /// Ascending comparison on a sort field.
    fn compare_by(&self, other: &Self, field: SortField) -> Ordering;

    /// Whether the item may enter the window from the push path.
    fn in_scope(&self, scope: &QueryScope) -> bool;
}

impl WindowItem for VisitRecord {
    fn identity(&self) -> IdentityKey {
        self.identity_key()
    }

    fn compare_by(&self, other: &Self, field: SortField) -> Ordering {
        VisitRecord::compare_by(self, other, field)
    }

    fn in_scope(&self, scope: &QueryScope) -> bool {
        scope.includes(self)
    }
}

/// Result of an incremental merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Items that were not in the window before.
    pub inserted: usize,
    /// Items that replaced an entry with the same identity key.
    pub replaced: usize,
    /// Items refused by the scope test.
    pub dropped: usize,
    /// Items pushed out by truncation.
    pub evicted: usize,
}

impl MergeOutcome {
    /// Items that passed the scope test.
    pub fn accepted(&self) -> usize {
        self.inserted + self.replaced
    }

    /// Returns true if the merge touched the window.
    pub fn changed(&self) -> bool {
        self.accepted() > 0
    }
}

/// The bounded, ordered slice of records on display.
#[derive(Debug, Clone)]
pub struct DisplayWindow<T: WindowItem = VisitRecord> {
    items: Vec<T>,
    sort: SortSpec,
    pagination: Pagination,
    total_count: u64,
    featured: Option<T>,
}

impl<T: WindowItem> DisplayWindow<T> {
    /// Creates an empty window.
    pub fn new(page_size: u32, sort: SortSpec) -> Self {
        Self {
            items: Vec::new(),
            sort,
            pagination: Pagination::new(0, page_size),
            total_count: 0,
            featured: None,
        }
    }

    /// Items in display order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Number of items on display.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing is on display.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Active sort.
    pub fn sort(&self) -> SortSpec {
        self.sort
    }

    /// Current page selection.
    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    /// Rows per page.
    pub fn page_size(&self) -> usize {
        self.pagination.page_size as usize
    }

    /// Total rows reported by the last load.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Featured item, if any.
    pub fn featured(&self) -> Option<&T> {
        self.featured.as_ref()
    }

    /// Replaces the featured item.
    pub fn set_featured(&mut self, featured: Option<T>) {
        self.featured = featured;
    }

    /// Finds the first item matching `predicate`.
    pub fn find_by<F>(&self, predicate: F) -> Option<&T>
    where
        F: Fn(&T) -> bool,
    {
        self.items.iter().find(|item| predicate(item))
    }

    /// Returns true if an item with `key` is on display.
    pub fn contains_key(&self, key: &IdentityKey) -> bool {
        self.items.iter().any(|item| &item.identity() == key)
    }

    /// Replaces the window with an authoritative page.
    ///
    /// Duplicate identity keys collapse onto the first slot, last occurrence
    /// winning.
    pub fn load(&mut self, rows: Vec<T>, total_count: u64, featured: Option<T>) {
        let mut items: Vec<T> = Vec::with_capacity(rows.len());
        let mut index: HashMap<IdentityKey, usize> = HashMap::with_capacity(rows.len());
        for row in rows {
            upsert(&mut items, &mut index, row);
        }
        self.items = items;
        self.total_count = total_count;
        self.featured = featured;
        self.reorder();
    }

    /// Merges a batch of newly created items.
    ///
    /// Items outside `scope` are dropped without further notice.
    pub fn apply_create_batch(&mut self, batch: Vec<T>, scope: &QueryScope) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let mut index = self.index();
        for item in batch {
            if !item.in_scope(scope) {
                outcome.dropped += 1;
                continue;
            }
            if upsert(&mut self.items, &mut index, item) {
                outcome.replaced += 1;
            } else {
                outcome.inserted += 1;
            }
        }
        if outcome.changed() {
            outcome.evicted = self.reorder();
        }
        outcome
    }

    /// Merges one changed item.
    ///
    /// An item already on display is always replaced; a new one must pass
    /// the scope test first.
    pub fn apply_update(&mut self, item: T, scope: &QueryScope) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let mut index = self.index();
        if !index.contains_key(&item.identity()) && !item.in_scope(scope) {
            outcome.dropped = 1;
            return outcome;
        }
        if upsert(&mut self.items, &mut index, item) {
            outcome.replaced = 1;
        } else {
            outcome.inserted = 1;
        }
        outcome.evicted = self.reorder();
        outcome
    }

    /// Replaces the active sort and re-sorts in place.
    pub fn set_sort(&mut self, field: SortField, direction: SortDirection) {
        self.sort = SortSpec::new(field, direction);
        self.reorder();
    }

    /// Inverts the sort direction and re-sorts in place.
    pub fn toggle_sort(&mut self) {
        self.set_sort(self.sort.field, self.sort.direction.inverted());
    }

    /// Selects a page. Items stay until the next load.
    pub fn set_page(&mut self, page: u32) {
        self.pagination.page = page;
    }

    /// Changes the page size, truncating if needed.
    pub fn set_page_size(&mut self, page_size: u32) {
        self.pagination.page_size = page_size;
        self.reorder();
    }

    /// Checks the window invariants.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.items.len() > self.page_size() {
            return Err(format!(
                "{} items exceed page size {}",
                self.items.len(),
                self.page_size()
            ));
        }
        for pair in self.items.windows(2) {
            if compare(self.sort, &pair[0], &pair[1]) == Ordering::Greater {
                return Err("items out of order".into());
            }
        }
        let mut seen = HashMap::new();
        for (position, item) in self.items.iter().enumerate() {
            if let Some(previous) = seen.insert(item.identity(), position) {
                return Err(format!(
                    "identity {} at {previous} and {position}",
                    item.identity()
                ));
            }
        }
        Ok(())
    }

    fn index(&self) -> HashMap<IdentityKey, usize> {
        self.items
            .iter()
            .enumerate()
            .map(|(position, item)| (item.identity(), position))
            .collect()
    }

    fn reorder(&mut self) -> usize {
        let sort = self.sort;
        let limit = self.page_size();
        sort_truncate(&mut self.items, limit, |a, b| compare(sort, a, b))
    }
}

fn compare<T: WindowItem>(sort: SortSpec, a: &T, b: &T) -> Ordering {
    let ordering = a.compare_by(b, sort.field);
    match sort.direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

// Returns true when an existing slot was overwritten.
fn upsert<T: WindowItem>(
    items: &mut Vec<T>,
    index: &mut HashMap<IdentityKey, usize>,
    item: T,
) -> bool {
    let key = item.identity();
    match index.get(&key) {
        Some(&position) => {
            items[position] = item;
            true
        }
        None => {
            index.insert(key, items.len());
            items.push(item);
            false
        }
    }
}
