//! Query scope and ordering helpers shared by the window and the engine.

use std::cmp::Ordering;
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use visitrack_protocol::VisitRecord;

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// Inclusive start.
    pub start: OffsetDateTime,
    /// Exclusive end.
    pub end: OffsetDateTime,
}

impl DateRange {
    /// Creates a range.
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Self {
        Self { start, end }
    }

    /// The calendar day `date` as seen from `offset`.
    pub fn day(date: Date, offset: UtcOffset) -> Self {
        let start = PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_offset(offset);
        Self {
            start,
            end: start + Duration::DAY,
        }
    }

    /// Returns true if `at` falls inside the range.
    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.start <= at && at < self.end
    }
}

/// Filter a record must pass to enter the window from the push path.
///
/// The quick filter is deliberately absent: it is a server-side text search
/// and is only honored by full loads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryScope {
    /// Day of interest.
    pub date_range: Option<DateRange>,
    /// Access point the view is restricted to.
    pub access_scope: Option<String>,
}

impl QueryScope {
    /// Scope that accepts everything.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Sets the date range.
    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    /// Sets the access scope.
    pub fn with_access_scope(mut self, access_id: impl Into<String>) -> Self {
        self.access_scope = Some(access_id.into());
        self
    }

    /// Returns true if the record belongs to this scope.
    pub fn includes(&self, record: &VisitRecord) -> bool {
        if let Some(range) = &self.date_range {
            if !range.contains(record.entry_timestamp) {
                return false;
            }
        }
        match &self.access_scope {
            Some(access_id) => record.has_access_point(access_id),
            None => true,
        }
    }
}

/// Stably sorts `items` with `compare` and truncates to `limit`.
///
/// Returns the number of items evicted by the truncation.
pub fn sort_truncate<T, F>(items: &mut Vec<T>, limit: usize, mut compare: F) -> usize
where
    F: FnMut(&T, &T) -> Ordering,
{
    items.sort_by(|a, b| compare(a, b));
    let evicted = items.len().saturating_sub(limit);
    items.truncate(limit);
    evicted
}
