//! Query, mutation and push messages.

use crate::error::ProtocolError;
use crate::event::DeviceKind;
use crate::record::{SubjectKind, VisitRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// Field a window or query is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    /// Last modification time.
    LastModified,
    /// Creation time.
    CreatedAt,
    /// Entry time.
    EntryTimestamp,
    /// Display name, case-insensitive.
    DisplayName,
    /// Lifecycle status rank.
    Status,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    /// Returns the opposite direction.
    #[must_use]
    pub fn inverted(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

/// One sort criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    /// Field.
    pub field: SortField,
    /// Direction.
    pub direction: SortDirection,
}

impl SortSpec {
    /// Creates a sort criterion.
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }
}

impl Default for SortSpec {
    /// Most recently modified first.
    fn default() -> Self {
        Self::new(SortField::LastModified, SortDirection::Desc)
    }
}

/// Page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Zero-based page index.
    pub page: u32,
    /// Rows per page.
    pub page_size: u32,
}

impl Pagination {
    /// Creates a pagination.
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    /// Index of the first row of this page.
    pub fn offset(&self) -> usize {
        self.page as usize * self.page_size as usize
    }

    /// Number of pages needed for `total` rows (at least one).
    pub fn page_count(&self, total: u64) -> u32 {
        if self.page_size == 0 {
            return 1;
        }
        let pages = total.div_ceil(u64::from(self.page_size));
        u32::try_from(pages.max(1)).unwrap_or(u32::MAX)
    }

    /// Returns this pagination with the page clamped to the last page.
    #[must_use]
    pub fn clamped(self, total: u64) -> Self {
        let last = self.page_count(total) - 1;
        Self {
            page: self.page.min(last),
            page_size: self.page_size,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(0, 10)
    }
}

/// Paginated, sorted, filtered query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    /// Quick-filter terms; a row matches when it matches every term.
    #[serde(default)]
    pub filter: Vec<String>,
    /// Page selection.
    pub pagination: Pagination,
    /// Sort criteria, most significant first.
    #[serde(default)]
    pub sort: Vec<SortSpec>,
    /// Day of interest.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<OffsetDateTime>,
    /// Restrict to records assigned to this access point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_scope: Option<String>,
}

impl QueryRequest {
    /// Creates a request for a page with the default sort.
    pub fn new(pagination: Pagination) -> Self {
        Self {
            filter: Vec::new(),
            pagination,
            sort: vec![SortSpec::default()],
            date: None,
            access_scope: None,
        }
    }

    /// Sets the quick-filter terms.
    pub fn with_filter(mut self, filter: Vec<String>) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the sort.
    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = vec![sort];
        self
    }

    /// Sets the day of interest.
    pub fn with_date(mut self, date: OffsetDateTime) -> Self {
        self.date = Some(date);
        self
    }

    /// Sets the access-point scope.
    pub fn with_access_scope(mut self, access_id: impl Into<String>) -> Self {
        self.access_scope = Some(access_id.into());
        self
    }

    /// Returns the most significant sort criterion.
    pub fn primary_sort(&self) -> SortSpec {
        self.sort.first().copied().unwrap_or_default()
    }
}

/// Aggregate stats returned with a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryStats {
    /// Rows matching the query, across all pages.
    pub total_count: u64,
    /// Employees currently counted as inside.
    pub employee_entries: u64,
    /// Employees currently counted as out.
    pub employee_exits: u64,
    /// Visitors currently counted as inside.
    pub visitor_entries: u64,
    /// Visitors currently counted as out.
    pub visitor_exits: u64,
    /// Unresolved subjects counted as inside.
    pub unknown_entries: u64,
    /// Unresolved subjects counted as out.
    pub unknown_exits: u64,
}

impl QueryStats {
    /// Returns `(entries, exits)` for a subject kind.
    pub fn tally(&self, kind: SubjectKind) -> (u64, u64) {
        match kind {
            SubjectKind::Employee => (self.employee_entries, self.employee_exits),
            SubjectKind::Visitor => (self.visitor_entries, self.visitor_exits),
            SubjectKind::Unknown => (self.unknown_entries, self.unknown_exits),
        }
    }

    /// Sets `(entries, exits)` for a subject kind.
    pub fn set_tally(&mut self, kind: SubjectKind, entries: u64, exits: u64) {
        match kind {
            SubjectKind::Employee => {
                self.employee_entries = entries;
                self.employee_exits = exits;
            }
            SubjectKind::Visitor => {
                self.visitor_entries = entries;
                self.visitor_exits = exits;
            }
            SubjectKind::Unknown => {
                self.unknown_entries = entries;
                self.unknown_exits = exits;
            }
        }
    }
}

/// Authoritative snapshot for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    /// Rows of the requested page.
    pub paginated_results: Vec<VisitRecord>,
    /// Rows matching the query, across all pages.
    pub total_count: u64,
    /// Aggregate stats.
    #[serde(default)]
    pub stats: QueryStats,
    /// Most recent activity, featured on the first page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_record: Option<VisitRecord>,
}

impl QueryResponse {
    /// Creates a response without a featured record.
    pub fn new(rows: Vec<VisitRecord>, total_count: u64, stats: QueryStats) -> Self {
        Self {
            paginated_results: rows,
            total_count,
            stats,
            first_record: None,
        }
    }

    /// Sets the featured record.
    pub fn with_first_record(mut self, record: VisitRecord) -> Self {
        self.first_record = Some(record);
        self
    }
}

/// Body of a cancel mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    /// Why the visit was cancelled.
    pub reason: String,
    /// Whether to notify host and subject.
    pub notify: bool,
}

impl CancelRequest {
    /// Creates a cancel request.
    pub fn new(reason: impl Into<String>, notify: bool) -> Self {
        Self {
            reason: reason.into(),
            notify,
        }
    }
}

/// Notification results of a cancel mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOutcome {
    /// Host was notified.
    pub host_notified: bool,
    /// Subject was notified.
    pub subject_notified: bool,
}

/// Body of a mark-access mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAccessRequest {
    /// Access point the operator is acting at.
    pub access_id: String,
}

/// Body of a grant-access mutation: the completed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantAccessRequest {
    /// Full record payload, including any completed data.
    pub record: VisitRecord,
}

/// Body of a code validation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCodeRequest {
    /// Scanned code.
    pub code: String,
    /// Device class that scanned it.
    pub source_device_kind: DeviceKind,
}

/// Result of a code validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCodeResponse {
    /// Record the code resolved to.
    pub record_id: String,
    /// False when the subject must complete missing data first.
    pub can_enter: bool,
}

/// Client-originated re-broadcast trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyMutation {
    /// Record that changed.
    pub record_id: String,
}

/// Push channel topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    /// Batch of newly created records.
    NewRecords,
    /// A single record changed.
    RecordUpdated,
    /// An access event plus the record it touched.
    AccessEvents,
    /// Client-originated request to re-broadcast a record.
    NotifyMutation,
}

impl Topic {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::NewRecords => "new-records",
            Topic::RecordUpdated => "record-updated",
            Topic::AccessEvents => "access-events",
            Topic::NotifyMutation => "notify-mutation",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new-records" => Ok(Topic::NewRecords),
            "record-updated" => Ok(Topic::RecordUpdated),
            "access-events" => Ok(Topic::AccessEvents),
            "notify-mutation" => Ok(Topic::NotifyMutation),
            other => Err(ProtocolError::UnknownTopic(other.to_string())),
        }
    }
}
