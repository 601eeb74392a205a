//! Visit records and their identity key.

use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::SortField;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use time::OffsetDateTime;

/// Who a visit record is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubjectKind {
    /// A registered employee of a tenant company.
    Employee,
    /// An external visitor.
    Visitor,
    /// Origin could not be resolved (e.g. a panel event without a match).
    Unknown,
}

impl SubjectKind {
    /// All subject kinds, in display order.
    pub const ALL: [SubjectKind; 3] = [
        SubjectKind::Employee,
        SubjectKind::Visitor,
        SubjectKind::Unknown,
    ];

    /// Returns a short label.
    pub fn label(&self) -> &'static str {
        match self {
            SubjectKind::Employee => "employee",
            SubjectKind::Visitor => "visitor",
            SubjectKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle status of a visit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VisitStatus {
    /// Registered, not yet admitted.
    Pending,
    /// Subject is inside.
    EntryGranted,
    /// Subject has left through an access point.
    ExitGranted,
    /// Cancelled before admission. Terminal.
    Cancelled,
    /// Visit closed. Terminal.
    Finalized,
}

impl VisitStatus {
    /// Returns true if no transition can leave this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, VisitStatus::Cancelled | VisitStatus::Finalized)
    }

    /// Rank used when sorting by status.
    pub fn rank(&self) -> u8 {
        match self {
            VisitStatus::Pending => 0,
            VisitStatus::EntryGranted => 1,
            VisitStatus::ExitGranted => 2,
            VisitStatus::Cancelled => 3,
            VisitStatus::Finalized => 4,
        }
    }
}

impl fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VisitStatus::Pending => "pending",
            VisitStatus::EntryGranted => "entry-granted",
            VisitStatus::ExitGranted => "exit-granted",
            VisitStatus::Cancelled => "cancelled",
            VisitStatus::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// How an access point handles passages for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessMode {
    /// Every passage needs an operator decision.
    Attended,
    /// The access point toggles between entry and exit on its own.
    Toggle,
}

impl AccessMode {
    /// Returns true if `MarkAccess` may flip entry/exit at this point.
    pub fn permits_toggle(&self) -> bool {
        matches!(self, AccessMode::Toggle)
    }
}

/// An access point a record is allowed through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPointRef {
    /// Access point ID.
    pub access_id: String,
    /// Configured mode for this record.
    pub mode: AccessMode,
}

impl AccessPointRef {
    /// Creates an access point reference.
    pub fn new(access_id: impl Into<String>, mode: AccessMode) -> Self {
        Self {
            access_id: access_id.into(),
            mode,
        }
    }
}

/// Key used to deduplicate and upsert records.
///
/// Employees are tracked per person, so every record of the same employee
/// collapses into one row. Visitors are tracked per visit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IdentityKey {
    /// `(subjectKind, subjectId)`, used for employees.
    Subject {
        /// Subject kind.
        kind: SubjectKind,
        /// Subject ID.
        subject_id: String,
    },
    /// Record ID, used for visitors and unresolved subjects.
    Record(String),
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKey::Subject { kind, subject_id } => write!(f, "{kind}:{subject_id}"),
            IdentityKey::Record(id) => write!(f, "record:{id}"),
        }
    }
}

/// Computes the identity key for a subject/record pair.
///
/// This is the only place the employee/visitor asymmetry is encoded; the
/// window and the counters both go through it.
pub fn identity_key(kind: SubjectKind, subject_id: &str, record_id: &str) -> IdentityKey {
    match kind {
        SubjectKind::Employee => IdentityKey::Subject {
            kind,
            subject_id: subject_id.to_string(),
        },
        SubjectKind::Visitor | SubjectKind::Unknown => IdentityKey::Record(record_id.to_string()),
    }
}

/// A tracked visitor or employee access entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitRecord {
    /// Opaque record ID.
    pub id: String,
    /// Subject kind.
    pub subject_kind: SubjectKind,
    /// Employee or visitor ID.
    pub subject_id: String,
    /// Host employee, for visits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    /// Name shown in listings; searched by the quick filter.
    #[serde(default)]
    pub display_name: String,
    /// Access points, in the order they were assigned.
    #[serde(default)]
    pub access_points: Vec<AccessPointRef>,
    /// Lifecycle status.
    pub status: VisitStatus,
    /// Document types still to be provided.
    #[serde(default)]
    pub missing_documents: Vec<String>,
    /// Reason given when the record was cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
    /// Scheduled or actual entry time.
    #[serde(with = "time::serde::rfc3339")]
    pub entry_timestamp: OffsetDateTime,
    /// Exit time, once finalized.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub exit_timestamp: Option<OffsetDateTime>,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last modification time.
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
    /// Whether the record is still usable.
    pub active: bool,
}

impl VisitRecord {
    /// Returns this record's identity key.
    pub fn identity_key(&self) -> IdentityKey {
        identity_key(self.subject_kind, &self.subject_id, &self.id)
    }

    /// Looks up an assigned access point.
    pub fn access_point(&self, access_id: &str) -> Option<&AccessPointRef> {
        self.access_points
            .iter()
            .find(|point| point.access_id == access_id)
    }

    /// Returns true if the record is assigned to the access point.
    pub fn has_access_point(&self, access_id: &str) -> bool {
        self.access_point(access_id).is_some()
    }

    /// Compares two records by a sort field, ascending.
    pub fn compare_by(&self, other: &Self, field: SortField) -> Ordering {
        match field {
            SortField::LastModified => self.last_modified.cmp(&other.last_modified),
            SortField::CreatedAt => self.created_at.cmp(&other.created_at),
            SortField::EntryTimestamp => self.entry_timestamp.cmp(&other.entry_timestamp),
            SortField::DisplayName => self
                .display_name
                .to_lowercase()
                .cmp(&other.display_name.to_lowercase()),
            SortField::Status => self.status.rank().cmp(&other.status.rank()),
        }
    }

    /// Checks the invariants a record must hold to be accepted from the wire.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.id.trim().is_empty() {
            return Err(ProtocolError::MissingField("id"));
        }
        if self.subject_id.trim().is_empty() {
            return Err(ProtocolError::MissingField("subjectId"));
        }
        if let Some(exit) = self.exit_timestamp {
            if exit < self.entry_timestamp {
                return Err(ProtocolError::Inconsistent {
                    id: self.id.clone(),
                    reason: "exit timestamp precedes entry timestamp".into(),
                });
            }
        }
        if self
            .access_points
            .iter()
            .any(|point| point.access_id.trim().is_empty())
        {
            return Err(ProtocolError::MissingField("accessPoints.accessId"));
        }
        Ok(())
    }
}
