//! Access events and the event-kind catalog.

use crate::record::{identity_key, IdentityKey, SubjectKind};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Kind of access event.
///
/// The catalog is owned by the event source; codes outside the known set
/// are carried through as [`EventKind::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum EventKind {
    /// Record was registered.
    Registered,
    /// Record was authorized by its host.
    Authorized,
    /// Passage was rejected at a device.
    Rejected,
    /// Subject announced arrival.
    Arrived,
    /// Entry was granted.
    EntryGranted,
    /// Exit was granted.
    ExitGranted,
    /// Record expired without use.
    Expired,
    /// Record was cancelled.
    Cancelled,
    /// Record was finalized.
    Finalized,
    /// Any other catalog entry.
    Other(u16),
}

impl EventKind {
    /// Converts to the catalog code.
    pub fn to_code(&self) -> u16 {
        match self {
            EventKind::Registered => 1,
            EventKind::Authorized => 2,
            EventKind::Rejected => 3,
            EventKind::Arrived => 4,
            EventKind::EntryGranted => 5,
            EventKind::ExitGranted => 6,
            EventKind::Expired => 7,
            EventKind::Cancelled => 8,
            EventKind::Finalized => 9,
            EventKind::Other(code) => *code,
        }
    }

    /// Converts from a catalog code.
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => EventKind::Registered,
            2 => EventKind::Authorized,
            3 => EventKind::Rejected,
            4 => EventKind::Arrived,
            5 => EventKind::EntryGranted,
            6 => EventKind::ExitGranted,
            7 => EventKind::Expired,
            8 => EventKind::Cancelled,
            9 => EventKind::Finalized,
            other => EventKind::Other(other),
        }
    }

    /// Returns true for entry and exit passages.
    pub fn is_passage(&self) -> bool {
        matches!(self, EventKind::EntryGranted | EventKind::ExitGranted)
    }
}

impl From<u16> for EventKind {
    fn from(code: u16) -> Self {
        EventKind::from_code(code)
    }
}

impl From<EventKind> for u16 {
    fn from(kind: EventKind) -> Self {
        kind.to_code()
    }
}

/// Device class that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceKind {
    /// Reception console operated by staff.
    Reception,
    /// Code scanner attached to a console.
    Scanner,
    /// Face or card panel at an access point.
    Panel,
    /// Self-service kiosk.
    Kiosk,
}

/// A discrete occurrence tied to a visit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessEvent {
    /// Record the event belongs to.
    pub record_id: String,
    /// Subject kind of the record.
    pub subject_kind: SubjectKind,
    /// Subject ID of the record.
    pub subject_id: String,
    /// Event kind.
    pub event_kind: EventKind,
    /// Device class.
    pub device_kind: DeviceKind,
    /// User or device that produced the event.
    pub actor_id: String,
    /// Access point label, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_label: Option<String>,
    /// When it happened.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl AccessEvent {
    /// Returns the identity key of the record this event belongs to.
    pub fn identity_key(&self) -> IdentityKey {
        identity_key(self.subject_kind, &self.subject_id, &self.record_id)
    }
}
