//! Record fixtures and scratch-file helpers.
//!
//! Every fixture lives on the reference day, 2024-05-01 UTC, unless a test
//! moves it explicitly.

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use time::macros::date;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use visitrack_protocol::{
    AccessEvent, AccessMode, AccessPointRef, DeviceKind, EventKind, SubjectKind, VisitRecord,
    VisitStatus,
};

/// The day all fixtures live on.
pub fn reference_day() -> Date {
    date!(2024 - 05 - 01)
}

/// A UTC instant on the reference day.
///
/// # Panics
///
/// Panics if `hour` or `minute` is out of range.
pub fn at(hour: u8, minute: u8) -> OffsetDateTime {
    let time = Time::from_hms(hour, minute, 0).expect("Invalid time of day");
    PrimitiveDateTime::new(reference_day(), time).assume_utc()
}

/// Builder for `VisitRecord` fixtures.
///
/// Defaults: pending, active, entry at 09:00, created and modified at
/// 08:00, one toggle access point named `lobby`, display name equal to
/// the record ID.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record: VisitRecord,
}

impl RecordBuilder {
    /// Starts a record for any subject kind.
    pub fn new(id: &str, kind: SubjectKind, subject_id: &str) -> Self {
        Self {
            record: VisitRecord {
                id: id.to_string(),
                subject_kind: kind,
                subject_id: subject_id.to_string(),
                host_id: None,
                display_name: id.to_string(),
                access_points: vec![AccessPointRef::new("lobby", AccessMode::Toggle)],
                status: VisitStatus::Pending,
                missing_documents: Vec::new(),
                cancellation_reason: None,
                entry_timestamp: at(9, 0),
                exit_timestamp: None,
                created_at: at(8, 0),
                last_modified: at(8, 0),
                active: true,
            },
        }
    }

    /// Starts a visitor record; the subject ID is derived from `id`.
    pub fn visitor(id: &str) -> Self {
        Self::new(id, SubjectKind::Visitor, &format!("vis-{id}"))
    }

    /// Starts an employee record.
    pub fn employee(id: &str, subject_id: &str) -> Self {
        Self::new(id, SubjectKind::Employee, subject_id)
    }

    /// Starts a record whose subject could not be resolved.
    pub fn unknown(id: &str) -> Self {
        Self::new(id, SubjectKind::Unknown, &format!("unk-{id}"))
    }

    /// Sets the display name.
    pub fn display_name(mut self, name: &str) -> Self {
        self.record.display_name = name.to_string();
        self
    }

    /// Sets the host.
    pub fn host(mut self, host_id: &str) -> Self {
        self.record.host_id = Some(host_id.to_string());
        self
    }

    /// Sets the status.
    pub fn status(mut self, status: VisitStatus) -> Self {
        self.record.status = status;
        self
    }

    /// Sets the entry time.
    pub fn entry(mut self, at: OffsetDateTime) -> Self {
        self.record.entry_timestamp = at;
        self
    }

    /// Sets the exit time.
    pub fn exit(mut self, at: OffsetDateTime) -> Self {
        self.record.exit_timestamp = Some(at);
        self
    }

    /// Sets the creation time.
    pub fn created(mut self, at: OffsetDateTime) -> Self {
        self.record.created_at = at;
        self
    }

    /// Sets the last modification time.
    pub fn modified(mut self, at: OffsetDateTime) -> Self {
        self.record.last_modified = at;
        self
    }

    /// Removes every access point.
    pub fn no_access_points(mut self) -> Self {
        self.record.access_points.clear();
        self
    }

    /// Adds an access point unless it is already assigned.
    pub fn access_point(mut self, point: AccessPointRef) -> Self {
        if !self.record.has_access_point(&point.access_id) {
            self.record.access_points.push(point);
        }
        self
    }

    /// Adds a toggle access point.
    pub fn toggle_point(self, access_id: &str) -> Self {
        self.access_point(AccessPointRef::new(access_id, AccessMode::Toggle))
    }

    /// Adds an attended access point.
    pub fn attended_point(self, access_id: &str) -> Self {
        self.access_point(AccessPointRef::new(access_id, AccessMode::Attended))
    }

    /// Adds a missing document.
    pub fn missing(mut self, document: &str) -> Self {
        self.record.missing_documents.push(document.to_string());
        self
    }

    /// Marks the record inactive.
    pub fn inactive(mut self) -> Self {
        self.record.active = false;
        self
    }

    /// Finishes the record.
    pub fn build(self) -> VisitRecord {
        self.record
    }
}

/// An access event for `record`, as produced by a panel.
pub fn access_event(record: &VisitRecord, kind: EventKind, at: OffsetDateTime) -> AccessEvent {
    AccessEvent {
        record_id: record.id.clone(),
        subject_kind: record.subject_kind,
        subject_id: record.subject_id.clone(),
        event_kind: kind,
        device_kind: DeviceKind::Panel,
        actor_id: "panel-1".to_string(),
        access_label: record
            .access_points
            .first()
            .map(|point| point.access_id.clone()),
        timestamp: at,
    }
}

/// A small, mixed day of records, modified one minute apart.
pub fn sample_day() -> Vec<VisitRecord> {
    vec![
        RecordBuilder::visitor("v-ana")
            .display_name("Ana Lopez")
            .host("emp-host")
            .modified(at(9, 1))
            .build(),
        RecordBuilder::visitor("v-bruno")
            .display_name("Bruno Diaz")
            .status(VisitStatus::EntryGranted)
            .modified(at(9, 2))
            .build(),
        RecordBuilder::employee("e-carla", "emp-carla")
            .display_name("Carla Ruiz")
            .status(VisitStatus::EntryGranted)
            .modified(at(9, 3))
            .build(),
        RecordBuilder::visitor("v-dora")
            .display_name("Dora Paz")
            .status(VisitStatus::ExitGranted)
            .attended_point("lab")
            .modified(at(9, 4))
            .build(),
        RecordBuilder::unknown("u-1")
            .display_name("Unresolved")
            .no_access_points()
            .modified(at(9, 5))
            .build(),
    ]
}

/// A scratch directory removed on drop.
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    /// Creates a scratch directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Root of the scratch directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `value` as pretty JSON.
    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json)?;
        Ok(path)
    }

    /// Writes raw lines, one per entry.
    pub fn write_lines<I, L>(&self, name: &str, lines: I) -> io::Result<PathBuf>
    where
        I: IntoIterator<Item = L>,
        L: AsRef<str>,
    {
        let path = self.dir.path().join(name);
        let mut contents = String::new();
        for line in lines {
            contents.push_str(line.as_ref());
            contents.push('\n');
        }
        fs::write(&path, contents)?;
        Ok(path)
    }
}

impl Default for Scratch {
    fn default() -> Self {
        Self::new()
    }
}
