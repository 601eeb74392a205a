//! Property-based test generators using proptest.
//!
//! Record strategies draw IDs and subjects from small pools so that
//! generated batches collide on identity keys often.

use crate::fixtures::at;
use proptest::prelude::*;
use time::Duration;
use visitrack_protocol::{
    AccessMode, AccessPointRef, EventKind, SortDirection, SortField, SortSpec, SubjectKind,
    VisitRecord, VisitStatus,
};

/// Strategy for subject kinds.
pub fn subject_kind_strategy() -> impl Strategy<Value = SubjectKind> {
    prop_oneof![
        2 => Just(SubjectKind::Visitor),
        2 => Just(SubjectKind::Employee),
        1 => Just(SubjectKind::Unknown),
    ]
}

/// Strategy for lifecycle statuses.
pub fn status_strategy() -> impl Strategy<Value = VisitStatus> {
    prop_oneof![
        Just(VisitStatus::Pending),
        Just(VisitStatus::EntryGranted),
        Just(VisitStatus::ExitGranted),
        Just(VisitStatus::Cancelled),
        Just(VisitStatus::Finalized),
    ]
}

/// Strategy for sort criteria.
pub fn sort_spec_strategy() -> impl Strategy<Value = SortSpec> {
    let field = prop_oneof![
        Just(SortField::LastModified),
        Just(SortField::CreatedAt),
        Just(SortField::EntryTimestamp),
        Just(SortField::DisplayName),
        Just(SortField::Status),
    ];
    let direction = prop_oneof![Just(SortDirection::Asc), Just(SortDirection::Desc)];
    (field, direction).prop_map(|(field, direction)| SortSpec::new(field, direction))
}

/// Strategy for passage and non-passage event kinds.
pub fn event_kind_strategy() -> impl Strategy<Value = EventKind> {
    prop_oneof![
        3 => Just(EventKind::EntryGranted),
        3 => Just(EventKind::ExitGranted),
        1 => (1u16..=12).prop_map(EventKind::from_code),
    ]
}

fn access_points_strategy() -> impl Strategy<Value = Vec<AccessPointRef>> {
    prop::sample::subsequence(vec!["lobby", "garage", "lab"], 0..=3).prop_flat_map(|ids| {
        let count = ids.len();
        prop::collection::vec(any::<bool>(), count).prop_map(move |toggles| {
            ids.iter()
                .zip(toggles)
                .map(|(id, toggle)| {
                    let mode = if toggle {
                        AccessMode::Toggle
                    } else {
                        AccessMode::Attended
                    };
                    AccessPointRef::new(*id, mode)
                })
                .collect()
        })
    })
}

/// Strategy for valid visit records on the reference day.
pub fn record_strategy() -> impl Strategy<Value = VisitRecord> {
    (
        0u8..8,
        subject_kind_strategy(),
        0u8..4,
        status_strategy(),
        access_points_strategy(),
        (0u8..24, 0u8..60),
        0i64..120,
        (0u8..24, 0u8..60),
        prop::sample::select(vec!["Ana", "bruno", "Carla", "dora", "Eva"]),
    )
        .prop_map(
            |(id, kind, subject, status, access_points, entry, stay, modified, name)| {
                let entry = at(entry.0, entry.1);
                VisitRecord {
                    id: format!("r-{id}"),
                    subject_kind: kind,
                    subject_id: format!("s-{subject}"),
                    host_id: None,
                    display_name: name.to_string(),
                    access_points,
                    status,
                    missing_documents: Vec::new(),
                    cancellation_reason: None,
                    entry_timestamp: entry,
                    exit_timestamp: (status == VisitStatus::Finalized)
                        .then(|| entry + Duration::minutes(stay)),
                    created_at: entry - Duration::hours(1),
                    last_modified: at(modified.0, modified.1),
                    active: true,
                }
            },
        )
}

/// Strategy for up to `max` records.
pub fn records_strategy(max: usize) -> impl Strategy<Value = Vec<VisitRecord>> {
    prop::collection::vec(record_strategy(), 0..=max)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 64,
            max_shrink_iters: 200,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
