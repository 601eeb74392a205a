//! Live entry/exit tallies per subject kind.
//!
//! Counters are a running estimate: every `load` replaces them with the
//! authoritative stats, and passage events move them in between.

use std::collections::{BTreeMap, HashSet, VecDeque};
use time::OffsetDateTime;
use visitrack_protocol::{AccessEvent, EventKind, IdentityKey, QueryStats, SubjectKind};

/// Entries and exits for one subject kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    /// Currently inside.
    pub entries: u64,
    /// Currently out.
    pub exits: u64,
}

impl Tally {
    /// Creates a tally.
    pub fn new(entries: u64, exits: u64) -> Self {
        Self { entries, exits }
    }
}

type EventFingerprint = (IdentityKey, u16, OffsetDateTime);

/// Entry/exit tallies keyed by subject kind.
#[derive(Debug, Clone)]
pub struct Counters {
    tallies: BTreeMap<SubjectKind, Tally>,
    total_count: u64,
    recent: VecDeque<EventFingerprint>,
    recent_index: HashSet<EventFingerprint>,
    recent_capacity: usize,
}

impl Counters {
    /// Creates zeroed counters remembering up to `recent_capacity` events.
    pub fn new(recent_capacity: usize) -> Self {
        Self {
            tallies: SubjectKind::ALL
                .iter()
                .map(|kind| (*kind, Tally::default()))
                .collect(),
            total_count: 0,
            recent: VecDeque::with_capacity(recent_capacity),
            recent_index: HashSet::with_capacity(recent_capacity),
            recent_capacity,
        }
    }

    /// Tally for a subject kind.
    pub fn tally(&self, kind: SubjectKind) -> Tally {
        self.tallies.get(&kind).copied().unwrap_or_default()
    }

    /// Total rows reported by the last load.
    pub fn total(&self) -> u64 {
        self.total_count
    }

    /// Replaces every tally with authoritative stats.
    pub fn load(&mut self, stats: &QueryStats) {
        for kind in SubjectKind::ALL {
            let (entries, exits) = stats.tally(kind);
            self.tallies.insert(kind, Tally::new(entries, exits));
        }
        self.total_count = stats.total_count;
        self.recent.clear();
        self.recent_index.clear();
    }

    /// Moves the tally of `kind` for a passage event.
    ///
    /// Returns false if the event kind does not affect counters.
    pub fn apply(&mut self, kind: SubjectKind, event_kind: EventKind) -> bool {
        let tally = self.tallies.entry(kind).or_default();
        match event_kind {
            EventKind::EntryGranted => {
                tally.entries = tally.entries.saturating_add(1);
                tally.exits = tally.exits.saturating_sub(1);
                true
            }
            EventKind::ExitGranted => {
                tally.exits = tally.exits.saturating_add(1);
                tally.entries = tally.entries.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    /// Applies an access event, ignoring exact re-deliveries.
    ///
    /// Returns true if the counters moved.
    pub fn apply_event(&mut self, event: &AccessEvent) -> bool {
        if !event.event_kind.is_passage() {
            return false;
        }
        let fingerprint = (
            event.identity_key(),
            event.event_kind.to_code(),
            event.timestamp,
        );
        if self.recent_index.contains(&fingerprint) {
            return false;
        }
        self.remember(fingerprint);
        self.apply(event.subject_kind, event.event_kind)
    }

    /// Converts back to wire stats.
    pub fn to_stats(&self) -> QueryStats {
        let mut stats = QueryStats {
            total_count: self.total_count,
            ..QueryStats::default()
        };
        for (kind, tally) in &self.tallies {
            stats.set_tally(*kind, tally.entries, tally.exits);
        }
        stats
    }

    fn remember(&mut self, fingerprint: EventFingerprint) {
        if self.recent_capacity == 0 {
            return;
        }
        if self.recent.len() == self.recent_capacity {
            if let Some(oldest) = self.recent.pop_front() {
                self.recent_index.remove(&oldest);
            }
        }
        self.recent_index.insert(fingerprint.clone());
        self.recent.push_back(fingerprint);
    }
}

impl Default for Counters {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use visitrack_testkit::{access_event, at, RecordBuilder};

    fn visitor_stats(entries: u64, exits: u64) -> QueryStats {
        let mut stats = QueryStats::default();
        stats.set_tally(SubjectKind::Visitor, entries, exits);
        stats
    }

    #[test]
    fn exits_move_entries_to_exits() {
        let mut counters = Counters::default();
        counters.load(&visitor_stats(2, 0));

        counters.apply(SubjectKind::Visitor, EventKind::ExitGranted);
        assert_eq!(counters.tally(SubjectKind::Visitor), Tally::new(1, 1));

        counters.apply(SubjectKind::Visitor, EventKind::ExitGranted);
        assert_eq!(counters.tally(SubjectKind::Visitor), Tally::new(0, 2));
    }

    #[test]
    fn decrements_clamp_at_zero() {
        let mut counters = Counters::default();
        counters.apply(SubjectKind::Employee, EventKind::EntryGranted);
        counters.apply(SubjectKind::Employee, EventKind::EntryGranted);
        assert_eq!(counters.tally(SubjectKind::Employee), Tally::new(2, 0));

        counters.load(&QueryStats::default());
        counters.apply(SubjectKind::Employee, EventKind::ExitGranted);
        assert_eq!(counters.tally(SubjectKind::Employee), Tally::new(0, 1));
    }

    #[test]
    fn non_passage_events_leave_counters_alone() {
        let mut counters = Counters::default();
        counters.load(&visitor_stats(3, 1));
        for kind in [EventKind::Cancelled, EventKind::Finalized, EventKind::Other(42)] {
            assert!(!counters.apply(SubjectKind::Visitor, kind));
        }
        assert_eq!(counters.tally(SubjectKind::Visitor), Tally::new(3, 1));
    }

    #[test]
    fn kinds_are_independent() {
        let mut counters = Counters::default();
        counters.load(&visitor_stats(1, 0));
        counters.apply(SubjectKind::Unknown, EventKind::EntryGranted);
        assert_eq!(counters.tally(SubjectKind::Visitor), Tally::new(1, 0));
        assert_eq!(counters.tally(SubjectKind::Unknown), Tally::new(1, 0));
    }

    #[test]
    fn redelivered_event_counts_once() {
        let record = RecordBuilder::visitor("r-1").build();
        let event = access_event(&record, EventKind::EntryGranted, at(9, 0));

        let mut counters = Counters::default();
        assert!(counters.apply_event(&event));
        assert!(!counters.apply_event(&event));
        assert_eq!(counters.tally(SubjectKind::Visitor), Tally::new(1, 0));

        let later = access_event(&record, EventKind::EntryGranted, at(9, 1));
        assert!(counters.apply_event(&later));
        assert_eq!(counters.tally(SubjectKind::Visitor), Tally::new(2, 0));
    }

    #[test]
    fn dedup_memory_is_bounded() {
        let record = RecordBuilder::visitor("r-1").build();
        let first = access_event(&record, EventKind::ExitGranted, at(9, 0));
        let second = access_event(&record, EventKind::ExitGranted, at(9, 1));

        let mut counters = Counters::new(1);
        counters.apply_event(&first);
        counters.apply_event(&second);
        assert!(counters.apply_event(&first));
        assert_eq!(counters.tally(SubjectKind::Visitor), Tally::new(0, 3));
    }

    #[test]
    fn round_trips_stats() {
        let mut stats = visitor_stats(4, 2);
        stats.set_tally(SubjectKind::Employee, 7, 1);
        stats.total_count = 13;

        let mut counters = Counters::default();
        counters.load(&stats);
        assert_eq!(counters.to_stats(), stats);
        assert_eq!(counters.total(), 13);
    }
}
