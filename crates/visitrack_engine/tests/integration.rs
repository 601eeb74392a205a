//! Integration tests for engines sharing one push hub.

use proptest::prelude::*;
use serde_json::Value;
use std::sync::Arc;
use visitrack_engine::{
    EngineConfig, EventSource, MockEventSource, PushChannel, PushHub, ReconciliationEngine,
    StaticValidator,
};
use visitrack_protocol::{
    AccessActivity, EventKind, QueryResponse, QueryStats, SortDirection, SortField, SortSpec,
    SubjectKind, Topic, VisitRecord, VisitStatus,
};
use visitrack_testkit::{
    access_event, at, push_vectors, records_strategy, PropTestConfig, RecordBuilder,
};

type Engine = ReconciliationEngine<MockEventSource, StaticValidator>;

fn mount(hub: &PushHub, source: &Arc<MockEventSource>, config: EngineConfig) -> Engine {
    ReconciliationEngine::mount(
        config,
        Arc::clone(source),
        Arc::new(StaticValidator::new()),
        Arc::new(hub.clone()),
    )
    .unwrap()
}

fn page(rows: Vec<VisitRecord>, stats: QueryStats) -> QueryResponse {
    let total = rows.len() as u64;
    QueryResponse::new(rows, total, stats)
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap()
}

#[test]
fn views_apply_their_own_scope() {
    let hub = PushHub::new();
    let source = Arc::new(MockEventSource::new());
    source.set_query_response(page(Vec::new(), QueryStats::default()));

    let mut all = mount(&hub, &source, EngineConfig::default());
    let mut lab = mount(&hub, &source, EngineConfig::default().with_access_scope("lab"));
    all.refresh().unwrap();
    lab.refresh().unwrap();

    let batch = vec![
        RecordBuilder::visitor("r-1").build(),
        RecordBuilder::visitor("r-2").attended_point("lab").build(),
    ];
    hub.publish(Topic::NewRecords, &to_value(&batch));

    assert_eq!(all.pump().unwrap().merged.inserted, 2);
    let report = lab.pump().unwrap();
    assert_eq!(report.merged.inserted, 1);
    assert_eq!(report.merged.dropped, 1);
    assert_eq!(lab.items()[0].id, "r-2");
}

#[test]
fn counters_follow_access_events() {
    let hub = PushHub::new();
    let source = Arc::new(MockEventSource::new());
    let mut stats = QueryStats::default();
    stats.set_tally(SubjectKind::Visitor, 2, 0);
    let inside = RecordBuilder::visitor("r-1")
        .status(VisitStatus::EntryGranted)
        .build();
    source.set_query_response(page(vec![inside.clone()], stats));

    let mut engine = mount(&hub, &source, EngineConfig::default());
    engine.refresh().unwrap();

    let mut record = inside;
    for (minute, status, kind) in [
        (10, VisitStatus::ExitGranted, EventKind::ExitGranted),
        (11, VisitStatus::ExitGranted, EventKind::ExitGranted),
    ] {
        record.status = status;
        record.last_modified = at(9, minute);
        let activity = AccessActivity {
            event: access_event(&record, kind, at(9, minute)),
            record: record.clone(),
        };
        hub.publish(Topic::AccessEvents, &to_value(&activity));
    }
    engine.pump().unwrap();

    let tally = engine.counters().tally(SubjectKind::Visitor);
    assert_eq!((tally.entries, tally.exits), (0, 2));
}

#[test]
fn redelivered_event_counts_once() {
    let hub = PushHub::new();
    let source = Arc::new(MockEventSource::new());
    source.set_query_response(page(Vec::new(), QueryStats::default()));
    let mut engine = mount(&hub, &source, EngineConfig::default());
    engine.refresh().unwrap();

    let record = RecordBuilder::employee("e-1", "emp-1")
        .status(VisitStatus::EntryGranted)
        .build();
    let activity = AccessActivity {
        event: access_event(&record, EventKind::EntryGranted, at(9, 30)),
        record,
    };
    hub.publish(Topic::AccessEvents, &to_value(&activity));
    hub.publish(Topic::AccessEvents, &to_value(&activity));

    let report = engine.pump().unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.counted_events, 1);
    assert_eq!(engine.counters().tally(SubjectKind::Employee).entries, 1);
    assert_eq!(engine.items().len(), 1);
}

#[test]
fn published_vectors_are_classified() {
    let hub = PushHub::new();
    let source = Arc::new(MockEventSource::new());
    let mut engine = mount(&hub, &source, EngineConfig::default());

    let vectors: Vec<_> = push_vectors()
        .into_iter()
        .filter(|vector| vector.topic != Topic::NotifyMutation)
        .collect();
    for vector in &vectors {
        hub.publish(vector.topic, &vector.payload);
    }

    let report = engine.pump().unwrap();
    let invalid = vectors.iter().filter(|vector| !vector.valid).count();
    assert_eq!(report.processed, vectors.len());
    assert_eq!(report.malformed, invalid);
    engine.window().check_invariants().unwrap();
}

#[test]
fn remount_after_dispose() {
    let hub = PushHub::new();
    let source = Arc::new(MockEventSource::new());

    let mut first = mount(&hub, &source, EngineConfig::default());
    first.dispose();
    let mut second = mount(&hub, &source, EngineConfig::default());

    hub.publish(
        Topic::RecordUpdated,
        &to_value(&RecordBuilder::visitor("r-1").build()),
    );
    assert!(first.pump().is_err());
    assert_eq!(second.pump().unwrap().processed, 1);
}

#[test]
fn sort_change_reorders_after_reload() {
    let hub = PushHub::new();
    let source = Arc::new(MockEventSource::new());
    let rows = vec![
        RecordBuilder::visitor("a").modified(at(10, 0)).build(),
        RecordBuilder::visitor("b").modified(at(9, 0)).build(),
    ];
    source.set_query_response(page(rows, QueryStats::default()));

    let mut engine = mount(&hub, &source, EngineConfig::new(2));
    engine.refresh().unwrap();
    assert_eq!(engine.items()[0].id, "a");

    let ticket = engine
        .set_sort(SortField::LastModified, SortDirection::Asc)
        .unwrap();
    assert_eq!(
        ticket.request.primary_sort(),
        SortSpec::new(SortField::LastModified, SortDirection::Asc)
    );
    let response = source.query(&ticket.request);
    engine.complete_load(&ticket, response).unwrap();
    assert_eq!(engine.items()[0].id, "b");
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn push_stream_keeps_window_valid(
        initial in records_strategy(6),
        updates in records_strategy(20),
        page_size in 1u32..5,
    ) {
        let hub = PushHub::new();
        let source = Arc::new(MockEventSource::new());
        let rows: Vec<_> = initial.into_iter().take(page_size as usize).collect();
        source.set_query_response(page(rows, QueryStats::default()));

        let mut engine = mount(&hub, &source, EngineConfig::new(page_size));
        engine.refresh().unwrap();

        for (i, record) in updates.iter().enumerate() {
            if i % 3 == 0 {
                hub.publish(Topic::NewRecords, &to_value(&vec![record.clone()]));
            } else {
                hub.publish(Topic::RecordUpdated, &to_value(record));
            }
        }
        engine.pump().unwrap();

        prop_assert!(engine.items().len() <= page_size as usize);
        prop_assert!(engine.window().check_invariants().is_ok());
    }
}
