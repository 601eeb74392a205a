//! Replay command implementation.
//!
//! Loads a query snapshot into a fresh engine, publishes a push-event log on
//! an in-process hub and prints the window and counters that result.

use super::{read_event_log, InputError, LoggedEvent};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::Date;
use tracing::debug;
use visitrack_engine::{
    AccessValidator, EngineConfig, EngineError, EngineResult, EventSource, PushChannel, PushHub,
    ReconciliationEngine,
};
use visitrack_protocol::{
    CancelOutcome, CancelRequest, GrantAccessRequest, MarkAccessRequest, QueryRequest,
    QueryResponse, QueryStats, SubjectKind, ValidateCodeRequest, ValidateCodeResponse,
    VisitRecord,
};

/// Engine settings for a replay.
#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Rows per page.
    pub page_size: u32,
    /// Day of interest.
    pub date: Option<Date>,
    /// Access point the view is restricted to.
    pub access_scope: Option<String>,
}

/// State of the view after a replay.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    /// Records on display.
    pub rows: Vec<VisitRecord>,
    /// Featured record.
    pub featured: Option<VisitRecord>,
    /// Total reported by the snapshot.
    pub total_count: u64,
    /// Live counters.
    pub stats: QueryStats,
    /// Push messages applied.
    pub processed: usize,
    /// Push messages refused by shape validation.
    pub malformed: usize,
    /// Log entries on topics the engine does not listen to.
    pub skipped: usize,
    /// In-scope records delivered by `new-records`.
    pub new_records: usize,
}

/// Serves one fixed query response; replays never mutate.
struct SnapshotSource {
    snapshot: QueryResponse,
}

impl EventSource for SnapshotSource {
    fn query(&self, _request: &QueryRequest) -> EngineResult<QueryResponse> {
        Ok(self.snapshot.clone())
    }

    fn grant_access(&self, _: &str, _: &GrantAccessRequest) -> EngineResult<VisitRecord> {
        Err(read_only())
    }

    fn mark_access(&self, _: &str, _: &MarkAccessRequest) -> EngineResult<VisitRecord> {
        Err(read_only())
    }

    fn cancel(&self, _: &str, _: &CancelRequest) -> EngineResult<CancelOutcome> {
        Err(read_only())
    }

    fn finalize(&self, _: &str) -> EngineResult<VisitRecord> {
        Err(read_only())
    }
}

impl AccessValidator for SnapshotSource {
    fn validate_code(&self, request: &ValidateCodeRequest) -> EngineResult<ValidateCodeResponse> {
        Err(EngineError::NotFound(format!("code {}", request.code)))
    }
}

fn read_only() -> EngineError {
    EngineError::Validation("replays are read-only".into())
}

/// Reads a query snapshot (a JSON `QueryResponse`).
pub fn read_snapshot(path: &Path) -> Result<QueryResponse, InputError> {
    let contents = fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| InputError::Json {
        path: path.to_path_buf(),
        line: source.line(),
        source,
    })
}

/// Replays `events` on top of `snapshot`.
pub fn replay(
    snapshot: QueryResponse,
    events: &[LoggedEvent],
    options: &ReplayOptions,
) -> EngineResult<ReplaySummary> {
    let mut config = EngineConfig::new(options.page_size);
    if let Some(date) = options.date {
        config = config.with_date(date);
    }
    if let Some(access_id) = &options.access_scope {
        config = config.with_access_scope(access_id.clone());
    }

    let hub = PushHub::new();
    let source = Arc::new(SnapshotSource { snapshot });
    let mut engine = ReconciliationEngine::mount(
        config,
        Arc::clone(&source),
        Arc::clone(&source),
        Arc::new(hub.clone()),
    )?;
    let load = engine.refresh()?;
    debug!("Loaded {} rows ({} invalid)", load.rows, load.invalid_rows);

    let mut delivered = 0;
    for event in events {
        if hub.publish(event.topic, &event.payload) == 0 {
            debug!("Line {}: nobody listens to {}", event.line, event.topic);
        } else {
            delivered += 1;
        }
    }
    let report = engine.pump()?;

    let summary = ReplaySummary {
        rows: engine.items().to_vec(),
        featured: engine.featured().cloned(),
        total_count: engine.window().total_count(),
        stats: engine.counters().to_stats(),
        processed: report.processed,
        malformed: report.malformed,
        skipped: events.len() - delivered,
        new_records: engine.new_records_notice(),
    };
    engine.dispose();
    Ok(summary)
}

/// Runs the replay command.
pub fn run(
    snapshot_path: &Path,
    events_path: Option<&Path>,
    options: &ReplayOptions,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = read_snapshot(snapshot_path)?;
    let events = match events_path {
        Some(path) => read_event_log(path)?,
        None => Vec::new(),
    };
    let summary = replay(snapshot, &events, options)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => print_text_output(&summary),
    }
    Ok(())
}

fn print_text_output(summary: &ReplaySummary) {
    println!(
        "Replayed {} push messages ({} malformed, {} skipped)",
        summary.processed, summary.malformed, summary.skipped
    );
    println!();

    println!(
        "Window: {} of {} records",
        summary.rows.len(),
        summary.total_count
    );
    for record in &summary.rows {
        println!(
            "  {:<12} {:<14} {:<9} {:<24} {}",
            record.id,
            record.status.to_string(),
            record.subject_kind.label(),
            record.display_name,
            timestamp(record)
        );
    }
    if let Some(featured) = &summary.featured {
        println!();
        println!(
            "Featured: {} ({}, {})",
            featured.id, featured.display_name, featured.status
        );
    }

    println!();
    println!("Counters:");
    for kind in SubjectKind::ALL {
        let (entries, exits) = summary.stats.tally(kind);
        println!(
            "  {:<9} entries: {:<5} exits: {}",
            kind.label(),
            entries,
            exits
        );
    }
    if summary.new_records > 0 {
        println!();
        println!("{} new records since the snapshot", summary.new_records);
    }
}

fn timestamp(record: &VisitRecord) -> String {
    record.last_modified.format(&Rfc3339).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use visitrack_protocol::{Topic, VisitStatus};
    use visitrack_testkit::{at, sample_day, RecordBuilder, Scratch};

    fn snapshot(rows: Vec<VisitRecord>) -> QueryResponse {
        let total = rows.len() as u64;
        QueryResponse::new(rows, total, QueryStats::default())
    }

    fn logged(line: usize, topic: Topic, payload: serde_json::Value) -> LoggedEvent {
        LoggedEvent {
            line,
            topic,
            payload,
        }
    }

    fn options(page_size: u32) -> ReplayOptions {
        ReplayOptions {
            page_size,
            ..ReplayOptions::default()
        }
    }

    #[test]
    fn snapshot_alone_is_the_window() {
        let summary = replay(snapshot(sample_day()), &[], &options(3)).unwrap();
        assert_eq!(summary.rows.len(), 3);
        assert_eq!(summary.total_count, 5);
        assert_eq!(summary.processed, 0);
    }

    #[test]
    fn updates_reorder_the_window() {
        let moved = RecordBuilder::visitor("v-ana")
            .display_name("Ana Lopez")
            .host("emp-host")
            .status(VisitStatus::EntryGranted)
            .modified(at(10, 0))
            .build();
        let events = vec![
            logged(1, Topic::RecordUpdated, serde_json::to_value(&moved).unwrap()),
            logged(2, Topic::RecordUpdated, json!({"id": ""})),
            logged(3, Topic::NotifyMutation, json!({"recordId": "v-ana"})),
        ];

        let summary = replay(snapshot(sample_day()), &events, &options(3)).unwrap();
        assert_eq!(summary.rows[0].id, "v-ana");
        assert_eq!(summary.rows[0].status, VisitStatus::EntryGranted);
        assert_eq!(summary.rows.len(), 3);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn scope_filters_new_records() {
        let batch = vec![
            RecordBuilder::visitor("r-1").build(),
            RecordBuilder::visitor("r-2").attended_point("lab").build(),
        ];
        let events = vec![logged(
            1,
            Topic::NewRecords,
            serde_json::to_value(&batch).unwrap(),
        )];
        let opts = ReplayOptions {
            access_scope: Some("lab".into()),
            ..options(10)
        };

        let summary = replay(snapshot(Vec::new()), &events, &opts).unwrap();
        assert_eq!(summary.new_records, 1);
        assert_eq!(summary.rows.len(), 1);
        assert_eq!(summary.rows[0].id, "r-2");
    }

    #[test]
    fn reads_snapshot_files() {
        let scratch = Scratch::new();
        let path = scratch
            .write_json("snapshot.json", &snapshot(sample_day()))
            .unwrap();
        let loaded = read_snapshot(&path).unwrap();
        assert_eq!(loaded.paginated_results.len(), 5);

        let broken = scratch.write_lines("broken.json", ["{\"paginatedResults\": ["]).unwrap();
        assert!(matches!(read_snapshot(&broken), Err(InputError::Json { .. })));
    }

    #[test]
    fn run_accepts_missing_event_log() {
        let scratch = Scratch::new();
        let path = scratch
            .write_json("snapshot.json", &snapshot(sample_day()))
            .unwrap();
        run(&path, None, &options(2), "json").unwrap();
    }
}
