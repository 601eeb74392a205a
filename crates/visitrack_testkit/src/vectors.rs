//! Wire test vectors for push payloads.
//!
//! Each vector is a raw JSON payload on a topic plus whether shape
//! validation must accept it. They are shared by the protocol, engine and
//! CLI tests.

use serde_json::{json, Value};
use visitrack_protocol::Topic;

/// A push payload with its expected validation verdict.
#[derive(Debug, Clone)]
pub struct PushVector {
    /// Unique identifier for this vector.
    pub id: &'static str,
    /// Topic the payload arrives on.
    pub topic: Topic,
    /// Raw payload.
    pub payload: Value,
    /// Whether shape validation accepts it.
    pub valid: bool,
}

fn record_json(id: &str, kind: &str, subject_id: &str) -> Value {
    json!({
        "id": id,
        "subjectKind": kind,
        "subjectId": subject_id,
        "displayName": "Ana Lopez",
        "accessPoints": [{"accessId": "lobby", "mode": "toggle"}],
        "status": "pending",
        "entryTimestamp": "2024-05-01T09:00:00Z",
        "createdAt": "2024-05-01T08:00:00Z",
        "lastModified": "2024-05-01T08:30:00Z",
        "active": true
    })
}

/// Push payload vectors, valid and malformed.
pub fn push_vectors() -> Vec<PushVector> {
    let record = record_json("r-1", "visitor", "vis-1");

    let mut exit_before_entry = record.clone();
    exit_before_entry["exitTimestamp"] = json!("2024-05-01T08:00:00Z");

    let mut blank_subject = record.clone();
    blank_subject["subjectId"] = json!(" ");

    let mut unknown_status = record.clone();
    unknown_status["status"] = json!("teleported");

    let event = json!({
        "recordId": "r-1",
        "subjectKind": "visitor",
        "subjectId": "vis-1",
        "eventKind": 6,
        "deviceKind": "panel",
        "actorId": "panel-1",
        "timestamp": "2024-05-01T09:30:00Z"
    });
    let mut foreign_event = event.clone();
    foreign_event["recordId"] = json!("r-2");

    vec![
        PushVector {
            id: "batch_single",
            topic: Topic::NewRecords,
            payload: json!([record.clone()]),
            valid: true,
        },
        PushVector {
            id: "batch_empty",
            topic: Topic::NewRecords,
            payload: json!([]),
            valid: true,
        },
        PushVector {
            id: "batch_not_array",
            topic: Topic::NewRecords,
            payload: record.clone(),
            valid: false,
        },
        PushVector {
            id: "batch_one_bad_record",
            topic: Topic::NewRecords,
            payload: json!([record.clone(), blank_subject.clone()]),
            valid: false,
        },
        PushVector {
            id: "update_employee",
            topic: Topic::RecordUpdated,
            payload: record_json("r-9", "employee", "emp-9"),
            valid: true,
        },
        PushVector {
            id: "update_exit_before_entry",
            topic: Topic::RecordUpdated,
            payload: exit_before_entry,
            valid: false,
        },
        PushVector {
            id: "update_unknown_status",
            topic: Topic::RecordUpdated,
            payload: unknown_status,
            valid: false,
        },
        PushVector {
            id: "update_null",
            topic: Topic::RecordUpdated,
            payload: Value::Null,
            valid: false,
        },
        PushVector {
            id: "access_exit",
            topic: Topic::AccessEvents,
            payload: json!({"event": event, "record": record.clone()}),
            valid: true,
        },
        PushVector {
            id: "access_foreign_record",
            topic: Topic::AccessEvents,
            payload: json!({"event": foreign_event, "record": record}),
            valid: false,
        },
        PushVector {
            id: "notify_ok",
            topic: Topic::NotifyMutation,
            payload: json!({"recordId": "r-1"}),
            valid: true,
        },
        PushVector {
            id: "notify_blank",
            topic: Topic::NotifyMutation,
            payload: json!({"recordId": ""}),
            valid: false,
        },
    ]
}
