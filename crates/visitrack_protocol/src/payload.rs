//! Shape validation for untyped push payloads.
//!
//! Push messages arrive as loose JSON. Everything that reaches the engine
//! goes through [`decode_push`] first, which either produces a typed
//! [`ValidEvent`] or a [`MalformedEvent`] describing why it was refused.

use crate::error::{ProtocolError, ProtocolResult};
use crate::event::AccessEvent;
use crate::messages::{NotifyMutation, Topic};
use crate::record::VisitRecord;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An access event together with the record state it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessActivity {
    /// The event.
    pub event: AccessEvent,
    /// The record after the event.
    pub record: VisitRecord,
}

/// A push payload that passed shape validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidEvent {
    /// `new-records`.
    CreateBatch(Vec<VisitRecord>),
    /// `record-updated`.
    Update(VisitRecord),
    /// `access-events`.
    Access(AccessActivity),
    /// `notify-mutation`.
    Notify(NotifyMutation),
}

impl ValidEvent {
    /// Topic this event was decoded from.
    pub fn topic(&self) -> Topic {
        match self {
            ValidEvent::CreateBatch(_) => Topic::NewRecords,
            ValidEvent::Update(_) => Topic::RecordUpdated,
            ValidEvent::Access(_) => Topic::AccessEvents,
            ValidEvent::Notify(_) => Topic::NotifyMutation,
        }
    }
}

/// A push payload that failed shape validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedEvent {
    /// Topic it arrived on.
    pub topic: Topic,
    /// Why it was refused.
    pub reason: String,
}

/// Outcome of decoding a push payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// Typed, validated event.
    Valid(ValidEvent),
    /// Refused payload.
    Malformed(MalformedEvent),
}

impl PushEvent {
    /// Returns true if the payload was refused.
    pub fn is_malformed(&self) -> bool {
        matches!(self, PushEvent::Malformed(_))
    }
}

/// Decodes and validates a raw payload received on `topic`.
pub fn decode_push(topic: Topic, raw: &Value) -> PushEvent {
    match decode_valid(topic, raw) {
        Ok(event) => PushEvent::Valid(event),
        Err(err) => PushEvent::Malformed(MalformedEvent {
            topic,
            reason: err.to_string(),
        }),
    }
}

fn decode_valid(topic: Topic, raw: &Value) -> ProtocolResult<ValidEvent> {
    match topic {
        Topic::NewRecords => {
            if !raw.is_array() {
                return Err(ProtocolError::invalid("expected an array of records"));
            }
            let records: Vec<VisitRecord> = parse(raw)?;
            for record in &records {
                record.validate()?;
            }
            Ok(ValidEvent::CreateBatch(records))
        }
        Topic::RecordUpdated => {
            let record: VisitRecord = parse(raw)?;
            record.validate()?;
            Ok(ValidEvent::Update(record))
        }
        Topic::AccessEvents => {
            let activity: AccessActivity = parse(raw)?;
            activity.record.validate()?;
            if activity.event.record_id != activity.record.id {
                return Err(ProtocolError::Inconsistent {
                    id: activity.record.id.clone(),
                    reason: format!(
                        "event refers to record {}",
                        activity.event.record_id
                    ),
                });
            }
            if activity.event.identity_key() != activity.record.identity_key() {
                return Err(ProtocolError::Inconsistent {
                    id: activity.record.id.clone(),
                    reason: "event subject does not match record subject".into(),
                });
            }
            Ok(ValidEvent::Access(activity))
        }
        Topic::NotifyMutation => {
            let notify: NotifyMutation = parse(raw)?;
            if notify.record_id.trim().is_empty() {
                return Err(ProtocolError::MissingField("recordId"));
            }
            Ok(ValidEvent::Notify(notify))
        }
    }
}

fn parse<T: DeserializeOwned>(raw: &Value) -> ProtocolResult<T> {
    T::deserialize(raw).map_err(|e| ProtocolError::invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_json(id: &str, kind: &str, subject: &str) -> Value {
        json!({
            "id": id,
            "subjectKind": kind,
            "subjectId": subject,
            "displayName": "Ana",
            "accessPoints": [{"accessId": "lobby", "mode": "toggle"}],
            "status": "pending",
            "entryTimestamp": "2024-05-01T09:00:00Z",
            "createdAt": "2024-05-01T08:00:00Z",
            "lastModified": "2024-05-01T08:00:00Z",
            "active": true
        })
    }

    #[test]
    fn valid_batch() {
        let raw = json!([record_json("r-1", "visitor", "v-1"), record_json("r-2", "employee", "e-1")]);
        match decode_push(Topic::NewRecords, &raw) {
            PushEvent::Valid(ValidEvent::CreateBatch(records)) => assert_eq!(records.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn batch_must_be_array() {
        let raw = record_json("r-1", "visitor", "v-1");
        assert!(decode_push(Topic::NewRecords, &raw).is_malformed());
    }

    #[test]
    fn one_bad_record_refuses_the_batch() {
        let raw = json!([record_json("r-1", "visitor", "v-1"), record_json("", "visitor", "v-2")]);
        match decode_push(Topic::NewRecords, &raw) {
            PushEvent::Malformed(m) => {
                assert_eq!(m.topic, Topic::NewRecords);
                assert!(m.reason.contains("id"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn update_with_wrong_types_is_malformed() {
        let mut raw = record_json("r-1", "visitor", "v-1");
        raw["lastModified"] = json!(12345);
        assert!(decode_push(Topic::RecordUpdated, &raw).is_malformed());

        let raw = json!({"id": "r-1"});
        assert!(decode_push(Topic::RecordUpdated, &raw).is_malformed());

        assert!(decode_push(Topic::RecordUpdated, &Value::Null).is_malformed());
    }

    #[test]
    fn unknown_subject_kind_is_malformed() {
        let raw = record_json("r-1", "robot", "v-1");
        assert!(decode_push(Topic::RecordUpdated, &raw).is_malformed());
    }

    #[test]
    fn access_activity_must_match_record() {
        let event = json!({
            "recordId": "r-9",
            "subjectKind": "visitor",
            "subjectId": "v-1",
            "eventKind": 5,
            "deviceKind": "panel",
            "actorId": "panel-1",
            "timestamp": "2024-05-01T09:05:00Z"
        });
        let raw = json!({"event": event, "record": record_json("r-1", "visitor", "v-1")});
        assert!(decode_push(Topic::AccessEvents, &raw).is_malformed());

        let mut fixed = raw.clone();
        fixed["event"]["recordId"] = json!("r-1");
        match decode_push(Topic::AccessEvents, &fixed) {
            PushEvent::Valid(event) => assert_eq!(event.topic(), Topic::AccessEvents),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn notify_requires_record_id() {
        assert!(decode_push(Topic::NotifyMutation, &json!({"recordId": " "})).is_malformed());
        assert!(!decode_push(Topic::NotifyMutation, &json!({"recordId": "r-1"})).is_malformed());
    }
}
