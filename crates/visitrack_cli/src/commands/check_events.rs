//! Check-events command implementation.

use super::{read_event_log, LoggedEvent};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use visitrack_protocol::{decode_push, PushEvent};

/// A payload refused by shape validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    /// 1-based line number in the log.
    pub line: usize,
    /// Topic name.
    pub topic: String,
    /// Why it was refused.
    pub reason: String,
}

/// Check result.
#[derive(Debug, Default, Serialize)]
pub struct CheckResult {
    /// Payloads checked.
    pub checked: usize,
    /// Payloads accepted.
    pub valid: usize,
    /// Accepted payloads per topic.
    pub per_topic: BTreeMap<String, usize>,
    /// Refused payloads.
    pub rejections: Vec<Rejection>,
}

impl CheckResult {
    /// Returns true if nothing was refused.
    pub fn is_ok(&self) -> bool {
        self.rejections.is_empty()
    }
}

/// Validates every payload of a log.
pub fn check(events: &[LoggedEvent]) -> CheckResult {
    let mut result = CheckResult::default();
    for event in events {
        result.checked += 1;
        match decode_push(event.topic, &event.payload) {
            PushEvent::Valid(_) => {
                result.valid += 1;
                *result
                    .per_topic
                    .entry(event.topic.as_str().to_string())
                    .or_default() += 1;
            }
            PushEvent::Malformed(malformed) => result.rejections.push(Rejection {
                line: event.line,
                topic: malformed.topic.as_str().to_string(),
                reason: malformed.reason,
            }),
        }
    }
    result
}

/// Runs the check-events command.
pub fn run(events_path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let events = read_event_log(events_path)?;
    let result = check(&events);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(events_path, &result),
    }

    if result.is_ok() {
        Ok(())
    } else {
        Err(format!("{} malformed payloads", result.rejections.len()).into())
    }
}

fn print_text_output(path: &Path, result: &CheckResult) {
    println!("Checking push log {:?}", path);
    println!();
    println!("  Payloads checked: {}", result.checked);
    println!("  Valid:            {}", result.valid);
    for (topic, count) in &result.per_topic {
        println!("    {:<16} {}", topic, count);
    }
    println!("  Malformed:        {}", result.rejections.len());
    for rejection in &result.rejections {
        println!(
            "    line {}: {}: {}",
            rejection.line, rejection.topic, rejection.reason
        );
    }
    println!();
    if result.is_ok() {
        println!("✓ Push log is well-formed");
    } else {
        println!("✗ Push log has malformed payloads");
    }
}
