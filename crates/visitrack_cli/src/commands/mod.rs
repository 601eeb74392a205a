//! CLI command implementations.

pub mod check_events;
pub mod replay;

use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use visitrack_protocol::Topic;

/// Errors reading input files.
#[derive(Error, Debug)]
pub enum InputError {
    /// The file could not be read.
    #[error("cannot read {path:?}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A line or document is not valid JSON.
    #[error("{path:?} line {line}: {source}")]
    Json {
        /// File path.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// The topic name is not one of the push topics.
    #[error("{path:?} line {line}: unknown topic {topic:?}")]
    UnknownTopic {
        /// File path.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// Topic as written.
        topic: String,
    },
}

#[derive(Deserialize)]
struct RawLine {
    topic: String,
    payload: Value,
}

/// One entry of a push-event log.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedEvent {
    /// 1-based line number in the log.
    pub line: usize,
    /// Topic the payload was published on.
    pub topic: Topic,
    /// Raw payload.
    pub payload: Value,
}

/// Reads a push-event log: one `{"topic": ..., "payload": ...}` object per
/// line. Blank lines and lines starting with `#` are skipped.
pub fn read_event_log(path: &Path) -> Result<Vec<LoggedEvent>, InputError> {
    let contents = fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut events = Vec::new();
    for (index, text) in contents.lines().enumerate() {
        let line = index + 1;
        let text = text.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let raw: RawLine = serde_json::from_str(text).map_err(|source| InputError::Json {
            path: path.to_path_buf(),
            line,
            source,
        })?;
        let topic = raw
            .topic
            .parse::<Topic>()
            .map_err(|_| InputError::UnknownTopic {
                path: path.to_path_buf(),
                line,
                topic: raw.topic.clone(),
            })?;
        events.push(LoggedEvent {
            line,
            topic,
            payload: raw.payload,
        });
    }
    Ok(events)
}
