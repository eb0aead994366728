//! Task state machine and status snapshot.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::message::Message;

/// State of a task as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    /// Accepted but not started.
    Submitted,
    /// Executing.
    Working,
    /// The agent needs more input from the user.
    InputRequired,
    /// Finished successfully.
    Completed,
    /// Cancelled by the user or the agent.
    Canceled,
    /// Finished with an error.
    Failed,
    /// Anything the backend reports that we do not recognise.
    #[serde(other)]
    Unknown,
}

impl TaskState {
    /// Wire spelling of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Working => "working",
            Self::InputRequired => "input-required",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    /// Returns true if the task will not change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Canceled | Self::Failed)
    }

    /// Returns true if the backend is still working on the task.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Submitted | Self::Working)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status snapshot of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,

    /// Present when the agent asks for input or explains a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,

    #[serde(
        default = "Utc::now",
        serialize_with = "serialize_timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    pub timestamp: DateTime<Utc>,
}

impl TaskStatus {
    /// Create a status stamped with the current time.
    pub fn new(state: TaskState) -> Self {
        Self {
            state,
            message: None,
            timestamp: Utc::now(),
        }
    }

    /// Builder method to attach a status message.
    pub fn with_message(mut self, message: Message) -> Self {
        self.message = Some(message);
        self
    }

    /// Text parts of the status message, in order.
    pub fn message_texts(&self) -> Vec<&str> {
        self.message
            .as_ref()
            .map(|m| m.texts().collect())
            .unwrap_or_default()
    }
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339())
}

// Agents commonly emit naive local ISO-8601 (no offset); those are taken as UTC.
fn deserialize_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(d)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp '{}': {}", raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_state_wire_names() {
        assert_eq!(
            serde_json::to_string(&TaskState::InputRequired).unwrap(),
            r#""input-required""#
        );
        let state: TaskState = serde_json::from_str(r#""completed""#).unwrap();
        assert_eq!(state, TaskState::Completed);
    }

    #[test]
    fn test_unrecognised_state_is_unknown() {
        let state: TaskState = serde_json::from_str(r#""rejected""#).unwrap();
        assert_eq!(state, TaskState::Unknown);
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::InputRequired.is_terminal());
        assert!(TaskState::Working.is_running());
    }

    #[test]
    fn test_naive_timestamp_is_utc() {
        let status: TaskStatus = serde_json::from_str(
            r#"{"state":"working","timestamp":"2025-04-10T08:30:15.123456"}"#,
        )
        .unwrap();
        assert_eq!(status.timestamp.year(), 2025);
        assert_eq!(status.timestamp.hour(), 8);
    }

    #[test]
    fn test_offset_timestamp_is_normalised() {
        let status: TaskStatus = serde_json::from_str(
            r#"{"state":"working","timestamp":"2025-04-10T10:30:15+02:00"}"#,
        )
        .unwrap();
        assert_eq!(status.timestamp.hour(), 8);
    }

    #[test]
    fn test_missing_timestamp_defaults() {
        let status: TaskStatus = serde_json::from_str(r#"{"state":"submitted"}"#).unwrap();
        assert_eq!(status.state, TaskState::Submitted);
        assert!(status.message.is_none());
    }

    #[test]
    fn test_garbage_timestamp_rejected() {
        let result = serde_json::from_str::<TaskStatus>(r#"{"state":"working","timestamp":"soon"}"#);
        assert!(result.is_err());
    }
}
