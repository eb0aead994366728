//! Task and Artifact types.

use serde::{Deserialize, Serialize};

use crate::message::{Message, Metadata, Part};
use crate::status::{TaskState, TaskStatus};
use crate::{SessionId, TaskId};

/// Reference to the session a task belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRef {
    pub id: SessionId,
}

impl SessionRef {
    pub fn new(id: SessionId) -> Self {
        Self { id }
    }
}

/// Output produced by the agent for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub parts: Vec<Part>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    #[serde(default)]
    pub index: u32,

    /// Streaming hint; the bridge renders artifacts as delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub append: Option<bool>,

    /// Streaming hint; the bridge renders artifacts as delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_chunk: Option<bool>,
}

impl Artifact {
    /// Create an unnamed artifact at index 0.
    pub fn new(parts: Vec<Part>) -> Self {
        Self {
            name: None,
            description: None,
            parts,
            metadata: None,
            index: 0,
            append: None,
            last_chunk: None,
        }
    }

    /// Builder method to set the artifact name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder method to set the artifact index.
    pub fn with_index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }
}

/// A unit of work submitted to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Caller-assigned task identifier.
    pub id: TaskId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionRef>,

    pub status: TaskStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<Artifact>>,

    /// Message history, when requested via `historyLength`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Task {
    /// Create a task in the given state with no output.
    pub fn new(id: TaskId, state: TaskState) -> Self {
        Self {
            id,
            session: None,
            status: TaskStatus::new(state),
            artifacts: None,
            messages: None,
            metadata: None,
        }
    }

    /// Builder method to bind the task to a session.
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session = Some(SessionRef::new(session_id));
        self
    }

    /// Builder method to replace the status.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder method to append an artifact.
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.get_or_insert_with(Vec::new).push(artifact);
        self
    }

    /// Current state.
    pub fn state(&self) -> TaskState {
        self.status.state
    }

    /// Artifacts in delivery order; empty when the agent sent none.
    pub fn artifacts(&self) -> &[Artifact] {
        self.artifacts.as_deref().unwrap_or(&[])
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileContent, Role};
    use serde_json::{json, Map};

    fn sample_task() -> Task {
        let mut data = Map::new();
        data.insert("rows".to_string(), json!([1, 2, 3]));
        let file = FileContent::from_uri(
            Some("out.csv".to_string()),
            Some("text/csv".to_string()),
            "https://files/out.csv".to_string(),
        )
        .unwrap();

        let mut artifact = Artifact::new(vec![Part::text("hello"), Part::data(data), Part::file(file)])
            .with_name("answer")
            .with_index(2);
        artifact.last_chunk = Some(true);

        Task::new(TaskId::new("t-1"), TaskState::Completed)
            .with_session(SessionId::new("s-1"))
            .with_status(
                TaskStatus::new(TaskState::Completed).with_message(Message::agent_text("done")),
            )
            .with_artifact(artifact)
    }

    #[test]
    fn test_task_round_trip() {
        let task = sample_task();
        let json = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn test_absent_fields_are_omitted() {
        let task = Task::new(TaskId::new("t-2"), TaskState::Working);
        let value = serde_json::to_value(&task).unwrap();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("session"));
        assert!(!obj.contains_key("artifacts"));
        assert!(!obj.contains_key("messages"));
        assert!(!obj.contains_key("metadata"));
        assert!(!obj["status"].as_object().unwrap().contains_key("message"));
    }

    #[test]
    fn test_artifact_camel_case_fields() {
        let raw = json!({"parts": [{"type": "text", "text": "x"}], "lastChunk": true});
        let artifact: Artifact = serde_json::from_value(raw).unwrap();
        assert_eq!(artifact.last_chunk, Some(true));
        assert_eq!(artifact.index, 0);
    }

    #[test]
    fn test_decode_backend_task() {
        let raw = json!({
            "id": "t-9",
            "session": {"id": "s-9"},
            "status": {
                "state": "input-required",
                "message": {"role": "agent", "parts": [{"type": "text", "text": "which city?"}]},
                "timestamp": "2025-04-10T08:30:15.123456"
            }
        });
        let task: Task = serde_json::from_value(raw).unwrap();
        assert_eq!(task.state(), TaskState::InputRequired);
        assert_eq!(task.status.message.as_ref().unwrap().role, Role::Agent);
        assert!(task.artifacts().is_empty());
        assert!(!task.is_terminal());
    }
}
