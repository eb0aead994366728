//! JSON-RPC envelopes and method parameters for the A2A task protocol.
//!
//! Pure data: nothing in this module performs I/O.

use std::fmt;

use a2a_bridge_core::{Message, Metadata, SessionId, SessionRef, Task, TaskId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ClientError;

/// Protocol version tag carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Correlation identifier of a JSON-RPC call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl RequestId {
    /// Generate a random identifier (UUID v4, simple hex form).
    pub fn generate() -> Self {
        Self::String(Uuid::new_v4().simple().to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

/// The two supported RPC methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "tasks/send")]
    SendTask,
    #[serde(rename = "tasks/get")]
    GetTask,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendTask => "tasks/send",
            Self::GetTask => "tasks/get",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest<P> {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: Method,
    pub params: P,
}

impl<P> JsonRpcRequest<P> {
    fn new(method: Method, params: P) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: RequestId::generate(),
            method,
            params,
        }
    }

    /// Replace the generated correlation identifier.
    pub fn with_id(mut self, id: impl Into<RequestId>) -> Self {
        self.id = id.into();
        self
    }
}

impl JsonRpcRequest<TaskSendParams> {
    /// Build a `tasks/send` request.
    pub fn send_task(params: TaskSendParams) -> Self {
        Self::new(Method::SendTask, params)
    }
}

impl JsonRpcRequest<TaskQueryParams> {
    /// Build a `tasks/get` request.
    pub fn get_task(params: TaskQueryParams) -> Self {
        Self::new(Method::GetTask, params)
    }
}

/// Parameters of `tasks/send`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSendParams {
    pub id: TaskId,
    pub session: SessionRef,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl TaskSendParams {
    /// Params for submitting a single user message.
    pub fn new(task_id: TaskId, session_id: SessionId, message: Message) -> Self {
        Self {
            id: task_id,
            session: SessionRef::new(session_id),
            messages: vec![message],
            history_length: None,
            metadata: None,
        }
    }
}

/// Parameters of `tasks/get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQueryParams {
    pub id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl TaskQueryParams {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            id: task_id,
            history_length: None,
            metadata: None,
        }
    }

    /// Builder method to request message history.
    pub fn with_history_length(mut self, length: u32) -> Self {
        self.history_length = Some(length);
        self
    }
}

/// Error object of a failed call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse<R> {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    // `default` would require `R: Default`; a missing field is still `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<R>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

impl<R: DeserializeOwned> JsonRpcResponse<R> {
    /// Decode a response body, mapping any JSON or schema failure to
    /// [`ClientError::MalformedResponse`].
    pub fn decode(body: &[u8]) -> Result<Self, ClientError> {
        serde_json::from_slice(body).map_err(|e| ClientError::MalformedResponse(e.to_string()))
    }
}

impl<R> JsonRpcResponse<R> {
    /// Successful response carrying `result`.
    pub fn success(id: RequestId, result: R) -> Self {
        Self {
            jsonrpc: default_version(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Failed response carrying an error object.
    pub fn failure(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Response to either task method.
pub type TaskResponse = JsonRpcResponse<Task>;

/// Agent metadata served at `/.well-known/agent.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}
