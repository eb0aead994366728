//! A2A agent client for the bridge.
//!
//! This crate speaks the JSON-RPC 2.0 task protocol of an A2A agent over
//! HTTP. It supports exactly two methods, `tasks/send` and `tasks/get`, plus
//! a liveness probe against the agent card.
//!
//! # Example
//!
//! ```rust,no_run
//! use a2a_bridge_client::{A2aClient, TaskBackend};
//! use a2a_bridge_core::{SessionId, TaskId};
//!
//! async fn ask() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = A2aClient::new("http://localhost:10003")?;
//!
//!     let response = client
//!         .submit_task(&TaskId::generate(), &SessionId::generate(), "What is 2 + 2?")
//!         .await?;
//!
//!     if let Some(task) = response.result {
//!         println!("Task state: {}", task.state());
//!     }
//!     client.close().await;
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod protocol;

pub use client::{A2aClient, ClientOptions, TaskBackend};
pub use error::{ClientError, TransportError};
pub use protocol::{
    AgentCard, JsonRpcError, JsonRpcRequest, JsonRpcResponse, Method, RequestId, TaskQueryParams,
    TaskResponse, TaskSendParams, JSONRPC_VERSION,
};
