//! A2A Bridge Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Database
//! - Runtime specifics
//!
//! The task/message/artifact model mirrors the A2A agent protocol as spoken
//! by the backend; identifiers are newtypes so tenants, tasks and sessions
//! cannot be mixed up.

pub mod error;
pub mod ids;
pub mod message;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use error::CoreError;
pub use ids::{SessionId, TaskId, TenantId};
pub use message::{FileContent, Message, Metadata, Part, Role};
pub use status::{TaskState, TaskStatus};
pub use task::{Artifact, SessionRef, Task};
