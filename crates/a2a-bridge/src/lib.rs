//! a2a-bridge library
//!
//! Connects DingTalk one-to-one robot chats to A2A agent backends: inbound
//! callbacks are classified, commands manage each user's endpoint preference,
//! and everything else is submitted as a task whose response is rendered back
//! into chat messages.

pub mod bridge;
pub mod config;
pub mod http;
pub mod logging;
pub mod pool;
pub mod render;
pub mod sender;
pub mod session;
pub mod store;

pub use bridge::{Ack, Bridge, BridgeSettings, Command, InboundEvent};
pub use config::{Config, ConfigError, LoggingConfig};
pub use pool::{spawn_sweeper, A2aClientFactory, BackendFactory, ClientPool, PoolError};
pub use render::{RenderUnit, ResponseInterpreter};
pub use sender::{ChatSender, DingTalkSender, SendError};
pub use store::{MemoryPreferenceStore, PreferenceStore, SqlitePreferenceStore, StoreError};
