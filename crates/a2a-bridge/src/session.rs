//! Conversation sessions, one per user for the lifetime of the process.

use std::collections::HashMap;

use a2a_bridge_core::{SessionId, TenantId};
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<TenantId, SessionId>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The user's session, created on first call.
    pub async fn get_or_create(&self, tenant: &TenantId) -> SessionId {
        if let Some(session) = self.sessions.read().await.get(tenant) {
            return session.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(tenant.clone())
            .or_insert_with(|| {
                let session = SessionId::generate();
                info!(tenant = %tenant, session_id = %session, "Created session");
                session
            })
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
