//! Per-user A2A client pool.
//!
//! Each user gets one client bound to their effective endpoint (their stored
//! preference, else the configured default). Clients idle for longer than the
//! inactivity threshold are closed by a background sweeper and rebuilt on the
//! next message.
//!
//! The map lock is only held to find, insert or drop a slot. Everything that
//! touches an entry holds that slot's mutex, so acquire, replace and sweep
//! are serialized per user while different users proceed in parallel.
//! Switching endpoints writes the preference under the same slot lock, so the
//! stored endpoint and the live client never disagree.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use a2a_bridge_client::{A2aClient, ClientError, ClientOptions, TaskBackend};
use a2a_bridge_core::TenantId;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::store::{PreferenceStore, StoreError, A2A_SERVER_URL_KEY};

/// Pool errors.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to create client for {endpoint}: {source}")]
    Construction {
        endpoint: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to save endpoint preference: {0}")]
    Store(#[from] StoreError),

    #[error("client pool is shut down")]
    Closed,
}

/// Builds backend clients for an endpoint.
pub trait BackendFactory: Send + Sync {
    fn create(&self, endpoint: &str) -> Result<Arc<dyn TaskBackend>, PoolError>;
}

/// Factory producing real HTTP clients.
#[derive(Debug, Clone, Default)]
pub struct A2aClientFactory {
    options: ClientOptions,
}

impl A2aClientFactory {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }
}

impl BackendFactory for A2aClientFactory {
    fn create(&self, endpoint: &str) -> Result<Arc<dyn TaskBackend>, PoolError> {
        let client = A2aClient::with_options(endpoint, self.options.clone()).map_err(|source| {
            PoolError::Construction {
                endpoint: endpoint.to_string(),
                source,
            }
        })?;
        Ok(Arc::new(client))
    }
}

struct Entry {
    client: Arc<dyn TaskBackend>,
    endpoint: String,
    last_active: Instant,
}

impl Entry {
    fn new(client: Arc<dyn TaskBackend>, endpoint: String) -> Self {
        Self {
            client,
            endpoint,
            last_active: Instant::now(),
        }
    }
}

type Slot = Arc<Mutex<Option<Entry>>>;

/// Owns every live backend client, keyed by user.
pub struct ClientPool {
    slots: RwLock<HashMap<TenantId, Slot>>,
    factory: Arc<dyn BackendFactory>,
    store: Arc<dyn PreferenceStore>,
    default_endpoint: String,
    closed: AtomicBool,
}

impl ClientPool {
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        store: Arc<dyn PreferenceStore>,
        default_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            factory,
            store,
            default_endpoint: default_endpoint.into(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn default_endpoint(&self) -> &str {
        &self.default_endpoint
    }

    async fn slot(&self, tenant: &TenantId) -> Slot {
        if let Some(slot) = self.slots.read().await.get(tenant) {
            return slot.clone();
        }
        self.slots
            .write()
            .await
            .entry(tenant.clone())
            .or_default()
            .clone()
    }

    /// The endpoint a new client for `tenant` should use.
    ///
    /// Falls back to the default when the user has no preference or the
    /// store cannot be read.
    pub async fn effective_endpoint(&self, tenant: &TenantId) -> String {
        match self.store.get(tenant, A2A_SERVER_URL_KEY).await {
            Ok(Some(url)) => url,
            Ok(None) => self.default_endpoint.clone(),
            Err(e) => {
                warn!(tenant = %tenant, error = %e, "Failed to read endpoint preference, using default");
                self.default_endpoint.clone()
            }
        }
    }

    /// Return the user's client, creating it on first use or after eviction.
    pub async fn acquire(&self, tenant: &TenantId) -> Result<Arc<dyn TaskBackend>, PoolError> {
        let slot = self.slot(tenant).await;
        let mut guard = slot.lock().await;
        if self.is_shut_down() {
            return Err(PoolError::Closed);
        }

        if let Some(entry) = guard.as_mut() {
            if !entry.client.is_closed().await {
                entry.last_active = Instant::now();
                return Ok(entry.client.clone());
            }
            debug!(tenant = %tenant, "Pooled client was closed, rebuilding");
        }

        let endpoint = self.effective_endpoint(tenant).await;
        let client = self.factory.create(&endpoint)?;
        info!(tenant = %tenant, endpoint = %endpoint, "Created client");

        *guard = Some(Entry::new(client.clone(), endpoint));
        Ok(client)
    }

    /// Swap the user's client for one bound to `endpoint`.
    ///
    /// Returns false, leaving any existing client in place, if the new client
    /// cannot be built.
    pub async fn replace_endpoint(&self, tenant: &TenantId, endpoint: &str) -> bool {
        let slot = self.slot(tenant).await;
        let previous = {
            let mut guard = slot.lock().await;
            if self.is_shut_down() {
                return false;
            }
            let client = match self.factory.create(endpoint) {
                Ok(client) => client,
                Err(e) => {
                    warn!(tenant = %tenant, error = %e, "Failed to switch endpoint");
                    return false;
                }
            };
            guard.replace(Entry::new(client, endpoint.to_string()))
        };

        if let Some(previous) = previous {
            previous.client.close().await;
            debug!(tenant = %tenant, old = %previous.endpoint, "Closed replaced client");
        }
        info!(tenant = %tenant, endpoint = %endpoint, "Switched endpoint");
        true
    }

    /// Save `endpoint` as the user's preference and rebind their client to it.
    ///
    /// Both happen under the user's slot lock, so concurrent switches for the
    /// same user apply in order. Returns false when the preference was saved
    /// but the client could not be built; the old client is retired anyway so
    /// the next acquire follows the saved preference.
    pub async fn switch_endpoint(&self, tenant: &TenantId, endpoint: &str) -> Result<bool, PoolError> {
        let slot = self.slot(tenant).await;
        let (previous, switched) = {
            let mut guard = slot.lock().await;
            if self.is_shut_down() {
                return Err(PoolError::Closed);
            }
            self.store.set(tenant, A2A_SERVER_URL_KEY, endpoint).await?;

            match self.factory.create(endpoint) {
                Ok(client) => (guard.replace(Entry::new(client, endpoint.to_string())), true),
                Err(e) => {
                    warn!(tenant = %tenant, error = %e, "Saved endpoint but failed to build client");
                    (guard.take(), false)
                }
            }
        };

        if let Some(previous) = previous {
            previous.client.close().await;
            debug!(tenant = %tenant, old = %previous.endpoint, "Closed replaced client");
        }
        if switched {
            info!(tenant = %tenant, endpoint = %endpoint, "Switched endpoint");
        }
        Ok(switched)
    }

    /// Close and evict clients idle for longer than `threshold`.
    ///
    /// Returns the number of clients evicted.
    pub async fn sweep_idle(&self, threshold: Duration) -> usize {
        let slots: Vec<(TenantId, Slot)> = self
            .slots
            .read()
            .await
            .iter()
            .map(|(tenant, slot)| (tenant.clone(), slot.clone()))
            .collect();

        let mut evicted = 0;
        for (tenant, slot) in slots {
            let stale = {
                let mut guard = slot.lock().await;
                match guard.as_ref() {
                    Some(entry) if entry.last_active.elapsed() > threshold => guard.take(),
                    _ => None,
                }
            };

            if let Some(entry) = stale {
                entry.client.close().await;
                evicted += 1;
                info!(tenant = %tenant, endpoint = %entry.endpoint, "Evicted idle client");
            }
        }

        self.drop_empty_slots().await;
        evicted
    }

    /// Remove slots with no entry that nobody else is holding.
    async fn drop_empty_slots(&self) {
        let mut slots = self.slots.write().await;
        slots.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(guard) => guard.is_some(),
                Err(_) => true,
            }
        });
    }

    fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close every client. Used at shutdown.
    ///
    /// Later acquires fail with [`PoolError::Closed`] instead of building a
    /// client nobody would close.
    pub async fn close_all(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        let slots: Vec<Slot> = self.slots.write().await.drain().map(|(_, s)| s).collect();
        let mut closed = 0;
        for slot in slots {
            if let Some(entry) = slot.lock().await.take() {
                entry.client.close().await;
                closed += 1;
            }
        }
        info!(closed, "Closed all clients");
        closed
    }

    /// Number of live clients.
    pub async fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.read().await.values().cloned().collect();
        let mut live = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                live += 1;
            }
        }
        live
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Endpoint of the user's live client, if there is one.
    pub async fn endpoint_of(&self, tenant: &TenantId) -> Option<String> {
        let slot = self.slots.read().await.get(tenant).cloned()?;
        let guard = slot.lock().await;
        guard.as_ref().map(|entry| entry.endpoint.clone())
    }
}

/// Run [`ClientPool::sweep_idle`] every `interval` until aborted.
pub fn spawn_sweeper(pool: Arc<ClientPool>, interval: Duration, threshold: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately.
        ticker.tick().await;
        info!(?interval, ?threshold, "Idle client sweeper started");

        loop {
            ticker.tick().await;
            let evicted = pool.sweep_idle(threshold).await;
            if evicted > 0 {
                let remaining = pool.len().await;
                info!(evicted, remaining, "Idle sweep finished");
            } else {
                debug!("Idle sweep found nothing to evict");
            }
        }
    })
}
