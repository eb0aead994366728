//! Per-user preference storage.
//!
//! Preferences live in a single `user_configs` table, one JSON object per
//! user. The bridge only reads and writes [`A2A_SERVER_URL_KEY`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use a2a_bridge_core::TenantId;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Preference key holding a user's custom A2A endpoint.
pub const A2A_SERVER_URL_KEY: &str = "a2a_server_url";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Preference store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid stored config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Key/value preferences keyed by user.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Look up `key` for `tenant`. `None` when the user or key is unknown.
    async fn get(&self, tenant: &TenantId, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key` for `tenant`, keeping other keys intact.
    async fn set(&self, tenant: &TenantId, key: &str, value: &str) -> Result<(), StoreError>;
}

/// SQLite-backed preference store.
///
/// Every call opens its own connection on the blocking pool, so a busy
/// database never stalls the async workers.
#[derive(Debug, Clone)]
pub struct SqlitePreferenceStore {
    db_path: PathBuf,
}

impl SqlitePreferenceStore {
    /// Open (or create) the database at `path` and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let connection = open_connection(&db_path)?;
        connection.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS user_configs (
                user_id TEXT PRIMARY KEY,
                config_data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;

        info!(path = %db_path.display(), "Preference store ready");
        Ok(Self { db_path })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Run `f` against a fresh connection on the blocking thread pool.
    async fn with_connection<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let connection = open_connection(&db_path)?;
            f(&connection)
        })
        .await?
    }
}

fn open_connection(path: &Path) -> Result<Connection, StoreError> {
    let connection = Connection::open(path)?;
    connection.busy_timeout(BUSY_TIMEOUT)?;
    Ok(connection)
}

fn load_config(
    connection: &Connection,
    tenant: &TenantId,
) -> Result<Option<Map<String, Value>>, StoreError> {
    let raw: Option<String> = connection
        .query_row(
            "SELECT config_data FROM user_configs WHERE user_id = ?1",
            params![tenant.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

#[async_trait]
impl PreferenceStore for SqlitePreferenceStore {
    async fn get(&self, tenant: &TenantId, key: &str) -> Result<Option<String>, StoreError> {
        let tenant = tenant.clone();
        let key = key.to_string();
        self.with_connection(move |connection| {
            let value = load_config(connection, &tenant)?
                .and_then(|config| config.get(&key).and_then(Value::as_str).map(str::to_owned));
            Ok(value)
        })
        .await
    }

    async fn set(&self, tenant: &TenantId, key: &str, value: &str) -> Result<(), StoreError> {
        let tenant = tenant.clone();
        let key = key.to_string();
        let value = value.to_string();
        self.with_connection(move |connection| {
            let mut config = load_config(connection, &tenant)?.unwrap_or_default();
            config.insert(key.clone(), Value::String(value));

            let now = Utc::now().to_rfc3339();
            connection.execute(
                r#"
                INSERT INTO user_configs (user_id, config_data, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?3)
                ON CONFLICT(user_id) DO UPDATE SET
                    config_data = excluded.config_data,
                    updated_at = excluded.updated_at
                "#,
                params![tenant.as_str(), serde_json::to_string(&config)?, now],
            )?;

            debug!(tenant = %tenant, key = %key, "Saved user preference");
            Ok(())
        })
        .await
    }
}

/// In-memory preference store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: RwLock<HashMap<TenantId, HashMap<String, String>>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn get(&self, tenant: &TenantId, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.read().await;
        Ok(values.get(tenant).and_then(|m| m.get(key)).cloned())
    }

    async fn set(&self, tenant: &TenantId, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.write().await;
        values
            .entry(tenant.clone())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
