//! Outbound chat messages.

use std::time::Duration;

use a2a_bridge_core::TenantId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::config::DingTalkConfig;

/// Tokens are refreshed this long before DingTalk says they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Outbound send errors.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("failed to obtain access token: {0}")]
    Auth(String),

    #[error("chat API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for SendError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Delivers text to a single chat user.
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_text(&self, tenant: &TenantId, text: &str) -> Result<(), SendError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessTokenRequest<'a> {
    app_key: &'a str,
    app_secret: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessTokenResponse {
    access_token: String,
    /// Lifetime in seconds.
    expire_in: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchSendRequest<'a> {
    robot_code: &'a str,
    user_ids: [&'a str; 1],
    msg_key: &'static str,
    msg_param: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Sends one-to-one robot messages through the DingTalk open API.
#[derive(Debug)]
pub struct DingTalkSender {
    api_base: String,
    app_key: String,
    app_secret: String,
    robot_code: String,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl DingTalkSender {
    pub fn new(config: &DingTalkConfig) -> Result<Self, SendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            app_key: config.client_id.clone(),
            app_secret: config.client_secret.clone(),
            robot_code: config.robot_code.clone(),
            http,
            token: Mutex::new(None),
        })
    }

    /// Return a valid access token, fetching a new one when the cached one
    /// is missing or close to expiry.
    async fn access_token(&self) -> Result<String, SendError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let url = format!("{}/v1.0/oauth2/accessToken", self.api_base);
        let response = self
            .http
            .post(&url)
            .json(&AccessTokenRequest {
                app_key: &self.app_key,
                app_secret: &self.app_secret,
            })
            .send()
            .await
            .map_err(|e| SendError::Auth(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Auth(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let token: AccessTokenResponse = response
            .json()
            .await
            .map_err(|e| SendError::Auth(e.to_string()))?;

        let lifetime = Duration::from_secs(token.expire_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        info!(expires_in = token.expire_in, "Obtained DingTalk access token");

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }
}

#[async_trait]
impl ChatSender for DingTalkSender {
    async fn send_text(&self, tenant: &TenantId, text: &str) -> Result<(), SendError> {
        let token = self.access_token().await?;
        let url = format!("{}/v1.0/robot/oToMessages/batchSend", self.api_base);
        let body = BatchSendRequest {
            robot_code: &self.robot_code,
            user_ids: [tenant.as_str()],
            msg_key: "sampleText",
            msg_param: json!({ "content": text }).to_string(),
        };

        let response = self
            .http
            .post(&url)
            .header("x-acs-dingtalk-access-token", token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(tenant = %tenant, status = status.as_u16(), "DingTalk send failed");
            return Err(SendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(tenant = %tenant, chars = text.chars().count(), "Sent message");
        Ok(())
    }
}
