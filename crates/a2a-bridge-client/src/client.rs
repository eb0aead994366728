//! HTTP client bound to one A2A agent endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use a2a_bridge_core::{Message, SessionId, TaskId};

use crate::error::{ClientError, TransportError};
use crate::protocol::{AgentCard, JsonRpcRequest, TaskQueryParams, TaskResponse, TaskSendParams};

/// Operations the bridge needs from an agent backend.
///
/// `A2aClient` is the production implementation; the trait lets the pool and
/// the orchestrator run against in-process doubles.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// Base URL this backend is bound to.
    fn endpoint(&self) -> &str;

    /// Submit one user text message as a new task.
    async fn submit_task(
        &self,
        task_id: &TaskId,
        session_id: &SessionId,
        user_text: &str,
    ) -> Result<TaskResponse, ClientError>;

    /// Fetch the current state of a task.
    async fn get_task(
        &self,
        task_id: &TaskId,
        history_length: Option<u32>,
    ) -> Result<TaskResponse, ClientError>;

    /// Best-effort liveness probe. Never fails.
    async fn check_health(&self) -> bool;

    /// Release the connection context. Idempotent.
    async fn close(&self);

    /// Returns true once `close` has been called.
    async fn is_closed(&self) -> bool;
}

/// Timeouts applied by [`A2aClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Deadline for `tasks/send` and `tasks/get`; agents may take a while.
    pub request_timeout: Duration,

    /// Deadline for the agent card probe.
    pub health_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(120),
            health_timeout: Duration::from_secs(10),
        }
    }
}

/// JSON-RPC client for a single agent endpoint.
#[derive(Debug)]
pub struct A2aClient {
    endpoint: String,
    options: ClientOptions,
    /// `None` once closed. Calls clone the inner client up front, so a close
    /// never interrupts a call already in flight.
    http: RwLock<Option<reqwest::Client>>,
}

impl A2aClient {
    /// Create a client with default timeouts.
    pub fn new(endpoint: &str) -> Result<Self, ClientError> {
        Self::with_options(endpoint, ClientOptions::default())
    }

    /// Create a client with explicit timeouts.
    pub fn with_options(endpoint: &str, options: ClientOptions) -> Result<Self, ClientError> {
        let endpoint = endpoint.trim().trim_end_matches('/').to_string();
        let invalid = |reason: String| ClientError::InvalidEndpoint {
            endpoint: endpoint.clone(),
            reason,
        };

        let url = Url::parse(&endpoint).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| invalid(e.to_string()))?;

        debug!(endpoint = %endpoint, "Created A2A client");

        Ok(Self {
            endpoint,
            options,
            http: RwLock::new(Some(http)),
        })
    }

    async fn http(&self) -> Result<reqwest::Client, TransportError> {
        self.http
            .read()
            .await
            .clone()
            .ok_or_else(|| TransportError::Closed(self.endpoint.clone()))
    }

    /// POST a JSON-RPC request to the endpoint and decode the task response.
    async fn call<P: Serialize + Sync>(
        &self,
        request: &JsonRpcRequest<P>,
    ) -> Result<TaskResponse, ClientError> {
        let timeout = self.options.request_timeout;
        debug!(
            endpoint = %self.endpoint,
            method = %request.method,
            request_id = %request.id,
            "Sending A2A request"
        );

        let http = self.http().await?;
        let response = http
            .post(&self.endpoint)
            .json(request)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                let err = TransportError::from_reqwest(e, timeout);
                error!(endpoint = %self.endpoint, error = %err, "A2A request failed");
                err
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                endpoint = %self.endpoint,
                status = status.as_u16(),
                body = %body,
                "A2A request returned error status"
            );
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout))?;

        let decoded = TaskResponse::decode(&body).map_err(|e| {
            error!(endpoint = %self.endpoint, error = %e, "Failed to decode A2A response");
            e
        })?;

        let preview: String = String::from_utf8_lossy(&body).chars().take(500).collect();
        debug!(request_id = %request.id, preview = %preview, "A2A response");

        Ok(decoded)
    }
}

#[async_trait]
impl TaskBackend for A2aClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn submit_task(
        &self,
        task_id: &TaskId,
        session_id: &SessionId,
        user_text: &str,
    ) -> Result<TaskResponse, ClientError> {
        let params = TaskSendParams::new(
            task_id.clone(),
            session_id.clone(),
            Message::user_text(user_text),
        );
        let response = self.call(&JsonRpcRequest::send_task(params)).await?;
        info!(
            task_id = %task_id,
            response_id = ?response.id,
            "A2A service returned response"
        );
        Ok(response)
    }

    async fn get_task(
        &self,
        task_id: &TaskId,
        history_length: Option<u32>,
    ) -> Result<TaskResponse, ClientError> {
        let mut params = TaskQueryParams::new(task_id.clone());
        params.history_length = history_length;
        self.call(&JsonRpcRequest::get_task(params)).await
    }

    async fn check_health(&self) -> bool {
        let url = format!("{}/.well-known/agent.json", self.endpoint);
        let http = match self.http().await {
            Ok(http) => http,
            Err(e) => {
                warn!(url = %url, error = %e, "Health check skipped");
                return false;
            }
        };

        let response = match http
            .get(&url)
            .timeout(self.options.health_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let err = TransportError::from_reqwest(e, self.options.health_timeout);
                warn!(url = %url, error = %err, "Health check failed");
                return false;
            }
        };

        if response.status() != StatusCode::OK {
            warn!(url = %url, status = response.status().as_u16(), "Health check failed");
            return false;
        }

        match response.json::<AgentCard>().await {
            Ok(card) => {
                debug!(agent = %card.name, "Fetched agent card");
                true
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Agent card could not be parsed");
                false
            }
        }
    }

    async fn close(&self) {
        if self.http.write().await.take().is_some() {
            debug!(endpoint = %self.endpoint, "Closed A2A client");
        }
    }

    async fn is_closed(&self) -> bool {
        self.http.read().await.is_none()
    }
}
