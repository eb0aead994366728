//! Routes chat messages to agents and agent replies back to chat.
//!
//! Every accepted message is handled on its own task. A dispatch slot is
//! taken before the task is spawned, so at most `max_concurrent_dispatches`
//! tasks exist at once and a saturated bridge holds the callback until one
//! frees up. The callback is acknowledged before the task runs, and no
//! failure inside it reaches the chat transport: each one becomes a message
//! to the user.

use std::sync::Arc;
use std::time::Duration;

use a2a_bridge_client::{ClientError, TaskResponse};
use a2a_bridge_core::{SessionId, TaskId, TenantId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{is_http_url, BridgeConfig};
use crate::pool::{ClientPool, PoolError};
use crate::render::{RenderUnit, ResponseInterpreter};
use crate::sender::ChatSender;
use crate::session::SessionRegistry;

/// DingTalk conversation type of a one-to-one chat.
const ONE_TO_ONE: &str = "1";

pub const PROCESSING: &str = "Processing your request...";

const HELP_TEXT: &str = "Available commands:

/help - Show this help message
/server - Show the A2A server you are using
/setserver <url> - Use your own A2A server
/resetserver - Go back to the default A2A server

Example:
/setserver http://example.com:10003";

/// Robot callback payload. Only the fields the bridge reads are modelled.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    pub sender_staff_id: Option<String>,
    pub sender_nick: Option<String>,
    pub conversation_id: Option<String>,
    pub conversation_type: Option<String>,
    pub text: Option<TextContent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub content: String,
}

/// Acknowledgement returned to the chat platform for every callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub status: String,
    pub message: String,
}

impl Ack {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "OK".to_string(),
            message: message.into(),
        }
    }
}

/// A validated one-to-one text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub tenant: TenantId,
    pub sender_nick: String,
    pub conversation_id: String,
    pub text: String,
}

/// Why an inbound event was not dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotText,
    MissingFields,
    GroupChat,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotText => "ignore: not a text message",
            Self::MissingFields => "ignore: missing fields",
            Self::GroupChat => "ignore: only supporting 1-to-1 chat",
        }
    }
}

impl InboundEvent {
    /// Validate the event as a one-to-one text message.
    pub fn into_text_message(self) -> Result<TextMessage, Rejection> {
        let (Some(text), Some(sender)) = (self.text, self.sender_staff_id) else {
            return Err(Rejection::NotText);
        };

        let text = text.content.trim().to_string();
        let conversation_id = self.conversation_id.unwrap_or_default();
        if text.is_empty() || sender.is_empty() || conversation_id.is_empty() {
            return Err(Rejection::MissingFields);
        }

        if self.conversation_type.as_deref() != Some(ONE_TO_ONE) {
            return Err(Rejection::GroupChat);
        }

        Ok(TextMessage {
            tenant: TenantId::new(sender),
            sender_nick: self.sender_nick.unwrap_or_else(|| "unknown".to_string()),
            conversation_id,
            text,
        })
    }
}

/// Chat commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Server,
    SetServer(Option<String>),
    ResetServer,
    Unknown(String),
}

impl Command {
    /// Parse a command line. Returns `None` for text that is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if !text.starts_with('/') {
            return None;
        }

        let mut tokens = text.split_whitespace();
        let name = tokens.next()?.to_lowercase();
        let command = match name.as_str() {
            "/help" => Self::Help,
            "/server" => Self::Server,
            "/setserver" => Self::SetServer(tokens.next().map(str::to_string)),
            "/resetserver" => Self::ResetServer,
            _ => Self::Unknown(name),
        };
        Some(command)
    }
}

/// Failures while dispatching a content message.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl DispatchError {
    /// Message shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Client(ClientError::Transport(e)) => format!(
                "Error connecting to the A2A service (HTTP {}), please try again later.",
                e.status_code()
            ),
            Self::Client(ClientError::MalformedResponse(_)) => {
                "Could not parse the service response, please try again later.".to_string()
            }
            other => format!("Error while processing your message: {}", other),
        }
    }
}

/// Dispatch tuning.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub max_message_length: usize,
    pub send_interval: Duration,
    pub max_concurrent_dispatches: usize,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl From<&BridgeConfig> for BridgeSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            max_message_length: config.max_message_length,
            send_interval: Duration::from_millis(config.send_interval_ms),
            max_concurrent_dispatches: config.max_concurrent_dispatches,
        }
    }
}

pub struct Bridge {
    pool: Arc<ClientPool>,
    sender: Arc<dyn ChatSender>,
    sessions: SessionRegistry,
    interpreter: ResponseInterpreter,
    send_interval: Duration,
    permits: Arc<Semaphore>,
}

impl Bridge {
    pub fn new(
        pool: Arc<ClientPool>,
        sender: Arc<dyn ChatSender>,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            pool,
            sender,
            sessions: SessionRegistry::new(),
            interpreter: ResponseInterpreter::new(settings.max_message_length),
            send_interval: settings.send_interval,
            permits: Arc::new(Semaphore::new(settings.max_concurrent_dispatches.max(1))),
        }
    }

    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.pool
    }

    /// Classify a callback and start processing it in the background.
    pub async fn handle_event(self: &Arc<Self>, event: InboundEvent) -> Ack {
        match event.into_text_message() {
            Ok(message) => {
                info!(
                    tenant = %message.tenant,
                    nick = %message.sender_nick,
                    preview = %preview(&message.text),
                    "Received one-to-one message"
                );
                match self.spawn_dispatch(message).await {
                    Some(_) => Ack::ok("success (processing started)"),
                    None => Ack::ok("error during processing"),
                }
            }
            Err(rejection) => {
                debug!(reason = rejection.as_str(), "Ignored callback");
                Ack::ok(rejection.as_str())
            }
        }
    }

    /// Wait for a dispatch slot, then process `message` on its own task.
    ///
    /// The slot is held until the task finishes.
    pub async fn spawn_dispatch(self: &Arc<Self>, message: TextMessage) -> Option<JoinHandle<()>> {
        let permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(tenant = %message.tenant, "Dispatch semaphore closed, dropping message");
                return None;
            }
        };

        let bridge = Arc::clone(self);
        Some(tokio::spawn(async move {
            let _permit = permit;
            bridge.handle_text_message(&message.tenant, &message.text).await;
        }))
    }

    /// Handle one message from `tenant`: run a command or forward the text.
    pub async fn handle_text_message(&self, tenant: &TenantId, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            warn!(tenant = %tenant, "Ignored empty message");
            return;
        }

        match Command::parse(text) {
            Some(command) => self.handle_command(tenant, command).await,
            None => self.dispatch_content(tenant, text).await,
        }
    }

    async fn handle_command(&self, tenant: &TenantId, command: Command) {
        info!(tenant = %tenant, command = ?command, "Handling command");
        match command {
            Command::Help => self.send(tenant, HELP_TEXT).await,
            Command::Server => self.show_server(tenant).await,
            Command::SetServer(None) => {
                self.send(
                    tenant,
                    "Missing server URL. Usage:\n/setserver http://example.com:10003",
                )
                .await
            }
            Command::SetServer(Some(url)) => self.set_server(tenant, &url).await,
            Command::ResetServer => self.reset_server(tenant).await,
            Command::Unknown(name) => {
                self.send(
                    tenant,
                    &format!("Unknown command: {}\nUse /help to list the available commands.", name),
                )
                .await
            }
        }
    }

    async fn show_server(&self, tenant: &TenantId) {
        let endpoint = self.pool.effective_endpoint(tenant).await;
        let text = if endpoint == self.pool.default_endpoint() {
            format!("You are using the default A2A server:\n{}", endpoint)
        } else {
            format!("You are using your custom A2A server:\n{}", endpoint)
        };
        self.send(tenant, &text).await;
    }

    async fn set_server(&self, tenant: &TenantId, url: &str) {
        if !is_http_url(url) {
            self.send(
                tenant,
                "Invalid server URL. It must start with http:// or https://",
            )
            .await;
            return;
        }

        let text = match self.pool.switch_endpoint(tenant, url).await {
            Ok(true) => format!("Your A2A server is now:\n{}", url),
            Ok(false) => {
                "Server URL saved, but reconnecting failed. It will take effect on your next request."
                    .to_string()
            }
            Err(e) => {
                error!(tenant = %tenant, error = %e, "Failed to save server URL");
                "Failed to save the server URL, please try again later.".to_string()
            }
        };
        self.send(tenant, &text).await;
    }

    async fn reset_server(&self, tenant: &TenantId) {
        let default = self.pool.default_endpoint().to_string();
        let text = match self.pool.switch_endpoint(tenant, &default).await {
            Ok(true) => format!("Reset to the default A2A server:\n{}", default),
            Ok(false) => {
                "Reset to the default server, but reconnecting failed. It will take effect on your next request."
                    .to_string()
            }
            Err(e) => {
                error!(tenant = %tenant, error = %e, "Failed to reset server URL");
                "Failed to reset the server URL, please try again later.".to_string()
            }
        };
        self.send(tenant, &text).await;
    }

    async fn dispatch_content(&self, tenant: &TenantId, text: &str) {
        let session = self.sessions.get_or_create(tenant).await;
        self.send(tenant, PROCESSING).await;

        let units = match self.submit(tenant, &session, text).await {
            Ok(response) => {
                if let Some(e) = &response.error {
                    error!(tenant = %tenant, error = %e, "A2A service returned an error");
                }
                self.interpreter.render(&response)
            }
            Err(e) => {
                error!(tenant = %tenant, error = %e, "Dispatch failed");
                vec![RenderUnit::Text(e.user_message())]
            }
        };

        self.send_units(tenant, units).await;
    }

    async fn submit(
        &self,
        tenant: &TenantId,
        session: &SessionId,
        text: &str,
    ) -> Result<TaskResponse, DispatchError> {
        let client = self.pool.acquire(tenant).await?;
        let task_id = TaskId::generate();
        info!(tenant = %tenant, task_id = %task_id, session_id = %session, "Submitting task");
        Ok(client.submit_task(&task_id, session, text).await?)
    }

    async fn send_units(&self, tenant: &TenantId, units: Vec<RenderUnit>) {
        for (i, unit) in units.into_iter().enumerate() {
            if i > 0 && !self.send_interval.is_zero() {
                tokio::time::sleep(self.send_interval).await;
            }
            self.send(tenant, unit.as_str()).await;
        }
    }

    async fn send(&self, tenant: &TenantId, text: &str) {
        if let Err(e) = self.sender.send_text(tenant, text).await {
            error!(tenant = %tenant, error = %e, "Failed to send message");
        }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::testing::{responder, FakeFactory, Responder};
    use crate::sender::testing::RecordingSender;
    use crate::sender::SendError;
    use crate::store::{MemoryPreferenceStore, PreferenceStore, StoreError, A2A_SERVER_URL_KEY};
    use a2a_bridge_client::{TaskBackend, TransportError};
    use a2a_bridge_core::{Artifact, Message, Part, Task, TaskState, TaskStatus};
    use async_trait::async_trait;

    const DEFAULT: &str = "http://default:10003";

    struct Harness {
        bridge: Arc<Bridge>,
        factory: Arc<FakeFactory>,
        store: Arc<dyn PreferenceStore>,
        sender: Arc<RecordingSender>,
    }

    fn harness_with(factory: FakeFactory, store: Arc<dyn PreferenceStore>, sender: RecordingSender) -> Harness {
        let settings = BridgeSettings {
            send_interval: Duration::ZERO,
            ..BridgeSettings::default()
        };
        harness_with_settings(factory, store, sender, settings)
    }

    fn harness_with_settings(
        factory: FakeFactory,
        store: Arc<dyn PreferenceStore>,
        sender: RecordingSender,
        settings: BridgeSettings,
    ) -> Harness {
        let factory = Arc::new(factory);
        let sender = Arc::new(sender);
        let pool = Arc::new(ClientPool::new(factory.clone(), store.clone(), DEFAULT));
        let bridge = Arc::new(Bridge::new(pool, sender.clone(), settings));
        Harness {
            bridge,
            factory,
            store,
            sender,
        }
    }

    fn harness() -> Harness {
        harness_with(
            FakeFactory::new(),
            Arc::new(MemoryPreferenceStore::new()),
            RecordingSender::new(),
        )
    }

    fn responding(responder: Responder) -> Harness {
        harness_with(
            FakeFactory::with_responder(responder),
            Arc::new(MemoryPreferenceStore::new()),
            RecordingSender::new(),
        )
    }

    struct BrokenStore;

    #[async_trait]
    impl PreferenceStore for BrokenStore {
        async fn get(&self, _: &TenantId, _: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk gone")))
        }

        async fn set(&self, _: &TenantId, _: &str, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk gone")))
        }
    }

    /// Acknowledges writes of "http://a" late.
    #[derive(Default)]
    struct SlowAckStore {
        inner: MemoryPreferenceStore,
    }

    #[async_trait]
    impl PreferenceStore for SlowAckStore {
        async fn get(&self, tenant: &TenantId, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(tenant, key).await
        }

        async fn set(&self, tenant: &TenantId, key: &str, value: &str) -> Result<(), StoreError> {
            self.inner.set(tenant, key, value).await?;
            if value == "http://a" {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Ok(())
        }
    }

    /// Blocks every send until the test releases it.
    struct GatedSender {
        gate: Semaphore,
    }

    #[async_trait]
    impl ChatSender for GatedSender {
        async fn send_text(&self, _: &TenantId, _: &str) -> Result<(), SendError> {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            Ok(())
        }
    }

    fn text_message(text: &str) -> TextMessage {
        TextMessage {
            tenant: alice(),
            sender_nick: "Alice".to_string(),
            conversation_id: "cid".to_string(),
            text: text.to_string(),
        }
    }

    fn alice() -> TenantId {
        TenantId::new("alice")
    }

    fn event(conversation_type: &str, text: &str) -> InboundEvent {
        InboundEvent {
            sender_staff_id: Some("alice".to_string()),
            sender_nick: Some("Alice".to_string()),
            conversation_id: Some("cid-1".to_string()),
            conversation_type: Some(conversation_type.to_string()),
            text: Some(TextContent {
                content: text.to_string(),
            }),
        }
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::parse("hello"), None);
        assert_eq!(Command::parse("  /HELP  "), Some(Command::Help));
        assert_eq!(Command::parse("/server"), Some(Command::Server));
        assert_eq!(
            Command::parse("/setserver http://h:1 extra"),
            Some(Command::SetServer(Some("http://h:1".to_string())))
        );
        assert_eq!(Command::parse("/setserver"), Some(Command::SetServer(None)));
        assert_eq!(Command::parse("/resetserver"), Some(Command::ResetServer));
        assert_eq!(
            Command::parse("/Foo bar"),
            Some(Command::Unknown("/foo".to_string()))
        );
    }

    #[test]
    fn test_event_classification() {
        let message = event("1", "  hi  ").into_text_message().unwrap();
        assert_eq!(message.tenant, alice());
        assert_eq!(message.text, "hi");

        assert_eq!(event("2", "hi").into_text_message(), Err(Rejection::GroupChat));
        assert_eq!(event("1", "   ").into_text_message(), Err(Rejection::MissingFields));

        let mut no_conversation = event("1", "hi");
        no_conversation.conversation_id = None;
        assert_eq!(no_conversation.into_text_message(), Err(Rejection::MissingFields));

        let mut no_text = event("1", "hi");
        no_text.text = None;
        assert_eq!(no_text.into_text_message(), Err(Rejection::NotText));
    }

    #[tokio::test]
    async fn test_rejected_events_are_acked_without_work() {
        let h = harness();
        let ack = h.bridge.handle_event(event("2", "hi")).await;
        assert_eq!(ack, Ack::ok("ignore: only supporting 1-to-1 chat"));

        let ack = h.bridge.handle_event(InboundEvent::default()).await;
        assert_eq!(ack.message, "ignore: not a text message");

        tokio::task::yield_now().await;
        assert!(h.sender.texts().is_empty());
        assert_eq!(h.factory.created(), 0);
    }

    #[tokio::test]
    async fn test_accepted_event_is_processed_in_background() {
        let h = harness();
        let ack = h.bridge.handle_event(event("1", "hi")).await;
        assert_eq!(ack, Ack::ok("success (processing started)"));

        for _ in 0..100 {
            if h.sender.texts().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(h.sender.texts(), vec![PROCESSING.to_string(), "echo: hi".to_string()]);
        assert_eq!(h.sender.recipients(), vec![alice(), alice()]);
    }

    #[tokio::test]
    async fn test_content_round_trip() {
        let h = harness();
        h.bridge
            .spawn_dispatch(text_message("what is 2+2"))
            .await
            .unwrap()
            .await
            .unwrap();

        assert_eq!(
            h.sender.texts(),
            vec![PROCESSING.to_string(), "echo: what is 2+2".to_string()]
        );
        assert_eq!(
            *h.factory.client(0).submitted.lock().unwrap(),
            vec!["what is 2+2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_dispatch_waits_for_free_slot() {
        let store = Arc::new(MemoryPreferenceStore::new());
        let pool = Arc::new(ClientPool::new(Arc::new(FakeFactory::new()), store, DEFAULT));
        let sender = Arc::new(GatedSender {
            gate: Semaphore::new(0),
        });
        let settings = BridgeSettings {
            send_interval: Duration::ZERO,
            max_concurrent_dispatches: 1,
            ..BridgeSettings::default()
        };
        let bridge = Arc::new(Bridge::new(pool, sender.clone(), settings));

        let first = bridge.spawn_dispatch(text_message("one")).await.unwrap();
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), bridge.spawn_dispatch(text_message("two")))
                .await;
        assert!(blocked.is_err(), "second dispatch spawned while the slot was taken");

        sender.gate.add_permits(16);
        first.await.unwrap();
        let second = bridge.spawn_dispatch(text_message("two")).await.unwrap();
        second.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_split_reply_is_paced() {
        let h = harness_with_settings(
            FakeFactory::with_responder(responder(|task_id, _| {
                let task = Task::new(task_id.clone(), TaskState::Completed)
                    .with_artifact(Artifact::new(vec![Part::text("x".repeat(5000))]));
                Ok(TaskResponse::success("r".into(), task))
            })),
            Arc::new(MemoryPreferenceStore::new()),
            RecordingSender::new(),
            BridgeSettings {
                max_message_length: 2000,
                send_interval: Duration::from_millis(500),
                ..BridgeSettings::default()
            },
        );

        h.bridge.handle_text_message(&alice(), "long please").await;

        let texts = h.sender.texts();
        assert_eq!(texts.len(), 4);
        assert_eq!(texts[0], PROCESSING);
        for (i, text) in texts[1..].iter().enumerate() {
            assert!(text.starts_with(&format!("[{}/3]\n", i + 1)));
        }

        let sent_at = h.sender.sent_at();
        for pair in sent_at[1..].windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
    }

    #[tokio::test]
    async fn test_input_required_sends_single_prompt() {
        let h = responding(responder(|task_id, _| {
            let status = TaskStatus::new(TaskState::InputRequired)
                .with_message(Message::agent_text("more info?"));
            let task = Task::new(task_id.clone(), TaskState::InputRequired).with_status(status);
            Ok(TaskResponse::success("r".into(), task))
        }));

        h.bridge.handle_text_message(&alice(), "convert 10 USD").await;
        assert_eq!(
            h.sender.texts(),
            vec![PROCESSING.to_string(), "more info?".to_string()]
        );
    }

    #[tokio::test]
    async fn test_transport_error_reports_status() {
        let h = responding(responder(|_, _| {
            Err(ClientError::Transport(TransportError::Status {
                status: 503,
                body: "busy".to_string(),
            }))
        }));

        h.bridge.handle_text_message(&alice(), "hi").await;
        let texts = h.sender.texts();
        assert_eq!(texts.len(), 2);
        assert!(texts[1].contains("HTTP 503"), "got: {}", texts[1]);
    }

    #[tokio::test]
    async fn test_malformed_response_message() {
        let h = responding(responder(|_, _| {
            Err(ClientError::MalformedResponse("expected value".to_string()))
        }));

        h.bridge.handle_text_message(&alice(), "hi").await;
        assert_eq!(
            h.sender.texts()[1],
            "Could not parse the service response, please try again later."
        );
    }

    #[tokio::test]
    async fn test_send_failures_do_not_stop_dispatch() {
        let h = harness_with(
            FakeFactory::new(),
            Arc::new(MemoryPreferenceStore::new()),
            RecordingSender::failing(),
        );

        h.bridge.handle_text_message(&alice(), "hi").await;
        assert_eq!(h.sender.texts().len(), 2);
        assert_eq!(h.factory.created(), 1);
    }

    #[tokio::test]
    async fn test_setserver_rejects_non_http_scheme() {
        let h = harness();
        h.bridge.handle_text_message(&alice(), "/setserver ftp://x").await;

        assert_eq!(
            h.sender.texts(),
            vec!["Invalid server URL. It must start with http:// or https://".to_string()]
        );
        assert_eq!(h.store.get(&alice(), A2A_SERVER_URL_KEY).await.unwrap(), None);
        assert_eq!(h.factory.created(), 0);
        assert!(h.bridge.pool().is_empty().await);
    }

    #[tokio::test]
    async fn test_setserver_persists_and_replaces_client() {
        let h = harness();
        let old = h.bridge.pool().acquire(&alice()).await.unwrap();

        h.bridge.handle_text_message(&alice(), "/setserver http://h:1").await;

        assert_eq!(
            h.store.get(&alice(), A2A_SERVER_URL_KEY).await.unwrap().as_deref(),
            Some("http://h:1")
        );
        assert!(old.is_closed().await);
        assert_eq!(
            h.bridge.pool().endpoint_of(&alice()).await.as_deref(),
            Some("http://h:1")
        );
        assert_eq!(h.sender.texts(), vec!["Your A2A server is now:\nhttp://h:1".to_string()]);
    }

    #[tokio::test]
    async fn test_setserver_saved_but_reconnect_failed() {
        let h = harness();
        h.bridge
            .handle_text_message(&alice(), "/setserver http://unreachable:1")
            .await;

        assert_eq!(
            h.store.get(&alice(), A2A_SERVER_URL_KEY).await.unwrap().as_deref(),
            Some("http://unreachable:1")
        );
        assert!(h.sender.texts()[0].starts_with("Server URL saved, but reconnecting failed"));
    }

    #[tokio::test]
    async fn test_setserver_persistence_failure_leaves_pool_alone() {
        let h = harness_with(FakeFactory::new(), Arc::new(BrokenStore), RecordingSender::new());
        h.bridge.handle_text_message(&alice(), "/setserver http://h:1").await;

        assert_eq!(
            h.sender.texts(),
            vec!["Failed to save the server URL, please try again later.".to_string()]
        );
        assert_eq!(h.factory.created(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_setserver_apply_in_order() {
        let h = harness_with(
            FakeFactory::new(),
            Arc::new(SlowAckStore::default()),
            RecordingSender::new(),
        );

        let first = tokio::spawn({
            let bridge = h.bridge.clone();
            async move { bridge.handle_text_message(&alice(), "/setserver http://a").await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = tokio::spawn({
            let bridge = h.bridge.clone();
            async move { bridge.handle_text_message(&alice(), "/setserver http://b").await }
        });
        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(
            h.store.get(&alice(), A2A_SERVER_URL_KEY).await.unwrap().as_deref(),
            Some("http://b")
        );
        assert_eq!(
            h.bridge.pool().endpoint_of(&alice()).await.as_deref(),
            Some("http://b")
        );
        assert!(h.factory.client(0).is_closed().await);
        assert_eq!(
            h.sender.texts(),
            vec![
                "Your A2A server is now:\nhttp://a".to_string(),
                "Your A2A server is now:\nhttp://b".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_store_read_failure_falls_back_to_default() {
        let h = harness_with(FakeFactory::new(), Arc::new(BrokenStore), RecordingSender::new());
        let client = h.bridge.pool().acquire(&alice()).await.unwrap();
        assert_eq!(client.endpoint(), DEFAULT);
    }

    #[tokio::test]
    async fn test_server_and_resetserver() {
        let h = harness();

        h.bridge.handle_text_message(&alice(), "/server").await;
        h.bridge.handle_text_message(&alice(), "/setserver https://mine").await;
        h.bridge.handle_text_message(&alice(), "/server").await;
        h.bridge.handle_text_message(&alice(), "/resetserver").await;
        h.bridge.handle_text_message(&alice(), "/server").await;

        let texts = h.sender.texts();
        assert_eq!(texts[0], format!("You are using the default A2A server:\n{}", DEFAULT));
        assert_eq!(texts[2], "You are using your custom A2A server:\nhttps://mine");
        assert_eq!(texts[3], format!("Reset to the default A2A server:\n{}", DEFAULT));
        assert_eq!(texts[4], format!("You are using the default A2A server:\n{}", DEFAULT));
        assert_eq!(
            h.bridge.pool().endpoint_of(&alice()).await.as_deref(),
            Some(DEFAULT)
        );
    }

    #[tokio::test]
    async fn test_help_missing_arg_and_unknown_command() {
        let h = harness();
        h.bridge.handle_text_message(&alice(), "/help").await;
        h.bridge.handle_text_message(&alice(), "/setserver").await;
        h.bridge.handle_text_message(&alice(), "/weather tomorrow").await;
        h.bridge.handle_text_message(&alice(), "   ").await;

        let texts = h.sender.texts();
        assert_eq!(texts.len(), 3);
        assert!(texts[0].contains("/setserver <url>"));
        assert!(texts[1].starts_with("Missing server URL"));
        assert!(texts[2].contains("/weather"));
        assert!(texts[2].contains("/help"));
        assert_eq!(h.factory.created(), 0);
    }

    #[test]
    fn test_dispatch_error_messages() {
        let err = DispatchError::Client(ClientError::Transport(TransportError::DeadlineExceeded(
            Duration::from_secs(120),
        )));
        assert!(err.user_message().contains("HTTP 408"));

        let err = DispatchError::Pool(PoolError::Construction {
            endpoint: "x".to_string(),
            source: ClientError::InvalidEndpoint {
                endpoint: "x".to_string(),
                reason: "relative URL without a base".to_string(),
            },
        });
        assert!(err.user_message().starts_with("Error while processing your message:"));
    }
}
