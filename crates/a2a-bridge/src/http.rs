//! HTTP ingress for robot callbacks.
//!
//! - `POST /dingtalk/callback` accepts a robot message and acknowledges it
//! - `GET /health` reports liveness

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::bridge::{Ack, Bridge, InboundEvent};

/// Create the HTTP router.
pub fn create_router(bridge: Arc<Bridge>) -> Router {
    Router::new()
        .route("/dingtalk/callback", post(dingtalk_callback))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(bridge)
}

/// Always answers 200 with an [`Ack`]; a bad payload is acknowledged, not
/// rejected, so the platform does not redeliver it.
async fn dingtalk_callback(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Json<Ack> {
    match serde_json::from_slice::<InboundEvent>(&body) {
        Ok(event) => Json(bridge.handle_event(event).await),
        Err(e) => {
            warn!(error = %e, "Unreadable callback payload");
            Json(Ack::ok("error during processing"))
        }
    }
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::bridge::BridgeSettings;
    use crate::pool::testing::FakeFactory;
    use crate::pool::ClientPool;
    use crate::sender::testing::RecordingSender;
    use crate::store::MemoryPreferenceStore;

    fn router() -> Router {
        let store = Arc::new(MemoryPreferenceStore::new());
        let pool = Arc::new(ClientPool::new(
            Arc::new(FakeFactory::new()),
            store,
            "http://default:10003",
        ));
        let bridge = Bridge::new(pool, Arc::new(RecordingSender::new()), BridgeSettings::default());
        create_router(Arc::new(bridge))
    }

    async fn post_callback(body: String) -> (StatusCode, Value) {
        let response = router()
            .oneshot(
                Request::post("/dingtalk/callback")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let response = router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_callback_acks() {
        let one_to_one = json!({
            "senderStaffId": "alice",
            "senderNick": "Alice",
            "conversationId": "cid-1",
            "conversationType": "1",
            "text": {"content": "hello"},
            "msgtype": "text"
        });
        let (status, ack) = post_callback(one_to_one.to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack, json!({"status": "OK", "message": "success (processing started)"}));

        let group = json!({
            "senderStaffId": "alice",
            "conversationId": "cid-2",
            "conversationType": "2",
            "text": {"content": "hello"}
        });
        let (_, ack) = post_callback(group.to_string()).await;
        assert_eq!(ack["message"], "ignore: only supporting 1-to-1 chat");

        let missing = json!({
            "senderStaffId": "alice",
            "conversationType": "1",
            "text": {"content": "hello"}
        });
        let (_, ack) = post_callback(missing.to_string()).await;
        assert_eq!(ack["message"], "ignore: missing fields");

        let (status, ack) = post_callback("not json".to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["message"], "error during processing");
    }
}
