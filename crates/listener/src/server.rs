//! HTTP surface: the webhook route, the health route, and their wiring.

use std::collections::HashSet;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use tracing::{info, warn};

use pipeline::{DeliveryId, WebhookEnqueuer, WebhookEnvelope};

use crate::signature::verify_signature;

const DELIVERY_HEADER: &str = "x-github-delivery";
const EVENT_HEADER: &str = "x-github-event";
const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Shared state behind the webhook route.
#[derive(Clone)]
pub struct ListenerState {
    secret: Arc<str>,
    allowed_events: Arc<HashSet<String>>,
    enqueuer: Arc<dyn WebhookEnqueuer>,
}

impl ListenerState {
    /// Creates the state from the shared secret, the event whitelist, and
    /// the transport's producing side.
    pub fn new(
        secret: impl Into<Arc<str>>,
        allowed_events: impl IntoIterator<Item = String>,
        enqueuer: Arc<dyn WebhookEnqueuer>,
    ) -> Self {
        Self {
            secret: secret.into(),
            allowed_events: Arc::new(allowed_events.into_iter().collect()),
            enqueuer,
        }
    }
}

/// Builds the ingress router.
pub fn router(state: ListenerState) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Binds `addr` and serves the router until the process exits.
///
/// # Errors
///
/// I/O errors from binding or serving.
pub async fn serve(addr: &str, state: ListenerState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "webhook listener started");
    axum::serve(listener, router(state)).await
}

async fn handle_health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

async fn handle_webhook(
    State(state): State<ListenerState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    // Authenticate before reading anything else from the request.
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    if !verify_signature(&body, signature, &state.secret) {
        warn!("webhook signature invalid or missing");
        return (StatusCode::UNAUTHORIZED, "invalid signature");
    }

    let Some(delivery_id) = headers
        .get(DELIVERY_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(DeliveryId::new)
    else {
        warn!("webhook missing delivery id header");
        return (StatusCode::BAD_REQUEST, "missing delivery id");
    };

    let event_type = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !state.allowed_events.contains(event_type) {
        // Acknowledged, deliberately not enqueued.
        info!(delivery = %delivery_id, event_type, "ignoring event type");
        return (StatusCode::OK, "ignored");
    }

    let envelope = WebhookEnvelope::new(delivery_id, event_type, body.to_vec());
    match state.enqueuer.enqueue(&envelope).await {
        Ok(task) => {
            info!(delivery = %envelope.delivery_id, task = %task, "queued webhook");
            (StatusCode::OK, "queued")
        }
        Err(err) => {
            // GitHub redelivers on 5xx; that redelivery is the only recovery
            // path for a failed enqueue.
            warn!(delivery = %envelope.delivery_id, error = %err, "failed to enqueue webhook");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to queue")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use pipeline::{PortError, TaskId};
    use tower::ServiceExt;

    use super::*;
    use crate::signature::compute_signature;

    const SECRET: &str = "webhook-secret";

    #[derive(Default)]
    struct RecordingEnqueuer {
        envelopes: Mutex<Vec<WebhookEnvelope>>,
        fail: bool,
    }

    #[async_trait]
    impl WebhookEnqueuer for RecordingEnqueuer {
        async fn enqueue(&self, envelope: &WebhookEnvelope) -> Result<TaskId, PortError> {
            if self.fail {
                return Err("broker down".into());
            }
            self.envelopes.lock().unwrap().push(envelope.clone());
            Ok(TaskId::new_random())
        }
    }

    fn test_router(enqueuer: Arc<RecordingEnqueuer>) -> Router {
        router(ListenerState::new(
            SECRET,
            ["issues".to_string()],
            enqueuer,
        ))
    }

    fn webhook_request(
        body: &str,
        signature: Option<String>,
        delivery: Option<&str>,
        event: &str,
    ) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/webhook")
            .header(EVENT_HEADER, event);
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        if let Some(delivery) = delivery {
            builder = builder.header(DELIVERY_HEADER, delivery);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn valid_signature(body: &str) -> Option<String> {
        Some(format!("sha256={}", compute_signature(SECRET, body.as_bytes())))
    }

    #[tokio::test]
    async fn accepted_request_enqueues_exactly_once() {
        let enqueuer = Arc::new(RecordingEnqueuer::default());
        let app = test_router(enqueuer.clone());

        let body = r#"{"action":"opened"}"#;
        let response = app
            .oneshot(webhook_request(
                body,
                valid_signature(body),
                Some("d-1"),
                "issues",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let envelopes = enqueuer.envelopes.lock().unwrap();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].delivery_id.as_str(), "d-1");
        assert_eq!(envelopes[0].event_type, "issues");
        assert_eq!(envelopes[0].payload, body.as_bytes());
    }

    #[tokio::test]
    async fn forged_signature_is_rejected_without_enqueue() {
        let enqueuer = Arc::new(RecordingEnqueuer::default());
        let app = test_router(enqueuer.clone());

        let response = app
            .oneshot(webhook_request(
                r#"{"action":"opened"}"#,
                Some("sha256=deadbeef".to_string()),
                Some("d-1"),
                "issues",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(enqueuer.envelopes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let enqueuer = Arc::new(RecordingEnqueuer::default());
        let app = test_router(enqueuer.clone());

        let response = app
            .oneshot(webhook_request("{}", None, Some("d-1"), "issues"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_delivery_id_is_a_bad_request() {
        let enqueuer = Arc::new(RecordingEnqueuer::default());
        let app = test_router(enqueuer.clone());

        let body = "{}";
        let response = app
            .oneshot(webhook_request(body, valid_signature(body), None, "issues"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(enqueuer.envelopes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unlisted_event_type_is_acknowledged_without_enqueue() {
        let enqueuer = Arc::new(RecordingEnqueuer::default());
        let app = test_router(enqueuer.clone());

        let body = "{}";
        let response = app
            .oneshot(webhook_request(
                body,
                valid_signature(body),
                Some("d-1"),
                "pull_request",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(enqueuer.envelopes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn enqueue_failure_is_a_server_error() {
        let enqueuer = Arc::new(RecordingEnqueuer {
            fail: true,
            ..RecordingEnqueuer::default()
        });
        let app = test_router(enqueuer);

        let body = "{}";
        let response = app
            .oneshot(webhook_request(
                body,
                valid_signature(body),
                Some("d-1"),
                "issues",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn wrong_method_is_rejected() {
        let enqueuer = Arc::new(RecordingEnqueuer::default());
        let app = test_router(enqueuer);

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/webhook")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn health_always_answers_ok() {
        let enqueuer = Arc::new(RecordingEnqueuer::default());
        let app = test_router(enqueuer);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
