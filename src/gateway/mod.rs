//! Axum-based HTTP surface.
//!
//! - `GET /health` (alias `/api/health`) reports worker state, backlog and
//!   the route a request would take right now
//! - `POST /chat` (alias `/api/chat`) runs one request through the
//!   orchestrator
//!
//! Bodies are capped at 64KB. No whole-request timeout layer; each backend
//! call carries its own.

use crate::config::Config;
use crate::orchestrator::{ChatOutcome, Orchestrator};
use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

/// Maximum request body size (64KB)
pub const MAX_BODY_SIZE: usize = 65_536;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// `POST /chat` body. `message` wins over `question` when both are set.
#[derive(Debug, Default, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
}

impl ChatBody {
    pub fn query(&self) -> &str {
        [self.message.as_deref(), self.question.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|q| !q.is_empty())
            .unwrap_or_default()
    }
}

/// Build the router with CORS and the body limit applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/health", get(handle_health))
        .route("/chat", post(handle_chat))
        .route("/api/chat", post(handle_chat))
        .with_state(state)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
}

pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    let orchestrator = Orchestrator::from_config(&config)?;
    for secret in config.missing_secrets() {
        tracing::error!("Missing required secret `{secret}`: chat requests will fail until it is set");
    }
    if config.external.api_key.trim().is_empty() {
        tracing::warn!("External backend key not set: every request will be served locally");
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual = listener.local_addr()?;
    tracing::info!("Helpdesk gateway listening on http://{actual}");
    tracing::info!(
        local = %config.local.api_url,
        external = %config.external.api_url,
        search = %config.search.url,
        load_threshold = config.admission.load_threshold,
        max_local_queue = config.admission.max_local_queue,
        "Backends configured"
    );

    let app = router(AppState {
        orchestrator: Arc::new(orchestrator),
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /health
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.health())
}

/// POST /chat
async fn handle_chat(
    State(state): State<AppState>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> impl IntoResponse {
    // Malformed JSON counts as an empty body; failing to read the body at all
    // (e.g. over the size limit) keeps its own status.
    let body = match body {
        Ok(Json(body)) => body,
        Err(
            e @ (JsonRejection::JsonDataError(_)
            | JsonRejection::JsonSyntaxError(_)
            | JsonRejection::MissingJsonContentType(_)),
        ) => {
            tracing::debug!("Chat body rejected: {e}");
            ChatBody::default()
        }
        Err(e) => {
            tracing::warn!("Chat body unreadable: {e}");
            return (e.status(), Json(serde_json::json!({ "error": e.body_text() })));
        }
    };

    match state.orchestrator.handle(body.query()).await {
        ChatOutcome::Answer { text, source } => {
            tracing::info!(source = ?source, chars = text.chars().count(), "Chat answered");
            (StatusCode::OK, Json(serde_json::json!({ "response": text })))
        }
        ChatOutcome::ClientError => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Empty message" })),
        ),
        ChatOutcome::ConfigError(error) | ChatOutcome::ServerError(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": error })),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResponseCache;
    use crate::gatekeeper::{AdmissionController, FixedLoad, QueueState};
    use crate::providers::{Backend, BackendError};
    use crate::rag::{ContextBundle, ContextSource};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    #[derive(Default)]
    struct MockBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Backend for MockBackend {
        fn name(&self) -> &str {
            "mock"
        }

        async fn generate(&self, query: &str, _context: &str) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("Resposta para: {query}"))
        }
    }

    struct NoContext;

    #[async_trait]
    impl ContextSource for NoContext {
        async fn gather(&self, _query: &str) -> ContextBundle {
            ContextBundle::default()
        }
    }

    fn test_app(backend: Arc<MockBackend>, config_error: Option<String>) -> Router {
        let cache =
            Arc::new(ResponseCache::open_in_memory(Duration::from_secs(60), &[]).unwrap());
        let admission = AdmissionController::new(
            5.0,
            2,
            Arc::new(FixedLoad(0.0)),
            Arc::new(QueueState::new()),
        );
        let orchestrator = Orchestrator::new(
            cache,
            Arc::new(NoContext),
            admission,
            backend.clone(),
            backend,
        )
        .with_config_error(config_error);
        router(AppState {
            orchestrator: Arc::new(orchestrator),
        })
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn message_wins_over_question() {
        let body = ChatBody {
            message: Some("  wifi ".into()),
            question: Some("email".into()),
        };
        assert_eq!(body.query(), "wifi");

        let body = ChatBody {
            message: Some("   ".into()),
            question: Some("email".into()),
        };
        assert_eq!(body.query(), "email");
        assert_eq!(ChatBody::default().query(), "");
    }

    #[tokio::test]
    async fn chat_returns_answer() {
        let backend = Arc::new(MockBackend::default());
        let app = test_app(backend.clone(), None);

        let response = app
            .oneshot(post_json("/chat", r#"{"question": "Impressão em Cor"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await["response"],
            "Resposta para: Impressão em Cor"
        );
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn api_alias_routes_work() {
        let app = test_app(Arc::new(MockBackend::default()), None);

        let response = app
            .clone()
            .oneshot(post_json("/api/chat", r#"{"message": "vpn"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn empty_or_invalid_bodies_are_bad_requests() {
        let backend = Arc::new(MockBackend::default());
        let app = test_app(backend.clone(), None);

        for body in [r#"{}"#, r#"{"message": "", "question": "  "}"#, "not json", r#"{"message": 42}"#] {
            let response = app.clone().oneshot(post_json("/chat", body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn config_error_is_internal_error() {
        let app = test_app(
            Arc::new(MockBackend::default()),
            Some("Server configuration error: missing local.api_key".into()),
        );
        let response = app
            .oneshot(post_json("/chat", r#"{"message": "wifi"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json_body(response).await["error"]
            .as_str()
            .unwrap()
            .contains("local.api_key"));
    }

    #[tokio::test]
    async fn health_reports_snapshot_fields() {
        let app = test_app(Arc::new(MockBackend::default()), None);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "available");
        assert_eq!(body["worker_state"], "idle");
        assert_eq!(body["queue_depth"], 0);
        assert_eq!(body["mode"], "LOCAL");
        assert_eq!(body["cache_items"], 0);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let backend = Arc::new(MockBackend::default());
        let app = test_app(backend.clone(), None);
        let huge = format!(r#"{{"message": "{}"}}"#, "a".repeat(MAX_BODY_SIZE + 1));

        let response = app.oneshot(post_json("/chat", &huge)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn oversized_chunked_body_is_payload_too_large() {
        let backend = Arc::new(MockBackend::default());
        let app = test_app(backend.clone(), None);

        // No content-length: the limit only trips while the body is read.
        let mut parts: Vec<Result<String, std::io::Error>> = vec![Ok(r#"{"message": ""#.to_string())];
        parts.extend((0..20).map(|_| Ok("a".repeat(4096))));
        parts.push(Ok(r#""}"#.to_string()));
        let request = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from_stream(futures_util::stream::iter(parts)))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }
}
