use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::admin::AdminGate;
use crate::config::RelayConfig;
use crate::conversation::{ConversationRecord, DEFAULT_CONVERSATION_LIMIT};
use crate::health::{ErrorView, HealthSnapshot, DEFAULT_ERROR_LIMIT};
use crate::monitor::Monitor;
use crate::relay::{ChatRequest, RelayError, RelayHandler};
use crate::system_log::{LogEntry, SystemLog, DEFAULT_LOG_LIMIT};
use crate::upstream::CompletionClient;

/// Everything the HTTP handlers need, constructed once at startup.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<RelayHandler>,
    pub monitor: Monitor,
    pub admin: Arc<AdminGate>,
}

impl AppState {
    /// Wire the services described by `config` around a fresh system log.
    pub fn from_config(config: &RelayConfig) -> Self {
        let log = SystemLog::new();
        let monitor = Monitor::new(log.clone());
        let upstream = Arc::new(CompletionClient::new(config.upstream()));
        let relay = RelayHandler::new(
            upstream,
            monitor.clone(),
            config.relay_settings(),
            config.retry_policy(),
        );
        Self {
            relay: Arc::new(relay),
            monitor,
            admin: Arc::new(AdminGate::new(config.admin_code.clone(), log)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAdminResponse {
    pub is_valid: bool,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match self {
            RelayError::InvalidRequest(ref details) => invalid_chat_request(details),
            RelayError::EmptyMessages => invalid_chat_request(&self.to_string()),
            RelayError::Upstream { ref source, ref health } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": self.to_string(),
                    "details": source.details(),
                    "serverHealth": health,
                })),
            )
                .into_response(),
        }
    }
}

fn invalid_chat_request(details: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "Invalid chat request",
            "details": details,
        })),
    )
        .into_response()
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<Value>, RelayError> {
    let Json(request) =
        payload.map_err(|rejection| RelayError::InvalidRequest(rejection.body_text()))?;
    state.relay.handle(request).await.map(Json)
}

async fn health(State(state): State<AppState>) -> Json<HealthSnapshot> {
    Json(state.monitor.snapshot())
}

async fn errors(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<ErrorView>> {
    Json(state.monitor.errors(query.limit.unwrap_or(DEFAULT_ERROR_LIMIT)))
}

async fn logs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<LogEntry>> {
    Json(state.monitor.log().list(query.limit.unwrap_or(DEFAULT_LOG_LIMIT)))
}

async fn conversations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<ConversationRecord>> {
    Json(
        state
            .monitor
            .conversations(query.limit.unwrap_or(DEFAULT_CONVERSATION_LIMIT)),
    )
}

/// Any body that does not carry a string `code` is checked as an empty code,
/// so malformed attempts are answered and logged like wrong ones.
async fn verify_admin(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Json<VerifyAdminResponse> {
    let code = payload
        .ok()
        .and_then(|Json(body)| body.get("code").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_default();
    Json(VerifyAdminResponse {
        is_valid: state.admin.verify(&code),
    })
}

/// The `/api` routes, without static assets.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/health", get(health))
        .route("/api/errors", get(errors))
        .route("/api/logs", get(logs))
        .route("/api/conversations", get(conversations))
        .route("/api/verify-admin", post(verify_admin))
        .with_state(state)
}

pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config);
    let log = state.monitor.log().clone();

    if config.api_key.is_none() {
        log.warning("No upstream API key configured; chat requests will likely be rejected");
    }
    if !state.admin.is_configured() {
        log.warning("No admin code configured; dashboard login is disabled");
    }

    let mut app = router(state);
    if let Some(ref dir) = config.static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }
    let app = app
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    log.info(format!("Server running at http://{}", listener.local_addr()?));
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use crate::system_log::LogKind;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state(admin_code: Option<&str>) -> AppState {
        let config = RelayConfig {
            upstream_base_url: "http://127.0.0.1:9".to_string(),
            admin_code: admin_code.map(String::from),
            max_attempts: 1,
            retry_delay_ms: 0,
            request_timeout_secs: 1,
            ..Default::default()
        };
        AppState::from_config(&config)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_starts_clean() {
        let app = router(test_state(None));
        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["isHealthy"], true);
        assert_eq!(json["totalRequests"], 0);
        assert_eq!(json["successRate"], 0);
    }

    #[tokio::test]
    async fn list_endpoints_return_arrays() {
        let state = test_state(None);
        state.monitor.log().info("one");
        state.monitor.log().info("two");
        state.monitor.log().info("three");

        for uri in ["/api/errors", "/api/conversations", "/api/logs"] {
            let response = router(state.clone())
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
            assert!(body_json(response).await.is_array(), "{uri}");
        }

        let response = router(state)
            .oneshot(
                Request::builder()
                    .uri("/api/logs?limit=2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[0]["message"], "three");
        assert_eq!(json[0]["type"], "info");
    }

    #[tokio::test]
    async fn verify_admin_rejects_wrong_code() {
        let app = router(test_state(Some("admin123")));
        let response = app
            .oneshot(post_json("/api/verify-admin", json!({ "code": "wrong" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "isValid": false }));
    }

    #[tokio::test]
    async fn verify_admin_accepts_configured_code() {
        let app = router(test_state(Some("admin123")));
        let response = app
            .oneshot(post_json("/api/verify-admin", json!({ "code": "admin123" })))
            .await
            .unwrap();
        assert_eq!(body_json(response).await, json!({ "isValid": true }));
    }

    #[tokio::test]
    async fn verify_admin_fails_closed_without_secret() {
        let app = router(test_state(None));
        let response = app
            .oneshot(post_json("/api/verify-admin", json!({})))
            .await
            .unwrap();
        assert_eq!(body_json(response).await, json!({ "isValid": false }));
    }

    fn post_raw(uri: &str, content_type: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", content_type)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn verify_admin_malformed_bodies_are_rejected_codes() {
        let state = test_state(Some("4821"));
        let requests = [
            post_json("/api/verify-admin", json!({ "code": 4821 })),
            post_json("/api/verify-admin", json!(["4821"])),
            post_raw("/api/verify-admin", "application/json", "{not json"),
            post_raw("/api/verify-admin", "text/plain", "4821"),
        ];
        for request in requests {
            let response = router(state.clone()).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await, json!({ "isValid": false }));
        }

        let rejections = state
            .monitor
            .log()
            .list(10)
            .into_iter()
            .filter(|e| e.kind == LogKind::Warning && e.message.contains("invalid code"))
            .count();
        assert_eq!(rejections, 4);
    }

    #[tokio::test]
    async fn malformed_chat_bodies_are_json_bad_requests() {
        let state = test_state(None);
        let requests = [
            post_json("/api/chat", json!({})),
            post_json("/api/chat", json!({ "messages": [{ "role": "user" }] })),
            post_json("/api/chat", json!({ "messages": "hello" })),
            post_raw("/api/chat", "application/json", "{\"messages\": ["),
            post_raw("/api/chat", "text/plain", "hello"),
        ];
        for request in requests {
            let response = router(state.clone()).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(response.headers()["content-type"], "application/json");

            let json = body_json(response).await;
            assert_eq!(json["error"], "Invalid chat request");
            assert!(json["details"].is_string());
        }
        assert_eq!(state.monitor.snapshot().total_requests, 0);
        assert!(state.monitor.conversations(10).is_empty());
    }

    #[tokio::test]
    async fn empty_messages_is_bad_request() {
        let state = test_state(None);
        let response = router(state.clone())
            .oneshot(post_json("/api/chat", json!({ "messages": [] })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert!(json["error"].is_string());
        assert_eq!(state.monitor.snapshot().total_requests, 0);
        assert!(state.monitor.conversations(10).is_empty());
    }

    #[tokio::test]
    async fn unreachable_upstream_returns_500_with_health() {
        let state = test_state(None);
        let response = router(state.clone())
            .oneshot(post_json(
                "/api/chat",
                json!({ "messages": [{ "role": "user", "content": "hello" }] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "Failed to connect to AI service");
        assert!(json["details"].is_string());
        assert_eq!(json["serverHealth"]["recentErrorCount"], 1);
        assert_eq!(json["serverHealth"]["totalRequests"], 1);
    }
}
