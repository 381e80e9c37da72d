//! Web服务器

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::handlers::{
    api_root, cancel_intake, claim_next, complete_intake, get_intake, health, list_awaiting_triage,
    list_escalations, list_queue, metrics, not_found, peek_next, queue_stats, register_arrival,
    triage_intake, AppState,
};

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState, enable_cors: bool) -> Self {
        let app = create_app(state, enable_cors);
        Self { addr, app }
    }

    /// 运行直到 `shutdown` 完成
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start web server: {}", e))?;

        info!("Web server stopped");
        Ok(())
    }
}

/// 构建完整路由
pub fn create_app(state: AppState, enable_cors: bool) -> Router {
    let app = Router::new()
        .route("/", get(api_root))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .nest("/api/v1", api_routes())
        .fallback(not_found)
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    if enable_cors {
        app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        app
    }
}

/// API v1 路由
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(api_root))
        .route("/intake", post(register_arrival))
        .route("/intake/:id", get(get_intake))
        .route("/intake/:id/triage", post(triage_intake))
        .route("/intake/:id/cancel", post(cancel_intake))
        .route("/intake/:id/complete", post(complete_intake))
        .route("/queue", get(list_queue))
        .route("/queue/next", get(peek_next))
        .route("/queue/claim", post(claim_next))
        .route("/queue/stats", get(queue_stats))
        .route("/queue/awaiting-triage", get(list_awaiting_triage))
        .route("/escalations", get(list_escalations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;
    use triage_admin::TriageMetrics;
    use triage_core::SlaPolicy;
    use triage_workflow::{AcuityClassifier, ClassifierConfig, Clock, ManualClock, TriageEngine, TriageService};
    use uuid::Uuid;

    fn test_state() -> (AppState, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let classifier = AcuityClassifier::new(ClassifierConfig::default()).unwrap();
        let service = TriageService::with_clock(TriageEngine::new(classifier, SlaPolicy::default()), clock.clone());
        let metrics = Arc::new(TriageMetrics::new().unwrap());
        (AppState::new(service, metrics), clock)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, value)
    }

    async fn register(app: &Router, complaint: &str) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/api/v1/intake",
            Some(json!({ "patient_id": Uuid::new_v4(), "chief_complaint": complaint })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "AwaitingTriage");
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_intake_to_claim_flow() {
        let (state, clock) = test_state();
        let app = create_app(state, true);

        let sprain = register(&app, "ankle sprain").await;
        clock.advance(chrono::Duration::minutes(1));
        let chest = register(&app, "crushing chest pain").await;

        let (status, body) = send(&app, "POST", &format!("/api/v1/intake/{}/triage", sprain), Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Triaged");

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/intake/{}/triage", chest),
            Some(json!({ "vital_signs": { "oxygen_saturation": 80.0 } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["acuity"], "Emergency");

        let (status, body) = send(&app, "GET", "/api/v1/queue", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["records"][0]["id"], chest.as_str());

        let (status, body) = send(&app, "GET", "/api/v1/queue/next", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], chest.as_str());

        let clinician = Uuid::new_v4();
        let (status, body) = send(&app, "POST", "/api/v1/queue/claim", Some(json!({ "clinician_id": clinician }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], chest.as_str());
        assert_eq!(body["status"], "InService");

        let (status, body) = send(&app, "POST", &format!("/api/v1/intake/{}/complete", chest), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Completed");

        let (status, _) = send(&app, "POST", "/api/v1/queue/claim", Some(json!({ "clinician_id": clinician }))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app, "POST", "/api/v1/queue/claim", Some(json!({ "clinician_id": clinician }))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);

        let (status, _) = send(&app, "GET", "/api/v1/queue/next", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let (state, _clock) = test_state();
        let app = create_app(state, false);

        let (status, body) = send(&app, "GET", &format!("/api/v1/intake/{}", Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], true);
        assert_eq!(body["status"], 404);

        let id = register(&app, "headache").await;
        let (status, _) = send(&app, "POST", &format!("/api/v1/intake/{}/complete", id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/v1/intake/{}/cancel", id),
            Some(json!({ "reason": "left without being seen" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // 已结束的记录不再可操作
        let (status, _) = send(&app, "POST", &format!("/api/v1/intake/{}/triage", id), Some(json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let long_complaint = "x".repeat(2001);
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/intake",
            Some(json!({ "patient_id": Uuid::new_v4(), "chief_complaint": long_complaint })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);

        let (status, _) = send(&app, "GET", "/api/v1/nowhere", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cancel_in_service_conflicts() {
        let (state, _clock) = test_state();
        let app = create_app(state, false);

        let id = register(&app, "laceration").await;
        send(&app, "POST", &format!("/api/v1/intake/{}/triage", id), Some(json!({ "override_level": "Urgent" }))).await;
        send(&app, "POST", "/api/v1/queue/claim", Some(json!({ "clinician_id": Uuid::new_v4() }))).await;

        let (status, body) = send(&app, "POST", &format!("/api/v1/intake/{}/cancel", id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status"], 409);
    }

    #[tokio::test]
    async fn test_escalations_and_metrics() {
        let (state, clock) = test_state();
        let service = state.service.clone();
        let app = create_app(state, false);

        let id = register(&app, "wrist pain").await;
        send(&app, "POST", &format!("/api/v1/intake/{}/triage", id), Some(json!({ "override_level": "Urgent" }))).await;

        clock.advance(chrono::Duration::minutes(61));
        assert_eq!(service.sweep().await.len(), 1);

        let (status, body) = send(&app, "GET", "/api/v1/escalations?limit=5", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["intake_id"], id.as_str());

        let (status, body) = send(&app, "GET", "/api/v1/queue/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["waiting"], 1);
        assert_eq!(body["escalated_waiting"], 1);

        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Degraded");
        assert_eq!(body["timestamp"], serde_json::to_value(clock.now()).unwrap());

        let (status, body) = send(&app, "GET", "/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        let text = body.as_str().unwrap();
        assert!(text.contains("triage_waiting_records{level=\"Urgent\"} 1"));
    }

    #[tokio::test]
    async fn test_awaiting_triage_listing() {
        let (state, _clock) = test_state();
        let app = create_app(state, false);

        let id = register(&app, "fever").await;
        let (status, body) = send(&app, "GET", "/api/v1/queue/awaiting-triage", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["records"][0]["id"], id.as_str());

        let (status, body) = send(&app, "GET", "/api/v1/queue", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);
    }
}
