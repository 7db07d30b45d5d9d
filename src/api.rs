//! REST API server for the analysis orchestrator
//!
//! Each request gets its own run; concurrent requests share only the
//! `Arc<Orchestrator>`.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::agent::Orchestrator;
use crate::models::RunStatus;

/// Upper limit for a per-request step bound.
const MAX_REQUEST_STEPS: u32 = 50;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnalyzeRequest {
    pub company: String,
    #[serde(default)]
    pub max_steps: Option<u32>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Error that still carries partial results.
    pub fn failure<T: Serialize>(message: String, data: T) -> Self {
        Self {
            data: serde_json::to_value(data).ok(),
            ..Self::error(message)
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn list_tools(State(state): State<ApiState>) -> Json<ApiResponse> {
    Json(ApiResponse::success(state.orchestrator.gateway().list()))
}

/// =============================
/// Analysis Endpoint
/// =============================

async fn analyze(
    State(state): State<ApiState>,
    Json(req): Json<AnalyzeRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let company = req.company.trim();
    if company.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("company must not be empty".to_string())),
        );
    }

    let max_steps = req
        .max_steps
        .unwrap_or(state.orchestrator.config().max_steps)
        .min(MAX_REQUEST_STEPS);

    info!(company = %company, max_steps, "Received analysis request");

    let report = state
        .orchestrator
        .run_with(company, max_steps, CancellationToken::new())
        .await
        .into_report();

    match report.status {
        RunStatus::Completed => (StatusCode::OK, Json(ApiResponse::success(report))),
        _ => {
            let message = report
                .error
                .clone()
                .unwrap_or_else(|| "analysis failed".to_string());
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ApiResponse::failure(message, report)),
            )
        }
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/tools", get(list_tools))
        .route("/api/v1/analyze", post(analyze))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::fallback::create_default_resolver;
    use crate::tools::{names, ScriptedTool, ToolGateway};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(lookup: ScriptedTool) -> Router {
        let gateway = ToolGateway::new(Duration::from_secs(5))
            .with_tool(Arc::new(lookup))
            .with_tool(Arc::new(
                ScriptedTool::new(names::FINNHUB_METRICS, "primary")
                    .requiring("metric")
                    .then_value(json!({"metric": {"peTTM": 14.2}})),
            ))
            .with_tool(Arc::new(
                ScriptedTool::new(names::SYNTHESIZE_ANALYSIS, "synthesis").then_value(json!({
                    "company_name": "Acme Corp",
                    "symbol": "ACM",
                    "analysis": "Operating margin of 19% on 12% revenue growth.",
                    "score": 7,
                    "justification": "Healthy margins, modest leverage."
                })),
            ))
            .with_tool(Arc::new(
                ScriptedTool::new(names::GENERATE_REPORT, "report")
                    .then_value(json!({"artifact": "reports/acm.md"})),
            ));

        let orchestrator = Orchestrator::new(
            gateway,
            Arc::new(create_default_resolver()),
            OrchestratorConfig::default(),
        );
        create_router(Arc::new(orchestrator))
    }

    fn acme_lookup() -> ScriptedTool {
        ScriptedTool::new(names::SEARCH_SYMBOL, "lookup")
            .requiring("symbol")
            .then_value(json!({"symbol": "ACM"}))
    }

    fn analyze_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/analyze")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(acme_lookup())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_analyze_completed() {
        let response = app(acme_lookup())
            .oneshot(analyze_request(json!({"company": "Acme Corp"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "completed");
        assert_eq!(body["data"]["artifact"], "reports/acm.md");
        assert_eq!(body["data"]["steps"], 4);
    }

    #[tokio::test]
    async fn test_analyze_failure_keeps_partial_report() {
        let lookup = ScriptedTool::new(names::SEARCH_SYMBOL, "lookup")
            .requiring("symbol")
            .then_value(json!({}));

        let response = app(lookup)
            .oneshot(analyze_request(json!({"company": "Ghost Inc"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["data"]["failure"], "ResolutionFailure");
        assert!(body["error"].as_str().unwrap().starts_with("ResolutionFailure"));
    }

    #[tokio::test]
    async fn test_analyze_respects_requested_bound() {
        let response = app(acme_lookup())
            .oneshot(analyze_request(json!({"company": "Acme Corp", "max_steps": 1})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["data"]["failure"], "BoundExceeded");
        assert_eq!(body["data"]["steps"], 1);
    }

    #[tokio::test]
    async fn test_blank_company_is_bad_request() {
        let response = app(acme_lookup())
            .oneshot(analyze_request(json!({"company": "   "})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_tools() {
        let response = app(acme_lookup())
            .oneshot(Request::builder().uri("/api/v1/tools").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = body_json(response).await;
        let listed: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|d| d["name"].as_str())
            .collect();
        assert_eq!(listed.len(), 4);
        assert_eq!(listed[0], names::FINNHUB_METRICS);
    }
}
