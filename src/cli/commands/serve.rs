//! HTTP API server for integration with other systems.
//!
//! Provides REST endpoints for course queries and the course catalogue.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::rag::{CourseAnalytics, RagResponse, RagSystem};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Sessions idle for longer than this are forgotten.
const SESSION_IDLE_HOURS: i64 = 12;

/// Shared application state.
struct AppState {
    system: RagSystem,
}

/// Run the HTTP API server.
pub async fn run_serve(host: Option<String>, port: Option<u16>, settings: Settings) -> anyhow::Result<()> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);

    let state = Arc::new(AppState {
        system: RagSystem::new(&settings)?,
    });

    spawn_session_pruner(state.clone());

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Lektor API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Query", "POST /api/query");
    Output::kv("Courses", "GET  /api/courses");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/query", post(query))
        .route("/api/courses", get(courses))
        .layer(cors)
        .with_state(state)
}

fn spawn_session_pruner(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(600));
        loop {
            interval.tick().await;
            match state
                .system
                .sessions()
                .prune_idle(chrono::Duration::hours(SESSION_IDLE_HOURS))
            {
                Ok(0) => {}
                Ok(n) => info!("Pruned {} idle session(s)", n),
                Err(e) => warn!("Session pruning failed: {}", e),
            }
        }
    });
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(e: impl std::fmt::Display) -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> impl IntoResponse {
    if req.query.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Query must not be empty".to_string(),
            }),
        )
            .into_response();
    }

    let result: crate::Result<RagResponse> =
        state.system.query(&req.query, req.session_id.as_deref()).await;

    match result {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}

async fn courses(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let result: crate::Result<CourseAnalytics> = state.system.course_analytics().await;

    match result {
        Ok(analytics) => Json(analytics).into_response(),
        Err(e) => error_response(e),
    }
}
