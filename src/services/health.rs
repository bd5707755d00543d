use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::database::connection::DatabaseManager;
use crate::services::todo::TodoService;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub database: DatabaseHealth,
    pub reminders: ReminderHealth,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseHealth {
    pub status: String,
    pub connection_pool_size: u32,
    pub response_time_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReminderHealth {
    pub pending: usize,
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseManager>,
    pub service: Arc<TodoService>,
    pub start_time: DateTime<Utc>,
}

pub struct HealthService {
    pub router: Router,
}

impl HealthService {
    pub fn new(db: Arc<DatabaseManager>, service: Arc<TodoService>) -> Self {
        let state = AppState {
            db,
            service,
            start_time: Utc::now(),
        };

        let router = Router::new()
            .route("/health", get(health_check))
            .route("/health/ready", get(readiness_check))
            .route("/health/live", get(liveness_check))
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        Self { router }
    }
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();
    let db_healthy = state.db.ping().await.is_ok();
    let response_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let uptime_seconds = u64::try_from(
        Utc::now().signed_duration_since(state.start_time).num_seconds(),
    )
    .unwrap_or(0);

    let status = if db_healthy { "healthy" } else { "unhealthy" };
    let health_response = HealthResponse {
        status: status.to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: DatabaseHealth {
            status: status.to_string(),
            connection_pool_size: state.db.pool.size(),
            response_time_ms,
        },
        reminders: ReminderHealth {
            pending: state.service.scheduler().pending_count(),
        },
        uptime_seconds,
    };

    let code = if db_healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(health_response))
}

async fn readiness_check(State(state): State<AppState>) -> Result<Json<&'static str>, StatusCode> {
    match state.db.ping().await {
        Ok(_) => Ok(Json("ready")),
        Err(e) => {
            tracing::warn!("Readiness check failed: {}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

async fn liveness_check() -> Json<&'static str> {
    Json("alive")
}
