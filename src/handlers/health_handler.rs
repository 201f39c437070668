// src/handlers/health_handler.rs
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use crate::db;
use crate::state::AppState;

/// GET /health — liveness plus data-store probes.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let database = db::postgres_healthy(&state.pool).await;
    let redis = db::redis_healthy(&state.redis).await;
    let healthy = database && redis;

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": if healthy { "ok" } else { "degraded" },
        "services": {
            "database": if database { "up" } else { "down" },
            "redis": if redis { "up" } else { "down" },
        },
    });

    (status, Json(body))
}
