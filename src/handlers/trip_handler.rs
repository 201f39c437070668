// src/handlers/trip_handler.rs
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::errors::KiteResult;
use crate::models::trip::{EndTripRequest, StartTripRequest, TripResponse};
use crate::state::AppState;

/// POST /v1/trips/start
pub async fn start_trip(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartTripRequest>,
) -> KiteResult<(StatusCode, Json<TripResponse>)> {
    req.validate()?;
    let trip = state.trip_service.start_trip(req.ride_id).await?;
    Ok((StatusCode::CREATED, Json(trip.to_response())))
}

/// GET /v1/trips/:id
pub async fn get_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> KiteResult<Json<TripResponse>> {
    let trip = state.trip_service.get_trip(id).await?;
    Ok(Json(trip.to_response()))
}

/// POST /v1/trips/:id/pause
pub async fn pause_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> KiteResult<Json<serde_json::Value>> {
    state.trip_service.pause_trip(id).await?;
    Ok(Json(json!({ "status": "paused" })))
}

/// POST /v1/trips/:id/resume
pub async fn resume_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> KiteResult<Json<serde_json::Value>> {
    state.trip_service.resume_trip(id).await?;
    Ok(Json(json!({ "status": "resumed" })))
}

/// POST /v1/trips/:id/end
pub async fn end_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<EndTripRequest>,
) -> KiteResult<Json<serde_json::Value>> {
    req.validate()?;
    let trip = state.trip_service.end_trip(id, &req).await?;
    let response = trip.to_response();
    Ok(Json(json!({
        "trip_id": response.id,
        "status": response.status,
        "fare_breakdown": response.fare_breakdown,
    })))
}
