// src/handlers/ride_handler.rs
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::errors::KiteResult;
use crate::middleware::idempotency::IDEMPOTENCY_HEADER;
use crate::models::ride::{
    CancelRideRequest, CreateRideRequest, Ride, RideResponse, RideStatus,
};
use crate::state::AppState;

/// POST /v1/rides
///
/// Creates the ride and fires matching off without blocking the rider's
/// response; matching errors surface through later state reads.
pub async fn create_ride(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateRideRequest>,
) -> KiteResult<(StatusCode, Json<Ride>)> {
    req.validate()?;

    let idempotency_key = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok());

    let ride = state
        .ride_service
        .create_ride(&req, idempotency_key)
        .await?;

    if ride.status == RideStatus::Matching {
        let matching = Arc::clone(&state.matching_service);
        let ride_for_matching = ride.clone();
        tokio::spawn(async move {
            if let Err(err) = matching.find_and_offer_drivers(&ride_for_matching).await {
                tracing::warn!(
                    error = %err,
                    ride_id = %ride_for_matching.id,
                    "matching round failed"
                );
            }
        });
    }

    Ok((StatusCode::CREATED, Json(ride)))
}

/// GET /v1/rides/:id
pub async fn get_ride(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> KiteResult<Json<RideResponse>> {
    let ride = state.ride_service.get_ride(id).await?;
    Ok(Json(ride))
}

/// POST /v1/rides/:id/cancel
pub async fn cancel_ride(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelRideRequest>,
) -> KiteResult<Json<serde_json::Value>> {
    req.validate()?;
    state.ride_service.cancel_ride(id, &req).await?;
    Ok(Json(json!({
        "status": "cancelled",
        "message": "ride cancelled successfully",
    })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRideStatusRequest {
    pub status: RideStatus,
}

/// POST /v1/rides/:id/status
///
/// Guarded transition on the ride entity; used by the driver app to report
/// arrival at the pickup.
pub async fn update_ride_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRideStatusRequest>,
) -> KiteResult<Json<Ride>> {
    let ride = state.ride_service.update_ride_status(id, req.status).await?;
    Ok(Json(ride))
}
