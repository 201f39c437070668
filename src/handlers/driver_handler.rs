// src/handlers/driver_handler.rs
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::errors::KiteResult;
use crate::models::driver::{CreateDriverRequest, DriverResponse, UpdateDriverLocationRequest};
use crate::models::offer::{AcceptOfferRequest, DeclineOfferRequest};
use crate::state::AppState;

/// POST /v1/drivers
pub async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDriverRequest>,
) -> KiteResult<(StatusCode, Json<DriverResponse>)> {
    req.validate()?;
    let driver = state.driver_service.create_driver(&req).await?;
    Ok((StatusCode::CREATED, Json(driver.to_response())))
}

/// GET /v1/drivers/:id
pub async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> KiteResult<Json<DriverResponse>> {
    let driver = state.driver_service.get_driver(id).await?;
    Ok(Json(driver.to_response()))
}

/// POST /v1/drivers/:id/online
pub async fn go_online(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> KiteResult<Json<serde_json::Value>> {
    state.driver_service.go_online(id).await?;
    Ok(Json(json!({ "status": "online" })))
}

/// POST /v1/drivers/:id/offline
pub async fn go_offline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> KiteResult<Json<serde_json::Value>> {
    state.driver_service.go_offline(id).await?;
    Ok(Json(json!({ "status": "offline" })))
}

/// POST /v1/drivers/:id/location
pub async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateDriverLocationRequest>,
) -> KiteResult<Json<serde_json::Value>> {
    req.validate()?;
    state.driver_service.update_location(id, &req).await?;
    Ok(Json(json!({ "status": "ok" })))
}

/// GET /v1/drivers/:id/offers
pub async fn get_pending_offers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> KiteResult<Json<serde_json::Value>> {
    let offers = state.matching_service.get_pending_offers(id).await?;
    Ok(Json(json!({ "offers": offers })))
}

/// POST /v1/drivers/:id/accept
pub async fn accept_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<AcceptOfferRequest>,
) -> KiteResult<Json<serde_json::Value>> {
    req.validate()?;
    let ride = state.driver_service.accept_offer(id, &req).await?;
    Ok(Json(json!({ "status": "accepted", "ride": ride })))
}

/// POST /v1/drivers/:id/decline
pub async fn decline_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<DeclineOfferRequest>,
) -> KiteResult<Json<serde_json::Value>> {
    req.validate()?;
    state.driver_service.decline_offer(id, req.offer_id).await?;
    Ok(Json(json!({ "status": "declined" })))
}
