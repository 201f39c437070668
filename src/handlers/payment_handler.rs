// src/handlers/payment_handler.rs
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;
use validator::Validate;

use crate::errors::KiteResult;
use crate::models::payment::{CreatePaymentRequest, PaymentResponse};
use crate::state::AppState;

/// POST /v1/payments
pub async fn process_payment(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePaymentRequest>,
) -> KiteResult<Json<PaymentResponse>> {
    req.validate()?;
    let payment = state.payment_service.process_payment(&req).await?;
    Ok(Json(payment.to_response()))
}

/// GET /v1/payments/:id
pub async fn get_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> KiteResult<Json<PaymentResponse>> {
    let payment = state.payment_service.get_payment(id).await?;
    Ok(Json(payment.to_response()))
}

/// POST /v1/payments/:id/refund
pub async fn refund_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> KiteResult<Json<PaymentResponse>> {
    let payment = state.payment_service.refund_payment(id).await?;
    Ok(Json(payment.to_response()))
}
