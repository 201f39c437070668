// src/handlers/user_handler.rs
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;
use validator::Validate;

use crate::errors::KiteResult;
use crate::models::user::{CreateUserRequest, UserResponse};
use crate::state::AppState;

/// POST /v1/users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> KiteResult<(StatusCode, Json<UserResponse>)> {
    req.validate()?;
    let user = state.user_service.create_user(&req).await?;
    Ok((StatusCode::CREATED, Json(user.to_response())))
}

/// GET /v1/users/:id
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> KiteResult<Json<UserResponse>> {
    let user = state.user_service.get_user(id).await?;
    Ok(Json(user.to_response()))
}
