// src/middleware/rate_limit.rs
//
// Fixed-window counter per client identity and path, backed by Redis.
// The limiter fails open: a cache outage must not take the API down.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::errors::KiteError;
use crate::state::AppState;

pub async fn rate_limit_layer(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let identity = client_identity(&req);
    let path = req.uri().path().to_string();
    let key = format!("ratelimit:{identity}:{path}");

    let limit = state.config.rate_limit_max_requests;
    let window_secs = state.config.rate_limit_window_secs;

    let mut conn = state.redis.clone();
    // Atomic bump; the TTL is set only when the window opens.
    let count: i64 = match redis::pipe()
        .atomic()
        .cmd("INCR")
        .arg(&key)
        .cmd("EXPIRE")
        .arg(&key)
        .arg(window_secs)
        .arg("NX")
        .ignore()
        .query_async::<(i64,)>(&mut conn)
        .await
    {
        Ok((count,)) => count,
        Err(err) => {
            tracing::warn!(error = %err, "rate limiter unavailable, allowing request");
            return next.run(req).await;
        }
    };

    let remaining = i64::from(limit) - count;

    if count > i64::from(limit) {
        let mut response = KiteError::RateLimitExceeded.into_response();
        set_limit_headers(&mut response, limit, 0);
        return response;
    }

    let mut response = next.run(req).await;
    set_limit_headers(&mut response, limit, remaining.max(0));
    response
}

fn client_identity(req: &Request<Body>) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        return forwarded.split(',').next().unwrap_or(forwarded).trim().to_string();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string())
}

fn set_limit_headers(response: &mut Response, limit: u32, remaining: i64) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", value);
    }
}
