// src/middleware/idempotency.rs
//
// Replay protection for unsafe methods. A request carrying an
// `Idempotency-Key` header is fingerprinted by its body hash; the first
// execution's successful response is cached and replayed verbatim for
// identical retries, while a concurrent duplicate is refused by a
// single-flight lock.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{header, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::KiteError;
use crate::state::AppState;

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

const KEY_PREFIX: &str = "idempotency:";
const CACHE_TTL_SECS: u64 = 24 * 60 * 60;
const LOCK_TTL_SECS: u64 = 30;
/// Request and response bodies beyond this are not idempotency-cacheable.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Serialize, Deserialize)]
struct CachedResponse {
    status_code: u16,
    content_type: Option<String>,
    body: Vec<u8>,
    body_hash: String,
}

pub fn hash_body(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

pub async fn idempotency_layer(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    // Only write-shaped methods are guarded.
    if !matches!(*req.method(), Method::POST | Method::PUT | Method::PATCH) {
        return next.run(req).await;
    }

    let Some(key) = req
        .headers()
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
    else {
        return next.run(req).await;
    };

    let (parts, body) = req.into_parts();
    let body_bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return KiteError::bad_request("failed to read request body").into_response();
        }
    };

    let body_hash = hash_body(&body_bytes);
    let cache_key = format!("{KEY_PREFIX}{key}");
    let mut conn = state.redis.clone();

    // 1. Cache hit: replay, or refuse a different body under the same key.
    let cached: Option<String> = match conn.get(&cache_key).await {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, "idempotency cache read failed, treating as miss");
            None
        }
    };
    if let Some(json) = cached {
        if let Ok(cached) = serde_json::from_str::<CachedResponse>(&json) {
            if cached.body_hash != body_hash {
                return KiteError::IdempotencyConflict.into_response();
            }
            return replay(cached);
        }
    }

    // 2. Single flight per key.
    let lock_key = format!("{cache_key}:lock");
    let locked: Option<String> = redis::cmd("SET")
        .arg(&lock_key)
        .arg("1")
        .arg("NX")
        .arg("EX")
        .arg(LOCK_TTL_SECS)
        .query_async(&mut conn)
        .await
        .unwrap_or(None);
    if locked.is_none() {
        return KiteError::RequestInProgress.into_response();
    }

    // 3. Execute downstream with the buffered body. A panicking handler
    // must not leak the lock for its full TTL, so the unwind is caught,
    // the lock released, and the panic re-raised for the outer panic
    // layer to shape.
    let req = Request::from_parts(parts, Body::from(body_bytes));
    let response = match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            release_lock(&mut conn, &lock_key).await;
            std::panic::resume_unwind(panic);
        }
    };

    // 4. Cache successful responses only; 4xx/5xx stay retryable.
    let response = if response.status().is_success() {
        let (resp_parts, resp_body) = response.into_parts();
        match to_bytes(resp_body, MAX_BODY_BYTES).await {
            Ok(resp_bytes) => {
                let entry = CachedResponse {
                    status_code: resp_parts.status.as_u16(),
                    content_type: resp_parts
                        .headers
                        .get(header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_owned),
                    body: resp_bytes.to_vec(),
                    body_hash,
                };
                match serde_json::to_string(&entry) {
                    Ok(json) => {
                        let set: Result<(), _> =
                            conn.set_ex(&cache_key, json, CACHE_TTL_SECS).await;
                        if let Err(err) = set {
                            tracing::warn!(error = %err, "failed to cache idempotent response");
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to encode idempotent response");
                    }
                }
                Response::from_parts(resp_parts, Body::from(resp_bytes))
            }
            Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    } else {
        response
    };

    release_lock(&mut conn, &lock_key).await;

    response
}

async fn release_lock(conn: &mut ConnectionManager, lock_key: &str) {
    let unlock: Result<usize, _> = conn.del(lock_key).await;
    if let Err(err) = unlock {
        tracing::warn!(error = %err, "failed to release idempotency lock");
    }
}

fn replay(cached: CachedResponse) -> Response {
    let status = StatusCode::from_u16(cached.status_code).unwrap_or(StatusCode::OK);
    let mut builder = Response::builder().status(status);
    if let Some(content_type) = cached.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_hash_is_sha256_hex() {
        // Fingerprints must be stable across processes.
        assert_eq!(
            hash_body(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            hash_body(b"{\"a\":1}"),
            hash_body(b"{\"a\":1}"),
        );
        assert_ne!(hash_body(b"{\"a\":1}"), hash_body(b"{\"a\":2}"));
    }
}
