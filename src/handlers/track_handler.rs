// src/handlers/track_handler.rs
//
// Server-sent event stream for live ride tracking. Each connection gets a
// bounded subscription on the fan-out registry; the stream interleaves
// pushed location updates with a five-second heartbeat carrying the wall
// clock and the last known position.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use chrono::Utc;
use futures::Stream;
use serde_json::json;
use tokio::time::{interval_at, Instant};
use uuid::Uuid;

use crate::cache::DriverLocation;
use crate::errors::{KiteError, KiteResult};
use crate::state::AppState;
use crate::tracking::LocationEvent;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// GET /v1/rides/:id/track
pub async fn track_ride(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> KiteResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let ride = state
        .ride_repo
        .get_by_id(id)
        .await?
        .ok_or_else(|| KiteError::not_found("ride"))?;

    let driver_id = ride
        .driver_id
        .ok_or_else(|| KiteError::bad_request("no driver assigned yet"))?;

    let mut subscription = Arc::clone(&state.tracking).subscribe(ride.id);
    let presence = state.presence.clone();
    let initial = presence.get_location(driver_id).await.unwrap_or(None);

    tracing::debug!(ride_id = %ride.id, %driver_id, "tracking stream opened");

    let stream = async_stream::stream! {
        // New subscribers immediately see where the driver is.
        if let Some(loc) = &initial {
            yield Ok(cached_location_event(driver_id, loc));
        }

        let mut heartbeat = interval_at(
            Instant::now() + HEARTBEAT_INTERVAL,
            HEARTBEAT_INTERVAL,
        );

        loop {
            tokio::select! {
                received = subscription.receiver.recv() => {
                    match received {
                        Some(event) => yield Ok(location_event(&event)),
                        None => break,
                    }
                }
                _ = heartbeat.tick() => {
                    yield Ok(heartbeat_event());
                    if let Ok(Some(loc)) = presence.get_location(driver_id).await {
                        yield Ok(cached_location_event(driver_id, &loc));
                    }
                }
            }
        }
        // Dropping the subscription deregisters this client.
    };

    Ok(Sse::new(stream))
}

fn location_event(event: &LocationEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default().event("location").data(data)
}

fn cached_location_event(driver_id: Uuid, loc: &DriverLocation) -> Event {
    location_event(&LocationEvent {
        driver_id,
        lat: loc.lat,
        lng: loc.lng,
        heading: loc.heading,
        speed: loc.speed,
        timestamp: Utc::now(),
    })
}

fn heartbeat_event() -> Event {
    Event::default()
        .event("heartbeat")
        .data(json!({ "time": Utc::now().to_rfc3339() }).to_string())
}
