// src/tracking.rs
//
// Real-time position fan-out. Driver location ingest publishes onto an
// in-process topic; a dispatcher task consumes it and broadcasts to every
// subscriber of the ride. Slow subscribers lose messages instead of
// blocking the dispatcher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Per-subscriber channel capacity.
const SUBSCRIBER_BUFFER: usize = 10;
/// Topic capacity between ingest and the dispatcher.
const TOPIC_BUFFER: usize = 1024;

/// Record published by the location ingest path.
#[derive(Debug, Clone)]
pub struct LocationUpdate {
    pub ride_id: Uuid,
    pub driver_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
}

/// Event delivered to subscribers and serialized onto the wire.
#[derive(Debug, Clone, Serialize)]
pub struct LocationEvent {
    pub driver_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl From<LocationUpdate> for LocationEvent {
    fn from(update: LocationUpdate) -> Self {
        Self {
            driver_id: update.driver_id,
            lat: update.lat,
            lng: update.lng,
            heading: update.heading,
            speed: update.speed,
            timestamp: Utc::now(),
        }
    }
}

/// Process-wide registry of ride subscribers. Broadcasts take the read
/// lock; register/unregister take the write lock. Channel sends never
/// block.
pub struct TrackingRegistry {
    subscribers: RwLock<HashMap<Uuid, HashMap<u64, mpsc::Sender<LocationEvent>>>>,
    next_id: AtomicU64,
}

impl TrackingRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Open a bounded subscription for one ride. Dropping the returned
    /// subscription unregisters it.
    pub fn subscribe(self: Arc<Self>, ride_id: Uuid) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let sub_id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.subscribers
            .write()
            .expect("tracking registry lock poisoned")
            .entry(ride_id)
            .or_default()
            .insert(sub_id, tx);

        tracing::debug!(%ride_id, sub_id, "tracking subscriber registered");

        Subscription {
            receiver: rx,
            registry: self,
            ride_id,
            sub_id,
        }
    }

    /// Push one event to every subscriber of the ride. A full channel
    /// drops the message for that subscriber only.
    pub fn broadcast(&self, ride_id: Uuid, event: &LocationEvent) {
        let subscribers = self
            .subscribers
            .read()
            .expect("tracking registry lock poisoned");

        if let Some(channels) = subscribers.get(&ride_id) {
            for (sub_id, tx) in channels {
                if tx.try_send(event.clone()).is_err() {
                    tracing::debug!(%ride_id, sub_id, "slow subscriber, dropping update");
                }
            }
        }
    }

    pub fn subscriber_count(&self, ride_id: Uuid) -> usize {
        self.subscribers
            .read()
            .expect("tracking registry lock poisoned")
            .get(&ride_id)
            .map_or(0, HashMap::len)
    }

    fn unregister(&self, ride_id: Uuid, sub_id: u64) {
        let mut subscribers = self
            .subscribers
            .write()
            .expect("tracking registry lock poisoned");

        if let Some(channels) = subscribers.get_mut(&ride_id) {
            channels.remove(&sub_id);
            if channels.is_empty() {
                subscribers.remove(&ride_id);
            }
        }
        tracing::debug!(%ride_id, sub_id, "tracking subscriber unregistered");
    }
}

impl Default for TrackingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Live subscription handle. The stream task owns this; dropping it (on
/// disconnect or cancellation) deregisters the channel.
pub struct Subscription {
    pub receiver: mpsc::Receiver<LocationEvent>,
    registry: Arc<TrackingRegistry>,
    ride_id: Uuid,
    sub_id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unregister(self.ride_id, self.sub_id);
    }
}

/// Spawn the dispatcher and hand back the topic's send side. The task
/// exits when every publisher handle is gone (teardown drops the state).
pub fn start_dispatcher(
    registry: Arc<TrackingRegistry>,
) -> (mpsc::Sender<LocationUpdate>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<LocationUpdate>(TOPIC_BUFFER);

    let handle = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            let ride_id = update.ride_id;
            let event = LocationEvent::from(update);
            registry.broadcast(ride_id, &event);
        }
        tracing::debug!("tracking dispatcher stopped");
    });

    (tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(driver_id: Uuid) -> LocationEvent {
        LocationEvent {
            driver_id,
            lat: 12.97,
            lng: 77.59,
            heading: None,
            speed: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber_of_the_ride() {
        let registry = Arc::new(TrackingRegistry::new());
        let ride = Uuid::new_v4();
        let other_ride = Uuid::new_v4();

        let mut sub_a = Arc::clone(&registry).subscribe(ride);
        let mut sub_b = Arc::clone(&registry).subscribe(ride);
        let mut other = Arc::clone(&registry).subscribe(other_ride);

        let driver = Uuid::new_v4();
        registry.broadcast(ride, &event(driver));

        assert_eq!(sub_a.receiver.recv().await.unwrap().driver_id, driver);
        assert_eq!(sub_b.receiver.recv().await.unwrap().driver_id, driver);
        assert!(other.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let registry = Arc::new(TrackingRegistry::new());
        let ride = Uuid::new_v4();
        let mut sub = Arc::clone(&registry).subscribe(ride);

        let driver = Uuid::new_v4();
        for _ in 0..SUBSCRIBER_BUFFER + 5 {
            registry.broadcast(ride, &event(driver));
        }

        // Exactly the buffered messages arrive; the rest were dropped.
        let mut received = 0;
        while sub.receiver.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, SUBSCRIBER_BUFFER);
    }

    #[tokio::test]
    async fn dropping_a_subscription_unregisters_it() {
        let registry = Arc::new(TrackingRegistry::new());
        let ride = Uuid::new_v4();

        let sub = Arc::clone(&registry).subscribe(ride);
        assert_eq!(registry.subscriber_count(ride), 1);
        drop(sub);
        assert_eq!(registry.subscriber_count(ride), 0);
    }

    #[tokio::test]
    async fn dispatcher_routes_topic_messages_to_subscribers() {
        let registry = Arc::new(TrackingRegistry::new());
        let (topic, handle) = start_dispatcher(Arc::clone(&registry));

        let ride = Uuid::new_v4();
        let driver = Uuid::new_v4();
        let mut sub = Arc::clone(&registry).subscribe(ride);

        topic
            .send(LocationUpdate {
                ride_id: ride,
                driver_id: driver,
                lat: 1.0,
                lng: 2.0,
                heading: Some(90.0),
                speed: None,
            })
            .await
            .unwrap();

        let received = sub.receiver.recv().await.unwrap();
        assert_eq!(received.driver_id, driver);
        assert_eq!(received.heading, Some(90.0));

        drop(topic);
        handle.await.unwrap();
    }
}
