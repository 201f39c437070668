// src/services/trip_service.rs
use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::cache::PresenceCache;
use crate::errors::{KiteError, KiteResult};
use crate::models::driver::DriverStatus;
use crate::models::ride::RideStatus;
use crate::models::trip::{EndTripRequest, Trip, TripStatus};
use crate::repository::{DriverRepository, RideRepository, TripRepository};
use crate::services::pricing_service::PricingService;

pub struct TripService {
    pool: PgPool,
    trip_repo: TripRepository,
    ride_repo: RideRepository,
    driver_repo: DriverRepository,
    pricing: Arc<PricingService>,
    presence: PresenceCache,
}

impl TripService {
    pub fn new(
        pool: PgPool,
        trip_repo: TripRepository,
        ride_repo: RideRepository,
        driver_repo: DriverRepository,
        pricing: Arc<PricingService>,
        presence: PresenceCache,
    ) -> Self {
        Self {
            pool,
            trip_repo,
            ride_repo,
            driver_repo,
            pricing,
            presence,
        }
    }

    /// Start the trip for a ride whose driver has arrived. Idempotent: a
    /// second start returns the existing trip. The ride advances to
    /// `in_progress` in the same transaction, under its row lock.
    pub async fn start_trip(&self, ride_id: Uuid) -> KiteResult<Trip> {
        let mut tx = self.pool.begin().await?;

        let ride = self
            .ride_repo
            .get_by_id_for_update(&mut *tx, ride_id)
            .await?
            .ok_or_else(|| KiteError::not_found("ride"))?;

        if let Some(existing) = self.trip_repo.get_by_ride_id_tx(&mut *tx, ride_id).await? {
            return Ok(existing);
        }

        if ride.status != RideStatus::DriverArrived {
            return Err(KiteError::bad_request(
                "driver must arrive before starting trip",
            ));
        }
        let driver_id = ride
            .driver_id
            .ok_or_else(|| KiteError::bad_request("no driver assigned"))?;

        let trip = match self
            .trip_repo
            .create_tx(&mut *tx, ride_id, driver_id, ride.user_id)
            .await
        {
            Ok(trip) => trip,
            Err(err) => return Err(err.into()),
        };

        self.ride_repo
            .update_status_tx(&mut *tx, ride_id, RideStatus::InProgress)
            .await?;

        tx.commit().await?;

        tracing::info!(trip_id = %trip.id, %ride_id, "trip started");
        Ok(trip)
    }

    pub async fn get_trip(&self, id: Uuid) -> KiteResult<Trip> {
        self.trip_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| KiteError::not_found("trip"))
    }

    pub async fn pause_trip(&self, id: Uuid) -> KiteResult<()> {
        let mut tx = self.pool.begin().await?;

        let trip = self
            .trip_repo
            .get_by_id_for_update(&mut *tx, id)
            .await?
            .ok_or_else(|| KiteError::not_found("trip"))?;

        if !trip.can_transition_to(TripStatus::Paused) {
            return Err(KiteError::invalid_transition(trip.status, TripStatus::Paused));
        }

        self.trip_repo
            .update_status_tx(&mut *tx, id, TripStatus::Paused)
            .await?;
        tx.commit().await?;

        tracing::info!(trip_id = %id, "trip paused");
        Ok(())
    }

    /// Resume accumulates the elapsed pause. `updated_at` was written by
    /// the pause transition and nothing else can touch a paused trip, so
    /// the delta since then is the pause length.
    pub async fn resume_trip(&self, id: Uuid) -> KiteResult<()> {
        let mut tx = self.pool.begin().await?;

        let trip = self
            .trip_repo
            .get_by_id_for_update(&mut *tx, id)
            .await?
            .ok_or_else(|| KiteError::not_found("trip"))?;

        if trip.status != TripStatus::Paused {
            return Err(KiteError::bad_request("trip is not paused"));
        }

        let paused_secs = (Utc::now() - trip.updated_at).num_seconds().max(0) as i32;
        self.trip_repo
            .resume_tx(&mut *tx, id, paused_secs)
            .await?;
        tx.commit().await?;

        tracing::info!(trip_id = %id, paused_secs, "trip resumed");
        Ok(())
    }

    /// Settlement. Locks the trip, computes actual distance and duration,
    /// prices with the surge captured on the ride at creation, and advances
    /// trip and ride together.
    pub async fn end_trip(&self, id: Uuid, req: &EndTripRequest) -> KiteResult<Trip> {
        let mut tx = self.pool.begin().await?;

        let trip = self
            .trip_repo
            .get_by_id_for_update(&mut *tx, id)
            .await?
            .ok_or_else(|| KiteError::not_found("trip"))?;

        if !trip.can_transition_to(TripStatus::Completed) {
            return Err(KiteError::invalid_transition(
                trip.status,
                TripStatus::Completed,
            ));
        }

        let ride = self
            .ride_repo
            .get_by_id_for_update(&mut *tx, trip.ride_id)
            .await?
            .ok_or_else(|| KiteError::not_found("ride"))?;

        let distance_km = if let Some(odometer) = req.odometer_km {
            odometer
        } else if let Some(estimated) = ride.estimated_distance_km {
            estimated
        } else {
            self.pricing.estimate_distance_km(
                ride.pickup_lat,
                ride.pickup_lng,
                req.end_lat,
                req.end_lng,
            )
        };

        let elapsed_min = (Utc::now() - trip.start_time).num_minutes() as i32;
        let duration_min = (elapsed_min - trip.pause_duration_secs / 60).max(1);

        // Settle with the surge quoted to the rider when the ride was
        // created, never a re-measurement.
        let fare = self.pricing.settle_fare(
            ride.vehicle_class,
            distance_km,
            duration_min,
            ride.surge_multiplier,
        );

        let trip = self
            .trip_repo
            .end_trip_tx(&mut *tx, id, distance_km, duration_min, &fare)
            .await?;

        if ride.can_transition_to(RideStatus::Completed) {
            self.ride_repo
                .update_status_tx(&mut *tx, ride.id, RideStatus::Completed)
                .await?;
        }

        tx.commit().await?;

        // Driver bookkeeping and cache cleanup are post-commit, logged on
        // failure.
        if let Err(err) = self
            .driver_repo
            .update_status(trip.driver_id, DriverStatus::Online)
            .await
        {
            tracing::warn!(error = %err, driver_id = %trip.driver_id, "failed to release driver");
        }
        if let Err(err) = self.driver_repo.increment_total_trips(trip.driver_id).await {
            tracing::warn!(error = %err, driver_id = %trip.driver_id, "failed to bump trip count");
        }
        if let Err(err) = self.presence.clear_active_ride(trip.driver_id).await {
            tracing::warn!(error = %err, driver_id = %trip.driver_id, "failed to clear driver pointer");
        }
        if let Err(err) = self.presence.clear_user_active_ride(trip.user_id).await {
            tracing::warn!(error = %err, user_id = %trip.user_id, "failed to clear user pointer");
        }

        tracing::info!(
            trip_id = %trip.id,
            total = fare.total,
            distance_km,
            duration_min,
            "trip completed"
        );

        Ok(trip)
    }
}
