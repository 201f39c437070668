// src/services/ride_service.rs
use std::sync::Arc;

use uuid::Uuid;

use crate::cache::{PresenceCache, SpatialIndex};
use crate::errors::{KiteError, KiteResult};
use crate::models::driver::DriverStatus;
use crate::models::ride::{CancelRideRequest, CreateRideRequest, Ride, RideResponse, RideStatus};
use crate::repository::{self, DriverRepository, RideRepository, UserRepository};
use crate::services::pricing_service::PricingService;

/// Radius used to sample supply around the pickup for surge estimation.
const SURGE_PROBE_RADIUS_KM: f64 = 2.0;
/// Fewer candidates than this near the pickup triggers a surge computation.
const SURGE_SUPPLY_FLOOR: usize = 5;
const SURGE_PROBE_DEMAND: usize = 10;

pub struct RideService {
    ride_repo: RideRepository,
    user_repo: UserRepository,
    driver_repo: DriverRepository,
    pricing: Arc<PricingService>,
    presence: PresenceCache,
    spatial: SpatialIndex,
    pool: sqlx::PgPool,
}

impl RideService {
    pub fn new(
        ride_repo: RideRepository,
        user_repo: UserRepository,
        driver_repo: DriverRepository,
        pricing: Arc<PricingService>,
        presence: PresenceCache,
        spatial: SpatialIndex,
        pool: sqlx::PgPool,
    ) -> Self {
        Self {
            ride_repo,
            user_repo,
            driver_repo,
            pricing,
            presence,
            spatial,
            pool,
        }
    }

    /// Create a ride and advance it to `matching`. Idempotent against the
    /// caller's idempotency key: a replay returns the stored ride unchanged.
    pub async fn create_ride(
        &self,
        req: &CreateRideRequest,
        idempotency_key: Option<&str>,
    ) -> KiteResult<Ride> {
        if let Some(key) = idempotency_key {
            if let Some(existing) = self.ride_repo.get_by_idempotency_key(key).await? {
                tracing::debug!(ride_id = %existing.id, "idempotent ride create replay");
                return Ok(existing);
            }
        }

        let user = self
            .user_repo
            .get_by_id(req.user_id)
            .await?
            .ok_or_else(|| KiteError::not_found("user"))?;

        // One active ride per rider.
        if self.ride_repo.get_active_by_user(user.id).await?.is_some() {
            return Err(KiteError::ActiveRideExists);
        }

        let distance_km = self.pricing.estimate_distance_km(
            req.pickup.lat,
            req.pickup.lng,
            req.dropoff.lat,
            req.dropoff.lng,
        );
        let duration_min = self.pricing.estimate_duration_min(distance_km);

        let surge_multiplier = self.estimate_surge(req).await;
        let fare = self.pricing.estimate_fare(
            req.vehicle_class,
            distance_km,
            duration_min,
            surge_multiplier,
        );

        let created = self
            .ride_repo
            .create(repository::ride_repo::NewRide {
                user_id: user.id,
                pickup_lat: req.pickup.lat,
                pickup_lng: req.pickup.lng,
                pickup_address: req.pickup.address.as_deref(),
                dropoff_lat: req.dropoff.lat,
                dropoff_lng: req.dropoff.lng,
                dropoff_address: req.dropoff.address.as_deref(),
                vehicle_class: req.vehicle_class,
                payment_method: req.payment_method,
                estimated_fare: fare.total,
                surge_multiplier,
                estimated_distance_km: distance_km,
                estimated_duration_min: duration_min,
                idempotency_key,
            })
            .await;

        let mut ride = match created {
            Ok(ride) => ride,
            // Two identical requests raced past the read above; the loser
            // returns the winner's row.
            Err(err) if repository::is_unique_violation(&err) => {
                if let Some(key) = idempotency_key {
                    if let Some(existing) = self.ride_repo.get_by_idempotency_key(key).await? {
                        return Ok(existing);
                    }
                }
                // The one-active-ride index caught a race the read above
                // missed.
                if repository::violated_constraint(&err) == Some("idx_rides_one_active_per_user") {
                    return Err(KiteError::ActiveRideExists);
                }
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };

        self.ride_repo
            .update_status(ride.id, RideStatus::Matching)
            .await?;
        ride.status = RideStatus::Matching;

        tracing::info!(
            ride_id = %ride.id,
            user_id = %ride.user_id,
            fare = fare.total,
            surge = surge_multiplier,
            "ride created"
        );

        Ok(ride)
    }

    /// Surge from the pickup cell: thin supply nearby means the estimate
    /// carries a multiplier the settlement will reuse.
    async fn estimate_surge(&self, req: &CreateRideRequest) -> f64 {
        let nearby = match self
            .spatial
            .nearby(
                req.vehicle_class,
                req.pickup.lat,
                req.pickup.lng,
                SURGE_PROBE_RADIUS_KM,
                50,
            )
            .await
        {
            Ok(nearby) => nearby,
            Err(err) => {
                tracing::warn!(error = %err, "surge probe failed, defaulting to 1.0");
                return 1.0;
            }
        };

        let mut online = 0usize;
        for candidate in &nearby {
            match self.presence.get_meta(candidate.driver_id).await {
                Ok(Some(meta)) if meta.status == DriverStatus::Online => online += 1,
                _ => {}
            }
        }

        if online < SURGE_SUPPLY_FLOOR {
            self.pricing.surge_multiplier(SURGE_PROBE_DEMAND, online)
        } else {
            1.0
        }
    }

    /// Fetch a ride with its rider and, when assigned, the driver carrying
    /// the freshest cached position.
    pub async fn get_ride(&self, id: Uuid) -> KiteResult<RideResponse> {
        let ride = self
            .ride_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| KiteError::not_found("ride"))?;

        let mut response = ride.to_response();

        if let Some(user) = self.user_repo.get_by_id(ride.user_id).await? {
            response.user = Some(user.to_response());
        }

        if let Some(driver_id) = ride.driver_id {
            if let Some(driver) = self.driver_repo.get_by_id(driver_id).await? {
                let mut driver_response = driver.to_response();
                if let Ok(Some(loc)) = self.presence.get_location(driver_id).await {
                    driver_response.current_lat = Some(loc.lat);
                    driver_response.current_lng = Some(loc.lng);
                }
                response.driver = Some(driver_response);
            }
        }

        Ok(response)
    }

    /// Cancel from any non-terminal state, releasing an assigned driver
    /// back to `online`. Serialized on the ride row.
    pub async fn cancel_ride(&self, id: Uuid, req: &CancelRideRequest) -> KiteResult<()> {
        let mut tx = self.pool.begin().await?;

        let ride = self
            .ride_repo
            .get_by_id_for_update(&mut *tx, id)
            .await?
            .ok_or_else(|| KiteError::not_found("ride"))?;

        if !ride.can_transition_to(RideStatus::Cancelled) {
            return Err(KiteError::invalid_transition(
                ride.status,
                RideStatus::Cancelled,
            ));
        }

        self.ride_repo
            .cancel_tx(&mut *tx, id, req.cancelled_by, req.reason.as_deref())
            .await?;

        if let Some(driver_id) = ride.driver_id {
            self.driver_repo
                .update_status_tx(&mut *tx, driver_id, DriverStatus::Online)
                .await?;
        }

        tx.commit().await?;

        // Cache cleanup is best effort after the commit.
        if let Some(driver_id) = ride.driver_id {
            if let Err(err) = self.presence.clear_active_ride(driver_id).await {
                tracing::warn!(error = %err, %driver_id, "failed to clear driver pointer");
            }
        }
        if let Err(err) = self.presence.clear_user_active_ride(ride.user_id).await {
            tracing::warn!(error = %err, user_id = %ride.user_id, "failed to clear user pointer");
        }

        tracing::info!(ride_id = %id, by = ?req.cancelled_by, "ride cancelled");
        Ok(())
    }

    /// Guarded transition on the ride entity, serialized by its row lock.
    pub async fn update_ride_status(&self, id: Uuid, status: RideStatus) -> KiteResult<Ride> {
        let mut tx = self.pool.begin().await?;

        let ride = self
            .ride_repo
            .get_by_id_for_update(&mut *tx, id)
            .await?
            .ok_or_else(|| KiteError::not_found("ride"))?;

        if !ride.can_transition_to(status) {
            return Err(KiteError::invalid_transition(ride.status, status));
        }

        self.ride_repo
            .update_status_tx(&mut *tx, id, status)
            .await?;
        tx.commit().await?;

        let mut ride = ride;
        ride.status = status;
        Ok(ride)
    }
}
