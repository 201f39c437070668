// src/services/driver_service.rs
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::cache::{DriverLocation, PresenceCache, SpatialIndex};
use crate::errors::{KiteError, KiteResult};
use crate::models::driver::{CreateDriverRequest, Driver, DriverStatus, UpdateDriverLocationRequest};
use crate::models::offer::{AcceptOfferRequest, OfferStatus};
use crate::models::ride::{RideResponse, RideStatus};
use crate::repository::{
    self, driver_repo::NewDriver, DriverRepository, RideOfferRepository, RideRepository,
    UserRepository,
};
use crate::tracking::LocationUpdate;

pub struct DriverService {
    pool: PgPool,
    driver_repo: DriverRepository,
    ride_repo: RideRepository,
    offer_repo: RideOfferRepository,
    user_repo: UserRepository,
    presence: PresenceCache,
    spatial: SpatialIndex,
    tracking: mpsc::Sender<LocationUpdate>,
}

impl DriverService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        driver_repo: DriverRepository,
        ride_repo: RideRepository,
        offer_repo: RideOfferRepository,
        user_repo: UserRepository,
        presence: PresenceCache,
        spatial: SpatialIndex,
        tracking: mpsc::Sender<LocationUpdate>,
    ) -> Self {
        Self {
            pool,
            driver_repo,
            ride_repo,
            offer_repo,
            user_repo,
            presence,
            spatial,
            tracking,
        }
    }

    pub async fn create_driver(&self, req: &CreateDriverRequest) -> KiteResult<Driver> {
        if self.driver_repo.get_by_phone(&req.phone).await?.is_some() {
            return Err(KiteError::conflict("driver with this phone already exists"));
        }

        let created = self
            .driver_repo
            .create(NewDriver {
                phone: &req.phone,
                name: &req.name,
                email: req.email.as_deref(),
                license_number: &req.license_number,
                vehicle_class: req.vehicle_class,
                vehicle_number: &req.vehicle_number,
            })
            .await;

        match created {
            Ok(driver) => {
                tracing::info!(driver_id = %driver.id, "driver created");
                Ok(driver)
            }
            Err(err) if repository::is_unique_violation(&err) => {
                Err(KiteError::conflict("driver with this phone already exists"))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get_driver(&self, id: Uuid) -> KiteResult<Driver> {
        let mut driver = self
            .driver_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| KiteError::not_found("driver"))?;

        // Prefer the live cached position over the stale DB columns.
        if let Ok(Some(loc)) = self.presence.get_location(id).await {
            driver.current_lat = Some(loc.lat);
            driver.current_lng = Some(loc.lng);
        }

        Ok(driver)
    }

    pub async fn go_online(&self, id: Uuid) -> KiteResult<()> {
        let driver = self
            .driver_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| KiteError::not_found("driver"))?;

        self.driver_repo
            .update_status(id, DriverStatus::Online)
            .await?;

        if let Err(err) = self
            .presence
            .set_meta(id, DriverStatus::Online, driver.vehicle_class, driver.rating)
            .await
        {
            tracing::warn!(error = %err, driver_id = %id, "failed to set presence meta");
        }

        tracing::info!(driver_id = %id, "driver online");
        Ok(())
    }

    /// Going offline is rejected while a ride is in flight; otherwise the
    /// presence record and spatial entry are removed.
    pub async fn go_offline(&self, id: Uuid) -> KiteResult<()> {
        let driver = self
            .driver_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| KiteError::not_found("driver"))?;

        if self.ride_repo.get_active_by_driver(id).await?.is_some() {
            return Err(KiteError::bad_request("cannot go offline with active ride"));
        }

        self.driver_repo
            .update_status(id, DriverStatus::Offline)
            .await?;

        if let Err(err) = self.presence.clear_meta(id).await {
            tracing::warn!(error = %err, driver_id = %id, "failed to clear presence meta");
        }
        if let Err(err) = self.spatial.remove(driver.vehicle_class, id).await {
            tracing::warn!(error = %err, driver_id = %id, "failed to remove spatial entry");
        }

        tracing::info!(driver_id = %id, "driver offline");
        Ok(())
    }

    /// Location ingest. The cache and spatial index are the primary write;
    /// the durable store keeps a best-effort copy for the matching
    /// fallback. Updates stream to ride subscribers when a trip is live.
    pub async fn update_location(
        &self,
        id: Uuid,
        req: &UpdateDriverLocationRequest,
    ) -> KiteResult<()> {
        let driver = self
            .driver_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| KiteError::not_found("driver"))?;

        if driver.status == DriverStatus::Offline {
            return Err(KiteError::bad_request("driver is offline"));
        }

        let loc = DriverLocation {
            lat: req.lat,
            lng: req.lng,
            heading: req.heading,
            speed: req.speed,
            accuracy: req.accuracy,
            updated_at: Utc::now().timestamp(),
        };

        if let Err(err) = self.presence.set_location(id, &loc).await {
            tracing::warn!(error = %err, driver_id = %id, "failed to cache location");
        }
        if let Err(err) = self
            .spatial
            .upsert(driver.vehicle_class, id, req.lat, req.lng)
            .await
        {
            tracing::warn!(error = %err, driver_id = %id, "failed to update spatial index");
        }
        if let Err(err) = self.driver_repo.update_location(id, req.lat, req.lng).await {
            tracing::warn!(error = %err, driver_id = %id, "failed to persist location");
        }

        if let Ok(Some(ride_id)) = self.presence.get_active_ride(id).await {
            let update = LocationUpdate {
                ride_id,
                driver_id: id,
                lat: req.lat,
                lng: req.lng,
                heading: req.heading,
                speed: req.speed,
            };
            if self.tracking.try_send(update).is_err() {
                tracing::warn!(driver_id = %id, "tracking topic full, dropping update");
            }
        }

        Ok(())
    }

    /// The acceptance protocol: one serializable transaction that locks the
    /// offer, then the ride, and either assigns everything or fails with
    /// the precise reason. Concurrent accepts serialize on the ride row;
    /// exactly one commits.
    pub async fn accept_offer(
        &self,
        driver_id: Uuid,
        req: &AcceptOfferRequest,
    ) -> KiteResult<RideResponse> {
        let mut tx = self.pool.begin().await?;

        let offer = self
            .offer_repo
            .get_by_id_for_update(&mut *tx, req.offer_id)
            .await?
            .ok_or_else(|| KiteError::not_found("offer"))?;

        if offer.driver_id != driver_id {
            return Err(KiteError::unauthorized("offer not for this driver"));
        }
        if offer.ride_id != req.ride_id {
            return Err(KiteError::bad_request("offer ride mismatch"));
        }
        if offer.is_expired(Utc::now()) {
            return Err(KiteError::OfferExpired);
        }
        if offer.status != OfferStatus::Pending {
            return Err(KiteError::bad_request("offer already responded"));
        }

        let ride = self
            .ride_repo
            .get_by_id_for_update(&mut *tx, req.ride_id)
            .await?
            .ok_or_else(|| KiteError::not_found("ride"))?;

        // The authoritative guard: only a ride still in matching can be
        // taken.
        if ride.status != RideStatus::Matching {
            return Err(KiteError::RideAlreadyAssigned);
        }

        self.offer_repo
            .update_status_tx(&mut *tx, offer.id, OfferStatus::Accepted)
            .await?;
        // The one-active-ride-per-driver index turns a same-driver race on
        // two different rides into a domain conflict.
        match self
            .ride_repo
            .assign_driver_tx(&mut *tx, ride.id, driver_id)
            .await
        {
            Ok(()) => {}
            Err(KiteError::Database(ref db_err)) if repository::is_unique_violation(db_err) => {
                return Err(KiteError::ActiveRideExists);
            }
            Err(err) => return Err(err),
        }
        self.driver_repo
            .update_status_tx(&mut *tx, driver_id, DriverStatus::Busy)
            .await?;
        // Losing siblings are resolved in the same commit.
        self.offer_repo
            .expire_pending_for_ride_tx(&mut *tx, ride.id)
            .await?;

        tx.commit().await?;

        if let Err(err) = self.presence.set_active_ride(driver_id, ride.id).await {
            tracing::warn!(error = %err, %driver_id, "failed to set driver pointer");
        }
        if let Err(err) = self
            .presence
            .set_user_active_ride(ride.user_id, ride.id)
            .await
        {
            tracing::warn!(error = %err, user_id = %ride.user_id, "failed to set user pointer");
        }

        tracing::info!(ride_id = %ride.id, %driver_id, "offer accepted");

        let mut response = ride.to_response();
        response.status = RideStatus::DriverAssigned;
        if let Some(user) = self.user_repo.get_by_id(ride.user_id).await? {
            response.user = Some(user.to_response());
        }
        if let Some(driver) = self.driver_repo.get_by_id(driver_id).await? {
            response.driver = Some(driver.to_response());
        }

        Ok(response)
    }

    pub async fn decline_offer(&self, driver_id: Uuid, offer_id: Uuid) -> KiteResult<()> {
        let offer = self
            .offer_repo
            .get_by_id(offer_id)
            .await?
            .ok_or_else(|| KiteError::not_found("offer"))?;

        if offer.driver_id != driver_id {
            return Err(KiteError::unauthorized("offer not for this driver"));
        }
        if offer.is_expired(Utc::now()) {
            return Err(KiteError::OfferExpired);
        }
        if offer.status != OfferStatus::Pending {
            return Err(KiteError::bad_request("offer already responded"));
        }

        self.offer_repo
            .update_status(offer_id, OfferStatus::Declined)
            .await?;

        tracing::info!(%offer_id, %driver_id, "offer declined");
        Ok(())
    }
}
