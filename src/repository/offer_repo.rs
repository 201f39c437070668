// src/repository/offer_repo.rs
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::errors::KiteResult;
use crate::models::offer::{OfferStatus, RideOffer};

const COLUMNS: &str = "id, ride_id, driver_id, status, offered_at, responded_at, expires_at";

#[derive(Clone)]
pub struct RideOfferRepository {
    pool: PgPool,
}

impl RideOfferRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a pending offer. The `(ride_id, driver_id)` unique constraint
    /// surfaces duplicate fan-out as a unique violation the caller can skip.
    pub async fn create(
        &self,
        ride_id: Uuid,
        driver_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<RideOffer, sqlx::Error> {
        let query = format!(
            "INSERT INTO ride_offers (id, ride_id, driver_id, status, offered_at, expires_at) \
             VALUES ($1, $2, $3, 'pending', now(), $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RideOffer>(&query)
            .bind(Uuid::new_v4())
            .bind(ride_id)
            .bind(driver_id)
            .bind(expires_at)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn get_by_id(&self, id: Uuid) -> KiteResult<Option<RideOffer>> {
        let query = format!("SELECT {COLUMNS} FROM ride_offers WHERE id = $1");
        let offer = sqlx::query_as::<_, RideOffer>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(offer)
    }

    pub async fn get_by_ride_and_driver(
        &self,
        ride_id: Uuid,
        driver_id: Uuid,
    ) -> KiteResult<Option<RideOffer>> {
        let query =
            format!("SELECT {COLUMNS} FROM ride_offers WHERE ride_id = $1 AND driver_id = $2");
        let offer = sqlx::query_as::<_, RideOffer>(&query)
            .bind(ride_id)
            .bind(driver_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(offer)
    }

    /// Offers a polling driver should still see: pending and not yet past
    /// expiry. The predicate is the expiry guard; no sweep required.
    pub async fn get_pending_by_driver(&self, driver_id: Uuid) -> KiteResult<Vec<RideOffer>> {
        let query = format!(
            "SELECT {COLUMNS} FROM ride_offers \
             WHERE driver_id = $1 AND status = 'pending' AND expires_at > now() \
             ORDER BY offered_at DESC"
        );
        let offers = sqlx::query_as::<_, RideOffer>(&query)
            .bind(driver_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(offers)
    }

    /// Lock the offer row first; the accept transaction orders offer before
    /// ride.
    pub async fn get_by_id_for_update(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
    ) -> KiteResult<Option<RideOffer>> {
        let query = format!("SELECT {COLUMNS} FROM ride_offers WHERE id = $1 FOR UPDATE");
        let offer = sqlx::query_as::<_, RideOffer>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(offer)
    }

    pub async fn update_status(&self, id: Uuid, status: OfferStatus) -> KiteResult<()> {
        sqlx::query("UPDATE ride_offers SET status = $1, responded_at = now() WHERE id = $2")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_status_tx(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        status: OfferStatus,
    ) -> KiteResult<()> {
        sqlx::query("UPDATE ride_offers SET status = $1, responded_at = now() WHERE id = $2")
            .bind(status)
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Expire every sibling offer of a ride that is still pending. Used by
    /// the accept transaction after the winner is recorded. Rows a
    /// concurrent accept already holds are skipped instead of deadlocking
    /// against it; that accept loses on the ride status check and its offer
    /// resolves by passive expiry.
    pub async fn expire_pending_for_ride_tx(
        &self,
        conn: &mut PgConnection,
        ride_id: Uuid,
    ) -> KiteResult<()> {
        sqlx::query(
            "UPDATE ride_offers SET status = 'expired', responded_at = now() \
             WHERE id IN ( \
                 SELECT id FROM ride_offers \
                 WHERE ride_id = $1 AND status = 'pending' \
                 FOR UPDATE SKIP LOCKED \
             )",
        )
        .bind(ride_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Housekeeping sweep: flips stale pending offers to expired. The
    /// read-path predicate keeps correctness either way.
    pub async fn expire_stale(&self) -> KiteResult<u64> {
        let result = sqlx::query(
            "UPDATE ride_offers SET status = 'expired', responded_at = now() \
             WHERE status = 'pending' AND expires_at <= now()",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
