// src/repository/ride_repo.rs
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::errors::KiteResult;
use crate::models::driver::VehicleClass;
use crate::models::payment::PaymentMethod;
use crate::models::ride::{CancelActor, Ride, RideStatus};

const COLUMNS: &str = "id, user_id, driver_id, \
    pickup_lat::float8 AS pickup_lat, pickup_lng::float8 AS pickup_lng, pickup_address, \
    dropoff_lat::float8 AS dropoff_lat, dropoff_lng::float8 AS dropoff_lng, dropoff_address, \
    vehicle_class, status, estimated_fare::float8 AS estimated_fare, \
    surge_multiplier::float8 AS surge_multiplier, \
    estimated_distance_km::float8 AS estimated_distance_km, estimated_duration_min, \
    payment_method, idempotency_key, cancelled_by, cancellation_reason, \
    created_at, updated_at";

#[derive(Clone)]
pub struct RideRepository {
    pool: PgPool,
}

pub struct NewRide<'a> {
    pub user_id: Uuid,
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub pickup_address: Option<&'a str>,
    pub dropoff_lat: f64,
    pub dropoff_lng: f64,
    pub dropoff_address: Option<&'a str>,
    pub vehicle_class: VehicleClass,
    pub payment_method: PaymentMethod,
    pub estimated_fare: f64,
    pub surge_multiplier: f64,
    pub estimated_distance_km: f64,
    pub estimated_duration_min: i32,
    pub idempotency_key: Option<&'a str>,
}

impl RideRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: NewRide<'_>) -> Result<Ride, sqlx::Error> {
        let query = format!(
            "INSERT INTO rides \
                (id, user_id, pickup_lat, pickup_lng, pickup_address, \
                 dropoff_lat, dropoff_lng, dropoff_address, vehicle_class, status, \
                 estimated_fare, surge_multiplier, estimated_distance_km, \
                 estimated_duration_min, payment_method, idempotency_key) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', \
                     $10, $11, $12, $13, $14, $15) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Ride>(&query)
            .bind(Uuid::new_v4())
            .bind(new.user_id)
            .bind(new.pickup_lat)
            .bind(new.pickup_lng)
            .bind(new.pickup_address)
            .bind(new.dropoff_lat)
            .bind(new.dropoff_lng)
            .bind(new.dropoff_address)
            .bind(new.vehicle_class)
            .bind(new.estimated_fare)
            .bind(new.surge_multiplier)
            .bind(new.estimated_distance_km)
            .bind(new.estimated_duration_min)
            .bind(new.payment_method)
            .bind(new.idempotency_key)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn get_by_id(&self, id: Uuid) -> KiteResult<Option<Ride>> {
        let query = format!("SELECT {COLUMNS} FROM rides WHERE id = $1");
        let ride = sqlx::query_as::<_, Ride>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ride)
    }

    pub async fn get_by_idempotency_key(&self, key: &str) -> KiteResult<Option<Ride>> {
        let query = format!("SELECT {COLUMNS} FROM rides WHERE idempotency_key = $1");
        let ride = sqlx::query_as::<_, Ride>(&query)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ride)
    }

    /// Row-lock read. Every state change to a ride goes through this inside
    /// a transaction so transitions serialize per ride.
    pub async fn get_by_id_for_update(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
    ) -> KiteResult<Option<Ride>> {
        let query = format!("SELECT {COLUMNS} FROM rides WHERE id = $1 FOR UPDATE");
        let ride = sqlx::query_as::<_, Ride>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(ride)
    }

    pub async fn update_status(&self, id: Uuid, status: RideStatus) -> KiteResult<()> {
        sqlx::query("UPDATE rides SET status = $1, updated_at = now() WHERE id = $2")
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
        status: RideStatus,
    ) -> KiteResult<()> {
        sqlx::query("UPDATE rides SET status = $1, updated_at = now() WHERE id = $2")
            .bind(status)
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Assignment inside the accept transaction: driver + status in one
    /// statement.
    pub async fn assign_driver_tx(
        &self,
        conn: &mut PgConnection,
        ride_id: Uuid,
        driver_id: Uuid,
    ) -> KiteResult<()> {
        sqlx::query(
            "UPDATE rides SET driver_id = $1, status = 'driver_assigned', \
             updated_at = now() WHERE id = $2",
        )
        .bind(driver_id)
        .bind(ride_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn cancel_tx(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        cancelled_by: CancelActor,
        reason: Option<&str>,
    ) -> KiteResult<()> {
        sqlx::query(
            "UPDATE rides SET status = 'cancelled', cancelled_by = $1, \
             cancellation_reason = $2, updated_at = now() WHERE id = $3",
        )
        .bind(cancelled_by)
        .bind(reason)
        .bind(id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn get_active_by_user(&self, user_id: Uuid) -> KiteResult<Option<Ride>> {
        let query = format!(
            "SELECT {COLUMNS} FROM rides \
             WHERE user_id = $1 AND status NOT IN ('completed', 'cancelled') \
             ORDER BY created_at DESC LIMIT 1"
        );
        let ride = sqlx::query_as::<_, Ride>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ride)
    }

    pub async fn get_active_by_driver(&self, driver_id: Uuid) -> KiteResult<Option<Ride>> {
        let query = format!(
            "SELECT {COLUMNS} FROM rides \
             WHERE driver_id = $1 AND status NOT IN ('completed', 'cancelled') \
             ORDER BY created_at DESC LIMIT 1"
        );
        let ride = sqlx::query_as::<_, Ride>(&query)
            .bind(driver_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ride)
    }
}
