// src/repository/trip_repo.rs
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::errors::KiteResult;
use crate::models::trip::{FareBreakdown, Trip, TripStatus};

const COLUMNS: &str = "id, ride_id, driver_id, user_id, status, start_time, end_time, \
    pause_duration_secs, actual_distance_km::float8 AS actual_distance_km, \
    actual_duration_min, route_polyline, \
    base_fare::float8 AS base_fare, distance_fare::float8 AS distance_fare, \
    time_fare::float8 AS time_fare, surge_amount::float8 AS surge_amount, \
    total_fare::float8 AS total_fare, created_at, updated_at";

#[derive(Clone)]
pub struct TripRepository {
    pool: PgPool,
}

impl TripRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert inside the trip-start transaction. The unique `ride_id`
    /// constraint makes concurrent starts collapse to one trip.
    pub async fn create_tx(
        &self,
        conn: &mut PgConnection,
        ride_id: Uuid,
        driver_id: Uuid,
        user_id: Uuid,
    ) -> Result<Trip, sqlx::Error> {
        let query = format!(
            "INSERT INTO trips \
                (id, ride_id, driver_id, user_id, status, start_time, pause_duration_secs) \
             VALUES ($1, $2, $3, $4, 'started', now(), 0) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Trip>(&query)
            .bind(Uuid::new_v4())
            .bind(ride_id)
            .bind(driver_id)
            .bind(user_id)
            .fetch_one(conn)
            .await
    }

    pub async fn get_by_id(&self, id: Uuid) -> KiteResult<Option<Trip>> {
        let query = format!("SELECT {COLUMNS} FROM trips WHERE id = $1");
        let trip = sqlx::query_as::<_, Trip>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(trip)
    }

    pub async fn get_by_ride_id_tx(
        &self,
        conn: &mut PgConnection,
        ride_id: Uuid,
    ) -> KiteResult<Option<Trip>> {
        let query = format!("SELECT {COLUMNS} FROM trips WHERE ride_id = $1");
        let trip = sqlx::query_as::<_, Trip>(&query)
            .bind(ride_id)
            .fetch_optional(conn)
            .await?;
        Ok(trip)
    }

    /// Row-lock read; pause, resume, and settlement serialize on it.
    pub async fn get_by_id_for_update(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
    ) -> KiteResult<Option<Trip>> {
        let query = format!("SELECT {COLUMNS} FROM trips WHERE id = $1 FOR UPDATE");
        let trip = sqlx::query_as::<_, Trip>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(trip)
    }

    pub async fn update_status_tx(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        status: TripStatus,
    ) -> KiteResult<()> {
        sqlx::query("UPDATE trips SET status = $1, updated_at = now() WHERE id = $2")
            .bind(status)
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Resume from pause, folding the elapsed pause into the accumulator in
    /// the same statement.
    pub async fn resume_tx(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        additional_pause_secs: i32,
    ) -> KiteResult<()> {
        sqlx::query(
            "UPDATE trips SET status = 'started', \
             pause_duration_secs = pause_duration_secs + $1, updated_at = now() \
             WHERE id = $2",
        )
        .bind(additional_pause_secs)
        .bind(id)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Settlement write: end time, actuals, and the full fare breakdown.
    pub async fn end_trip_tx(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        distance_km: f64,
        duration_min: i32,
        fare: &FareBreakdown,
    ) -> KiteResult<Trip> {
        let query = format!(
            "UPDATE trips SET status = 'completed', end_time = now(), \
                actual_distance_km = $1, actual_duration_min = $2, \
                base_fare = $3, distance_fare = $4, time_fare = $5, \
                surge_amount = $6, total_fare = $7, updated_at = now() \
             WHERE id = $8 \
             RETURNING {COLUMNS}"
        );
        let trip = sqlx::query_as::<_, Trip>(&query)
            .bind(distance_km)
            .bind(duration_min)
            .bind(fare.base_fare)
            .bind(fare.distance_fare)
            .bind(fare.time_fare)
            .bind(fare.surge_amount)
            .bind(fare.total)
            .bind(id)
            .fetch_one(conn)
            .await?;
        Ok(trip)
    }
}
