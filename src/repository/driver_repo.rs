// src/repository/driver_repo.rs
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::errors::KiteResult;
use crate::models::driver::{Driver, DriverStatus, VehicleClass};

const COLUMNS: &str = "id, phone, name, email, license_number, vehicle_class, \
    vehicle_number, status, rating::float8 AS rating, total_trips, \
    current_lat::float8 AS current_lat, current_lng::float8 AS current_lng, \
    created_at, updated_at";

#[derive(Clone)]
pub struct DriverRepository {
    pool: PgPool,
}

pub struct NewDriver<'a> {
    pub phone: &'a str,
    pub name: &'a str,
    pub email: Option<&'a str>,
    pub license_number: &'a str,
    pub vehicle_class: VehicleClass,
    pub vehicle_number: &'a str,
}

impl DriverRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: NewDriver<'_>) -> Result<Driver, sqlx::Error> {
        let query = format!(
            "INSERT INTO drivers \
                (id, phone, name, email, license_number, vehicle_class, \
                 vehicle_number, status, rating, total_trips) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'offline', 5.0, 0) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Driver>(&query)
            .bind(Uuid::new_v4())
            .bind(new.phone)
            .bind(new.name)
            .bind(new.email)
            .bind(new.license_number)
            .bind(new.vehicle_class)
            .bind(new.vehicle_number)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn get_by_id(&self, id: Uuid) -> KiteResult<Option<Driver>> {
        let query = format!("SELECT {COLUMNS} FROM drivers WHERE id = $1");
        let driver = sqlx::query_as::<_, Driver>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(driver)
    }

    pub async fn get_by_phone(&self, phone: &str) -> KiteResult<Option<Driver>> {
        let query = format!("SELECT {COLUMNS} FROM drivers WHERE phone = $1");
        let driver = sqlx::query_as::<_, Driver>(&query)
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;
        Ok(driver)
    }

    pub async fn update_status(&self, id: Uuid, status: DriverStatus) -> KiteResult<()> {
        sqlx::query("UPDATE drivers SET status = $1, updated_at = now() WHERE id = $2")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Status flip inside the accept transaction.
    pub async fn update_status_tx(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        status: DriverStatus,
    ) -> KiteResult<()> {
        sqlx::query("UPDATE drivers SET status = $1, updated_at = now() WHERE id = $2")
            .bind(status)
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Secondary location write; the presence cache is the primary.
    pub async fn update_location(&self, id: Uuid, lat: f64, lng: f64) -> KiteResult<()> {
        sqlx::query(
            "UPDATE drivers SET current_lat = $1, current_lng = $2, updated_at = now() \
             WHERE id = $3",
        )
        .bind(lat)
        .bind(lng)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn increment_total_trips(&self, id: Uuid) -> KiteResult<()> {
        sqlx::query(
            "UPDATE drivers SET total_trips = total_trips + 1, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Matching fallback when the spatial index comes back empty: online
    /// drivers of the class that have reported coordinates at least once.
    pub async fn get_online_by_class(&self, class: VehicleClass) -> KiteResult<Vec<Driver>> {
        let query = format!(
            "SELECT {COLUMNS} FROM drivers \
             WHERE status = 'online' AND vehicle_class = $1 \
               AND current_lat IS NOT NULL AND current_lng IS NOT NULL"
        );
        let drivers = sqlx::query_as::<_, Driver>(&query)
            .bind(class)
            .fetch_all(&self.pool)
            .await?;
        Ok(drivers)
    }
}
