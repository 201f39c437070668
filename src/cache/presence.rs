// src/cache/presence.rs
use std::collections::HashMap;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::KiteResult;
use crate::models::driver::{DriverStatus, VehicleClass};

const META_KEY_PREFIX: &str = "driver:meta:";
const DRIVER_ACTIVE_KEY_PREFIX: &str = "driver:active:";
const USER_ACTIVE_KEY_PREFIX: &str = "user:active:";

/// Locations older than this are considered stale and expire from the cache.
const LOCATION_TTL_SECS: u64 = 5 * 60;
/// Active-ride pointers hold for at most an hour; trip end clears them
/// explicitly.
const ACTIVE_RIDE_TTL_SECS: u64 = 60 * 60;

/// Last reported position of a driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverLocation {
    pub lat: f64,
    pub lng: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    pub updated_at: i64,
}

/// Live metadata the matcher filters on.
#[derive(Debug, Clone, Copy)]
pub struct DriverMeta {
    pub status: DriverStatus,
    pub vehicle_class: VehicleClass,
    pub rating: f64,
}

/// Per-driver presence records in Redis: a meta hash, a location blob with
/// TTL, and active-ride pointers for driver and rider.
#[derive(Clone)]
pub struct PresenceCache {
    conn: ConnectionManager,
}

impl PresenceCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn meta_key(driver_id: Uuid) -> String {
        format!("{META_KEY_PREFIX}{driver_id}")
    }

    fn location_key(driver_id: Uuid) -> String {
        format!("{META_KEY_PREFIX}{driver_id}:location")
    }

    pub async fn set_meta(
        &self,
        driver_id: Uuid,
        status: DriverStatus,
        vehicle_class: VehicleClass,
        rating: f64,
    ) -> KiteResult<()> {
        let mut conn = self.conn.clone();
        let items = [
            ("status", status.as_str().to_string()),
            ("vehicle_class", vehicle_class.as_str().to_string()),
            ("rating", format!("{rating:.1}")),
        ];
        let _: () = conn.hset_multiple(Self::meta_key(driver_id), &items).await?;
        Ok(())
    }

    pub async fn get_meta(&self, driver_id: Uuid) -> KiteResult<Option<DriverMeta>> {
        let mut conn = self.conn.clone();
        let map: HashMap<String, String> = conn.hgetall(Self::meta_key(driver_id)).await?;
        if map.is_empty() {
            return Ok(None);
        }

        let status = map
            .get("status")
            .and_then(|s| DriverStatus::parse(s))
            .unwrap_or(DriverStatus::Offline);
        let vehicle_class = map
            .get("vehicle_class")
            .and_then(|s| VehicleClass::parse(s))
            .unwrap_or(VehicleClass::Sedan);
        let rating = map
            .get("rating")
            .and_then(|s| s.parse().ok())
            .unwrap_or(5.0);

        Ok(Some(DriverMeta {
            status,
            vehicle_class,
            rating,
        }))
    }

    /// Going offline removes the meta record entirely; the spatial entry is
    /// cleared by the caller.
    pub async fn clear_meta(&self, driver_id: Uuid) -> KiteResult<()> {
        let mut conn = self.conn.clone();
        let _: usize = conn.del(Self::meta_key(driver_id)).await?;
        Ok(())
    }

    pub async fn set_location(&self, driver_id: Uuid, loc: &DriverLocation) -> KiteResult<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(loc)?;
        let _: () = conn
            .set_ex(Self::location_key(driver_id), json, LOCATION_TTL_SECS)
            .await?;
        Ok(())
    }

    pub async fn get_location(&self, driver_id: Uuid) -> KiteResult<Option<DriverLocation>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(Self::location_key(driver_id)).await?;
        match json {
            Some(json) => Ok(serde_json::from_str(&json).ok()),
            None => Ok(None),
        }
    }

    pub async fn set_active_ride(&self, driver_id: Uuid, ride_id: Uuid) -> KiteResult<()> {
        let mut conn = self.conn.clone();
        let key = format!("{DRIVER_ACTIVE_KEY_PREFIX}{driver_id}");
        let _: () = conn
            .set_ex(key, ride_id.to_string(), ACTIVE_RIDE_TTL_SECS)
            .await?;
        Ok(())
    }

    pub async fn get_active_ride(&self, driver_id: Uuid) -> KiteResult<Option<Uuid>> {
        let mut conn = self.conn.clone();
        let key = format!("{DRIVER_ACTIVE_KEY_PREFIX}{driver_id}");
        let value: Option<String> = conn.get(key).await?;
        Ok(value.and_then(|v| Uuid::parse_str(&v).ok()))
    }

    pub async fn clear_active_ride(&self, driver_id: Uuid) -> KiteResult<()> {
        let mut conn = self.conn.clone();
        let key = format!("{DRIVER_ACTIVE_KEY_PREFIX}{driver_id}");
        let _: usize = conn.del(key).await?;
        Ok(())
    }

    pub async fn set_user_active_ride(&self, user_id: Uuid, ride_id: Uuid) -> KiteResult<()> {
        let mut conn = self.conn.clone();
        let key = format!("{USER_ACTIVE_KEY_PREFIX}{user_id}");
        let _: () = conn
            .set_ex(key, ride_id.to_string(), ACTIVE_RIDE_TTL_SECS)
            .await?;
        Ok(())
    }

    pub async fn get_user_active_ride(&self, user_id: Uuid) -> KiteResult<Option<Uuid>> {
        let mut conn = self.conn.clone();
        let key = format!("{USER_ACTIVE_KEY_PREFIX}{user_id}");
        let value: Option<String> = conn.get(key).await?;
        Ok(value.and_then(|v| Uuid::parse_str(&v).ok()))
    }

    pub async fn clear_user_active_ride(&self, user_id: Uuid) -> KiteResult<()> {
        let mut conn = self.conn.clone();
        let key = format!("{USER_ACTIVE_KEY_PREFIX}{user_id}");
        let _: usize = conn.del(key).await?;
        Ok(())
    }
}
