// src/cache/spatial.rs
use redis::aio::ConnectionManager;
use redis::geo::{Coord, RadiusOptions, RadiusOrder, RadiusSearchResult, Unit};
use redis::AsyncCommands;
use uuid::Uuid;

use crate::errors::KiteResult;
use crate::models::driver::VehicleClass;

const GEO_KEY_PREFIX: &str = "drivers:locations:";

/// A driver id with its distance from the query center, kilometers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearbyDriver {
    pub driver_id: Uuid,
    pub distance_km: f64,
}

/// Geo-indexed positions of online drivers, one sorted set per vehicle
/// class. Derived data: rebuildable from location pings, bounded by the
/// presence TTL.
#[derive(Clone)]
pub struct SpatialIndex {
    conn: ConnectionManager,
}

impl SpatialIndex {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn geo_key(class: VehicleClass) -> String {
        format!("{GEO_KEY_PREFIX}{class}")
    }

    pub async fn upsert(
        &self,
        class: VehicleClass,
        driver_id: Uuid,
        lat: f64,
        lng: f64,
    ) -> KiteResult<()> {
        let mut conn = self.conn.clone();
        let _: usize = conn
            .geo_add(
                Self::geo_key(class),
                (Coord::lon_lat(lng, lat), driver_id.to_string()),
            )
            .await?;
        Ok(())
    }

    pub async fn remove(&self, class: VehicleClass, driver_id: Uuid) -> KiteResult<()> {
        let mut conn = self.conn.clone();
        let _: usize = conn
            .zrem(Self::geo_key(class), driver_id.to_string())
            .await?;
        Ok(())
    }

    /// Radius query, distances ascending. Entries whose member is not a
    /// uuid are skipped rather than failing the read.
    pub async fn nearby(
        &self,
        class: VehicleClass,
        lat: f64,
        lng: f64,
        radius_km: f64,
        limit: usize,
    ) -> KiteResult<Vec<NearbyDriver>> {
        let mut conn = self.conn.clone();
        let opts = RadiusOptions::default()
            .with_dist()
            .order(RadiusOrder::Asc)
            .limit(limit);

        let results: Vec<RadiusSearchResult> = conn
            .geo_radius(Self::geo_key(class), lng, lat, radius_km, Unit::Kilometers, opts)
            .await?;

        let nearby = results
            .into_iter()
            .filter_map(|r| {
                let driver_id = Uuid::parse_str(&r.name).ok()?;
                Some(NearbyDriver {
                    driver_id,
                    distance_km: r.dist.unwrap_or(0.0),
                })
            })
            .collect();

        Ok(nearby)
    }
}
