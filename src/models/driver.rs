// src/models/driver.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

/// Driver availability. `offline <-> online` by the driver's own toggle,
/// `online -> busy` on a successful offer acceptance, `busy -> online` when
/// the trip completes or the ride is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "driver_status", rename_all = "snake_case")]
pub enum DriverStatus {
    Offline,
    Online,
    Busy,
}

impl DriverStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DriverStatus::Offline => "offline",
            DriverStatus::Online => "online",
            DriverStatus::Busy => "busy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "offline" => Some(DriverStatus::Offline),
            "online" => Some(DriverStatus::Online),
            "busy" => Some(DriverStatus::Busy),
            _ => None,
        }
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "vehicle_class", rename_all = "snake_case")]
pub enum VehicleClass {
    Auto,
    Mini,
    Sedan,
    Suv,
}

impl VehicleClass {
    pub fn as_str(self) -> &'static str {
        match self {
            VehicleClass::Auto => "auto",
            VehicleClass::Mini => "mini",
            VehicleClass::Sedan => "sedan",
            VehicleClass::Suv => "suv",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(VehicleClass::Auto),
            "mini" => Some(VehicleClass::Mini),
            "sedan" => Some(VehicleClass::Sedan),
            "suv" => Some(VehicleClass::Suv),
            _ => None,
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Driver {
    pub id: Uuid,
    pub phone: String,
    pub name: String,
    pub email: Option<String>,
    pub license_number: String,
    pub vehicle_class: VehicleClass,
    pub vehicle_number: String,
    pub status: DriverStatus,
    pub rating: f64,
    pub total_trips: i32,
    pub current_lat: Option<f64>,
    pub current_lng: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDriverRequest {
    #[validate(length(min = 10, max = 15))]
    pub phone: String,
    #[validate(length(min = 2, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 1))]
    pub license_number: String,
    pub vehicle_class: VehicleClass,
    #[validate(length(min = 1))]
    pub vehicle_number: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateDriverLocationRequest {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverResponse {
    pub id: Uuid,
    pub phone: String,
    pub name: String,
    pub rating: f64,
    pub vehicle_class: VehicleClass,
    pub vehicle_number: String,
    pub status: DriverStatus,
    pub total_trips: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_lng: Option<f64>,
}

impl Driver {
    pub fn to_response(&self) -> DriverResponse {
        DriverResponse {
            id: self.id,
            phone: self.phone.clone(),
            name: self.name.clone(),
            rating: self.rating,
            vehicle_class: self.vehicle_class,
            vehicle_number: self.vehicle_number.clone(),
            status: self.status,
            total_trips: self.total_trips,
            current_lat: self.current_lat,
            current_lng: self.current_lng,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vehicle_class_round_trips_through_strings() {
        for class in [
            VehicleClass::Auto,
            VehicleClass::Mini,
            VehicleClass::Sedan,
            VehicleClass::Suv,
        ] {
            assert_eq!(VehicleClass::parse(class.as_str()), Some(class));
        }
        assert_eq!(VehicleClass::parse("rickshaw"), None);
    }

    #[test]
    fn driver_status_round_trips_through_strings() {
        for status in [
            DriverStatus::Offline,
            DriverStatus::Online,
            DriverStatus::Busy,
        ] {
            assert_eq!(DriverStatus::parse(status.as_str()), Some(status));
        }
    }
}
