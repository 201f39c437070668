// src/models/trip.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

/// Trip lifecycle. `started <-> paused`, either side may end in
/// `completed` or `cancelled`; both are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "trip_status", rename_all = "snake_case")]
pub enum TripStatus {
    Started,
    Paused,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TripStatus::Started => "started",
            TripStatus::Paused => "paused",
            TripStatus::Completed => "completed",
            TripStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(self, next: TripStatus) -> bool {
        use TripStatus::*;
        matches!(
            (self, next),
            (Started, Paused)
                | (Started, Completed)
                | (Started, Cancelled)
                | (Paused, Started)
                | (Paused, Completed)
                | (Paused, Cancelled)
        )
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Trip {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub driver_id: Uuid,
    pub user_id: Uuid,
    pub status: TripStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub pause_duration_secs: i32,
    pub actual_distance_km: Option<f64>,
    pub actual_duration_min: Option<i32>,
    pub route_polyline: Option<String>,
    pub base_fare: Option<f64>,
    pub distance_fare: Option<f64>,
    pub time_fare: Option<f64>,
    pub surge_amount: Option<f64>,
    pub total_fare: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fare components as computed by pricing. All fields rounded to two
/// decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FareBreakdown {
    pub base_fare: f64,
    pub distance_fare: f64,
    pub time_fare: f64,
    pub surge_amount: f64,
    pub total: f64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StartTripRequest {
    pub ride_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EndTripRequest {
    #[validate(range(min = -90.0, max = 90.0))]
    pub end_lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub end_lng: f64,
    #[validate(range(min = 0.0))]
    pub odometer_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TripResponse {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub status: TripStatus,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_distance_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_duration_min: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fare_breakdown: Option<FareBreakdown>,
}

impl Trip {
    pub fn to_response(&self) -> TripResponse {
        let fare_breakdown = self.total_fare.map(|total| FareBreakdown {
            base_fare: self.base_fare.unwrap_or(0.0),
            distance_fare: self.distance_fare.unwrap_or(0.0),
            time_fare: self.time_fare.unwrap_or(0.0),
            surge_amount: self.surge_amount.unwrap_or(0.0),
            total,
        });

        TripResponse {
            id: self.id,
            ride_id: self.ride_id,
            status: self.status,
            start_time: self.start_time,
            end_time: self.end_time,
            actual_distance_km: self.actual_distance_km,
            actual_duration_min: self.actual_duration_min,
            fare_breakdown,
        }
    }

    pub fn can_transition_to(&self, next: TripStatus) -> bool {
        self.status.can_transition_to(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TripStatus::*;

    #[test]
    fn pause_resume_toggles() {
        assert!(Started.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Started));
    }

    #[test]
    fn both_running_states_can_finish() {
        for from in [Started, Paused] {
            assert!(from.can_transition_to(Completed));
            assert!(from.can_transition_to(Cancelled));
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for to in [Started, Paused, Completed, Cancelled] {
            assert!(!Completed.can_transition_to(to));
            assert!(!Cancelled.can_transition_to(to));
        }
    }
}
