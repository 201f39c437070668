// src/models/ride.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::models::driver::{DriverResponse, VehicleClass};
use crate::models::payment::PaymentMethod;
use crate::models::user::UserResponse;

/// Ride lifecycle. Created `pending`, advanced to `matching` in the same
/// logical step, terminal in `completed` or `cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "ride_status", rename_all = "snake_case")]
pub enum RideStatus {
    Pending,
    Matching,
    DriverAssigned,
    DriverArrived,
    InProgress,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RideStatus::Pending => "pending",
            RideStatus::Matching => "matching",
            RideStatus::DriverAssigned => "driver_assigned",
            RideStatus::DriverArrived => "driver_arrived",
            RideStatus::InProgress => "in_progress",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
        }
    }

    /// The closed transition set. Anything not listed here fails with
    /// `invalid_transition`.
    pub fn can_transition_to(self, next: RideStatus) -> bool {
        use RideStatus::*;
        matches!(
            (self, next),
            (Pending, Matching)
                | (Pending, Cancelled)
                | (Matching, DriverAssigned)
                | (Matching, Cancelled)
                | (DriverAssigned, DriverArrived)
                | (DriverAssigned, Cancelled)
                | (DriverArrived, InProgress)
                | (DriverArrived, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who cancelled a ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "cancel_actor", rename_all = "snake_case")]
pub enum CancelActor {
    User,
    Driver,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Location {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Ride {
    pub id: Uuid,
    pub user_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub pickup_address: Option<String>,
    pub dropoff_lat: f64,
    pub dropoff_lng: f64,
    pub dropoff_address: Option<String>,
    pub vehicle_class: VehicleClass,
    pub status: RideStatus,
    pub estimated_fare: Option<f64>,
    pub surge_multiplier: f64,
    pub estimated_distance_km: Option<f64>,
    pub estimated_duration_min: Option<i32>,
    pub payment_method: PaymentMethod,
    pub idempotency_key: Option<String>,
    pub cancelled_by: Option<CancelActor>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRideRequest {
    pub user_id: Uuid,
    #[validate(nested)]
    pub pickup: Location,
    #[validate(nested)]
    pub dropoff: Location,
    pub vehicle_class: VehicleClass,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelRideRequest {
    pub cancelled_by: CancelActor,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RideResponse {
    pub id: Uuid,
    pub status: RideStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverResponse>,
    pub pickup: Location,
    pub dropoff: Location,
    pub vehicle_class: VehicleClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_fare: Option<f64>,
    pub surge_multiplier: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_distance_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_duration_min: Option<i32>,
    pub payment_method: PaymentMethod,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ride {
    pub fn to_response(&self) -> RideResponse {
        RideResponse {
            id: self.id,
            status: self.status,
            user: None,
            driver: None,
            pickup: Location {
                lat: self.pickup_lat,
                lng: self.pickup_lng,
                address: self.pickup_address.clone(),
            },
            dropoff: Location {
                lat: self.dropoff_lat,
                lng: self.dropoff_lng,
                address: self.dropoff_address.clone(),
            },
            vehicle_class: self.vehicle_class,
            estimated_fare: self.estimated_fare,
            surge_multiplier: self.surge_multiplier,
            estimated_distance_km: self.estimated_distance_km,
            estimated_duration_min: self.estimated_duration_min,
            payment_method: self.payment_method,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn can_transition_to(&self, next: RideStatus) -> bool {
        self.status.can_transition_to(next)
    }

    /// A ride is active while it is in any non-terminal state.
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RideStatus::*;

    const ALL: [RideStatus; 7] = [
        Pending,
        Matching,
        DriverAssigned,
        DriverArrived,
        InProgress,
        Completed,
        Cancelled,
    ];

    #[test]
    fn happy_path_is_allowed() {
        assert!(Pending.can_transition_to(Matching));
        assert!(Matching.can_transition_to(DriverAssigned));
        assert!(DriverAssigned.can_transition_to(DriverArrived));
        assert!(DriverArrived.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
    }

    #[test]
    fn every_non_terminal_state_can_cancel() {
        for from in [Pending, Matching, DriverAssigned, DriverArrived, InProgress] {
            assert!(from.can_transition_to(Cancelled), "{from} should cancel");
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for to in ALL {
            assert!(!Completed.can_transition_to(to));
            assert!(!Cancelled.can_transition_to(to));
        }
    }

    #[test]
    fn no_skipping_ahead() {
        assert!(!Pending.can_transition_to(DriverAssigned));
        assert!(!Matching.can_transition_to(InProgress));
        assert!(!DriverAssigned.can_transition_to(Completed));
        // and no going back
        assert!(!DriverArrived.can_transition_to(Matching));
        assert!(!InProgress.can_transition_to(DriverAssigned));
    }

    #[test]
    fn transition_set_is_exactly_ten_edges() {
        let mut count = 0;
        for from in ALL {
            for to in ALL {
                if from.can_transition_to(to) {
                    count += 1;
                }
            }
        }
        assert_eq!(count, 10);
    }
}
