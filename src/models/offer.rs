// src/models/offer.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::models::ride::RideResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "offer_status", rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

impl OfferStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Declined => "declined",
            OfferStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A time-limited proposal to one driver to take one ride. Unique per
/// `(ride_id, driver_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RideOffer {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub driver_id: Uuid,
    pub status: OfferStatus,
    pub offered_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl RideOffer {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AcceptOfferRequest {
    pub ride_id: Uuid,
    pub offer_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DeclineOfferRequest {
    pub offer_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct RideOfferResponse {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub status: OfferStatus,
    pub offered_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ride: Option<RideResponse>,
}

impl RideOffer {
    pub fn to_response(&self) -> RideOfferResponse {
        RideOfferResponse {
            id: self.id,
            ride_id: self.ride_id,
            status: self.status,
            offered_at: self.offered_at,
            expires_at: self.expires_at,
            ride: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn offer_expiring_at(expires_at: DateTime<Utc>) -> RideOffer {
        RideOffer {
            id: Uuid::new_v4(),
            ride_id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            status: OfferStatus::Pending,
            offered_at: expires_at - Duration::seconds(15),
            responded_at: None,
            expires_at,
        }
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let now = Utc::now();
        assert!(offer_expiring_at(now).is_expired(now));
        assert!(offer_expiring_at(now - Duration::seconds(1)).is_expired(now));
        assert!(!offer_expiring_at(now + Duration::seconds(1)).is_expired(now));
    }
}
