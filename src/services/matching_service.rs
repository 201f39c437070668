// src/services/matching_service.rs
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::cache::{PresenceCache, SpatialIndex};
use crate::errors::{KiteError, KiteResult};
use crate::models::driver::DriverStatus;
use crate::models::offer::RideOfferResponse;
use crate::models::ride::{CancelActor, Ride, RideStatus};
use crate::repository::{self, DriverRepository, RideOfferRepository, RideRepository};
use crate::services::pricing_service::haversine_km;

/// Offers created per matching round.
const MAX_OFFERS: usize = 3;
/// Cap on spatial index results per query.
const NEARBY_LIMIT: usize = 50;

/// A driver that survived filtering, ready to be ranked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDriver {
    pub driver_id: Uuid,
    pub distance_km: f64,
    pub rating: f64,
    pub score: f64,
}

/// Candidate score: closer and better-rated drivers first.
pub fn score(distance_km: f64, rating: f64) -> f64 {
    100.0 - 10.0 * distance_km + 5.0 * rating
}

/// Rank candidates: score descending, ties broken by lower distance, then
/// by id for a stable total order.
pub fn rank(mut candidates: Vec<ScoredDriver>) -> Vec<ScoredDriver> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                a.distance_km
                    .partial_cmp(&b.distance_km)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.driver_id.cmp(&b.driver_id))
    });
    candidates
}

pub struct MatchingService {
    driver_repo: DriverRepository,
    ride_repo: RideRepository,
    offer_repo: RideOfferRepository,
    presence: PresenceCache,
    spatial: SpatialIndex,
    pool: sqlx::PgPool,
    match_radius_km: f64,
    offer_timeout_secs: u64,
}

impl MatchingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        driver_repo: DriverRepository,
        ride_repo: RideRepository,
        offer_repo: RideOfferRepository,
        presence: PresenceCache,
        spatial: SpatialIndex,
        pool: sqlx::PgPool,
        match_radius_km: f64,
        offer_timeout_secs: u64,
    ) -> Self {
        Self {
            driver_repo,
            ride_repo,
            offer_repo,
            presence,
            spatial,
            pool,
            match_radius_km,
            offer_timeout_secs,
        }
    }

    /// One matching round for a ride in `matching`: query the spatial
    /// index (database fallback when it is empty), filter, rank, and fan
    /// out up to three pending offers. The offer protocol picks the winner.
    pub async fn find_and_offer_drivers(&self, ride: &Ride) -> KiteResult<()> {
        let mut candidates = self
            .spatial
            .nearby(
                ride.vehicle_class,
                ride.pickup_lat,
                ride.pickup_lng,
                self.match_radius_km,
                NEARBY_LIMIT,
            )
            .await?;

        if candidates.is_empty() {
            // Index may be cold; fall back to the durable store with a
            // freshly computed pickup distance for each driver.
            let db_drivers = self
                .driver_repo
                .get_online_by_class(ride.vehicle_class)
                .await?;

            candidates = db_drivers
                .iter()
                .filter_map(|d| {
                    let (lat, lng) = (d.current_lat?, d.current_lng?);
                    Some(crate::cache::spatial::NearbyDriver {
                        driver_id: d.id,
                        distance_km: haversine_km(ride.pickup_lat, ride.pickup_lng, lat, lng),
                    })
                })
                .collect();

            if candidates.is_empty() {
                self.cancel_unmatched(ride).await;
                return Err(KiteError::NoDriversAvailable);
            }
        }

        let scored = self.filter_and_score(ride, candidates).await;
        if scored.is_empty() {
            self.cancel_unmatched(ride).await;
            return Err(KiteError::NoDriversAvailable);
        }

        let expires_at = Utc::now() + Duration::seconds(self.offer_timeout_secs as i64);
        for driver in scored.iter().take(MAX_OFFERS) {
            match self
                .offer_repo
                .create(ride.id, driver.driver_id, expires_at)
                .await
            {
                Ok(offer) => {
                    tracing::info!(
                        offer_id = %offer.id,
                        ride_id = %ride.id,
                        driver_id = %driver.driver_id,
                        score = driver.score,
                        distance_km = driver.distance_km,
                        "offer created"
                    );
                }
                Err(err) if repository::is_unique_violation(&err) => {
                    tracing::debug!(
                        ride_id = %ride.id,
                        driver_id = %driver.driver_id,
                        "offer already exists, skipping"
                    );
                }
                // Individual offer failures are skipped, not fatal.
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        ride_id = %ride.id,
                        driver_id = %driver.driver_id,
                        "failed to create offer"
                    );
                }
            }
        }

        Ok(())
    }

    async fn filter_and_score(
        &self,
        ride: &Ride,
        candidates: Vec<crate::cache::spatial::NearbyDriver>,
    ) -> Vec<ScoredDriver> {
        let mut scored = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            // Already offered this ride.
            match self
                .offer_repo
                .get_by_ride_and_driver(ride.id, candidate.driver_id)
                .await
            {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "offer lookup failed, skipping candidate");
                    continue;
                }
            }

            // Presence record must exist and be online.
            let meta = match self.presence.get_meta(candidate.driver_id).await {
                Ok(Some(meta)) if meta.status == DriverStatus::Online => meta,
                _ => continue,
            };

            // Occupied drivers are out even if their status lags.
            match self.presence.get_active_ride(candidate.driver_id).await {
                Ok(None) => {}
                _ => continue,
            }

            scored.push(ScoredDriver {
                driver_id: candidate.driver_id,
                distance_km: candidate.distance_km,
                rating: meta.rating,
                score: score(candidate.distance_km, meta.rating),
            });
        }

        rank(scored)
    }

    /// No supply: park the ride as system-cancelled so the rider sees a
    /// terminal state instead of a stuck `matching`.
    async fn cancel_unmatched(&self, ride: &Ride) {
        let result = async {
            let mut tx = self.pool.begin().await?;
            let current = self
                .ride_repo
                .get_by_id_for_update(&mut *tx, ride.id)
                .await?;

            if let Some(current) = current {
                if current.can_transition_to(RideStatus::Cancelled) {
                    self.ride_repo
                        .cancel_tx(
                            &mut *tx,
                            ride.id,
                            CancelActor::System,
                            Some("no drivers available"),
                        )
                        .await?;
                }
            }
            tx.commit().await?;
            Ok::<(), KiteError>(())
        }
        .await;

        if let Err(err) = result {
            tracing::error!(error = %err, ride_id = %ride.id, "failed to cancel unmatched ride");
        }
    }

    /// Everything a polling driver should see: live pending offers joined
    /// with a minimal view of their rides.
    pub async fn get_pending_offers(&self, driver_id: Uuid) -> KiteResult<Vec<RideOfferResponse>> {
        let offers = self.offer_repo.get_pending_by_driver(driver_id).await?;

        let mut responses = Vec::with_capacity(offers.len());
        for offer in offers {
            let mut response = offer.to_response();
            if let Some(ride) = self.ride_repo.get_by_id(offer.ride_id).await? {
                response.ride = Some(ride.to_response());
            }
            responses.push(response);
        }

        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: u128, distance_km: f64, rating: f64) -> ScoredDriver {
        ScoredDriver {
            driver_id: Uuid::from_u128(id),
            distance_km,
            rating,
            score: score(distance_km, rating),
        }
    }

    #[test]
    fn score_rewards_proximity_and_rating() {
        // 100 - 10*1 + 5*5 = 115
        assert_eq!(score(1.0, 5.0), 115.0);
        // A much closer driver beats a better-rated far one.
        assert!(score(0.5, 4.0) > score(3.0, 5.0));
    }

    #[test]
    fn rank_orders_by_score_descending() {
        let ranked = rank(vec![
            candidate(1, 4.0, 4.0),
            candidate(2, 1.0, 5.0),
            candidate(3, 2.0, 4.5),
        ]);
        let ids: Vec<_> = ranked.iter().map(|c| c.driver_id.as_u128()).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn equal_scores_break_ties_by_distance_then_id() {
        // Same score, different distances.
        let a = candidate(1, 2.0, 5.0); // 100 - 20 + 25 = 105
        let b = ScoredDriver {
            driver_id: Uuid::from_u128(2),
            distance_km: 1.0,
            rating: 3.0, // 100 - 10 + 15 = 105
            score: score(1.0, 3.0),
        };
        assert_eq!(a.score, b.score);
        let ranked = rank(vec![a, b]);
        assert_eq!(ranked[0].driver_id.as_u128(), 2);

        // Fully identical candidates order by id.
        let ranked = rank(vec![candidate(9, 1.0, 4.0), candidate(3, 1.0, 4.0)]);
        assert_eq!(ranked[0].driver_id.as_u128(), 3);
    }
}
