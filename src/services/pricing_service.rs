// src/services/pricing_service.rs
use crate::models::driver::VehicleClass;
use crate::models::trip::FareBreakdown;

/// Rate card for one vehicle class, currency-neutral units.
#[derive(Debug, Clone, Copy)]
pub struct FareRate {
    pub base: f64,
    pub per_km: f64,
    pub per_min: f64,
    pub min_fare: f64,
    pub cancellation_fee: f64,
}

const EARTH_RADIUS_KM: f64 = 6371.0;
/// Straight-line to road distance correction.
const ROAD_FACTOR: f64 = 1.3;
/// Assumed average city speed for ETA.
const AVG_SPEED_KMH: f64 = 25.0;
const MIN_DURATION_MIN: i32 = 5;

pub fn rate_for(class: VehicleClass) -> FareRate {
    match class {
        VehicleClass::Auto => FareRate {
            base: 25.0,
            per_km: 12.0,
            per_min: 1.0,
            min_fare: 30.0,
            cancellation_fee: 25.0,
        },
        VehicleClass::Mini => FareRate {
            base: 40.0,
            per_km: 14.0,
            per_min: 1.2,
            min_fare: 50.0,
            cancellation_fee: 40.0,
        },
        VehicleClass::Sedan => FareRate {
            base: 50.0,
            per_km: 17.0,
            per_min: 1.5,
            min_fare: 80.0,
            cancellation_fee: 50.0,
        },
        VehicleClass::Suv => FareRate {
            base: 80.0,
            per_km: 22.0,
            per_min: 2.0,
            min_fare: 120.0,
            cancellation_fee: 80.0,
        },
    }
}

/// Great-circle distance between two WGS-84 points, kilometers.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Fare and ETA computation. Estimation at ride creation and settlement at
/// trip end run the identical formula so breakdowns are bit-equal for the
/// same inputs.
pub struct PricingService;

impl PricingService {
    pub fn new() -> Self {
        Self
    }

    pub fn estimate_fare(
        &self,
        class: VehicleClass,
        distance_km: f64,
        duration_min: i32,
        surge_multiplier: f64,
    ) -> FareBreakdown {
        self.calculate_fare(class, distance_km, duration_min, surge_multiplier)
    }

    pub fn settle_fare(
        &self,
        class: VehicleClass,
        distance_km: f64,
        duration_min: i32,
        surge_multiplier: f64,
    ) -> FareBreakdown {
        self.calculate_fare(class, distance_km, duration_min, surge_multiplier)
    }

    fn calculate_fare(
        &self,
        class: VehicleClass,
        distance_km: f64,
        duration_min: i32,
        surge_multiplier: f64,
    ) -> FareBreakdown {
        let rate = rate_for(class);

        let base_fare = rate.base;
        let distance_fare = distance_km * rate.per_km;
        let time_fare = f64::from(duration_min) * rate.per_min;

        let subtotal = base_fare + distance_fare + time_fare;
        let mut surge_amount = subtotal * (surge_multiplier - 1.0);
        let mut total = subtotal + surge_amount;

        if total < rate.min_fare {
            total = rate.min_fare;
            surge_amount = 0.0;
        }

        FareBreakdown {
            base_fare: round2(base_fare),
            distance_fare: round2(distance_fare),
            time_fare: round2(time_fare),
            surge_amount: round2(surge_amount),
            total: round2(total),
        }
    }

    /// Step function on the demand/supply ratio. No supply means maximum
    /// surge.
    pub fn surge_multiplier(&self, demand: usize, supply: usize) -> f64 {
        if supply == 0 {
            return 2.0;
        }

        let ratio = demand as f64 / supply as f64;
        match ratio {
            r if r < 1.0 => 1.0,
            r if r < 1.5 => 1.2,
            r if r < 2.0 => 1.5,
            r if r < 3.0 => 1.8,
            _ => 2.0,
        }
    }

    /// Road distance estimate: Haversine times the road factor, two
    /// decimals.
    pub fn estimate_distance_km(&self, from_lat: f64, from_lng: f64, to_lat: f64, to_lng: f64) -> f64 {
        round2(haversine_km(from_lat, from_lng, to_lat, to_lng) * ROAD_FACTOR)
    }

    /// ETA at city speed, floored at five minutes.
    pub fn estimate_duration_min(&self, distance_km: f64) -> i32 {
        let minutes = (distance_km / AVG_SPEED_KMH * 60.0).ceil() as i32;
        minutes.max(MIN_DURATION_MIN)
    }

    pub fn cancellation_fee(&self, class: VehicleClass) -> f64 {
        rate_for(class).cancellation_fee
    }
}

impl Default for PricingService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sedan_estimate_no_surge() {
        let pricing = PricingService::new();
        let fare = pricing.estimate_fare(VehicleClass::Sedan, 10.0, 20, 1.0);
        assert_eq!(fare.base_fare, 50.0);
        assert_eq!(fare.distance_fare, 170.0);
        assert_eq!(fare.time_fare, 30.0);
        assert_eq!(fare.surge_amount, 0.0);
        assert_eq!(fare.total, 250.0);
    }

    #[test]
    fn mini_short_hop_stays_above_min_fare() {
        let pricing = PricingService::new();
        let fare = pricing.estimate_fare(VehicleClass::Mini, 1.0, 2, 1.0);
        assert_eq!(fare.base_fare, 40.0);
        assert_eq!(fare.distance_fare, 14.0);
        assert_eq!(fare.time_fare, 2.4);
        assert_eq!(fare.surge_amount, 0.0);
        assert_eq!(fare.total, 56.4);
    }

    #[test]
    fn min_fare_clamp_zeroes_surge() {
        let pricing = PricingService::new();
        // 25 + 6 + 2 = 33 < 80, clamps to the sedan minimum.
        let fare = pricing.estimate_fare(VehicleClass::Sedan, 0.35, 1, 1.1);
        assert_eq!(fare.total, 80.0);
        assert_eq!(fare.surge_amount, 0.0);
    }

    #[test]
    fn surge_scales_the_subtotal() {
        let pricing = PricingService::new();
        let fare = pricing.estimate_fare(VehicleClass::Suv, 10.0, 20, 1.5);
        // subtotal 80 + 220 + 40 = 340, surge adds half of it
        assert_eq!(fare.surge_amount, 170.0);
        assert_eq!(fare.total, 510.0);
    }

    #[test]
    fn settlement_scenario_sedan_five_km_twelve_min() {
        let pricing = PricingService::new();
        let fare = pricing.settle_fare(VehicleClass::Sedan, 5.0, 12, 1.0);
        assert_eq!(fare.total, 153.0);
    }

    #[test]
    fn estimate_and_settle_are_bit_equal() {
        let pricing = PricingService::new();
        for (class, km, min, surge) in [
            (VehicleClass::Auto, 3.7, 11, 1.2),
            (VehicleClass::Mini, 8.25, 19, 1.8),
            (VehicleClass::Sedan, 10.0, 20, 1.0),
            (VehicleClass::Suv, 42.1, 95, 2.0),
        ] {
            assert_eq!(
                pricing.estimate_fare(class, km, min, surge),
                pricing.settle_fare(class, km, min, surge)
            );
        }
    }

    #[test]
    fn surge_curve() {
        let pricing = PricingService::new();
        assert_eq!(pricing.surge_multiplier(12, 10), 1.2);
        assert_eq!(pricing.surge_multiplier(17, 10), 1.5);
        assert_eq!(pricing.surge_multiplier(25, 10), 1.8);
        assert_eq!(pricing.surge_multiplier(40, 10), 2.0);
        assert_eq!(pricing.surge_multiplier(10, 0), 2.0);
        assert_eq!(pricing.surge_multiplier(5, 20), 1.0);
    }

    #[test]
    fn haversine_is_symmetric_and_zero_at_identity() {
        let (lat1, lng1) = (12.9716, 77.5946);
        let (lat2, lng2) = (12.9352, 77.6245);

        assert_eq!(haversine_km(lat1, lng1, lat1, lng1), 0.0);
        let there = haversine_km(lat1, lng1, lat2, lng2);
        let back = haversine_km(lat2, lng2, lat1, lng1);
        assert!((there - back).abs() < 1e-9);
        // MG Road to Koramangala is roughly five kilometers.
        assert!(there > 3.0 && there < 7.0);
    }

    #[test]
    fn duration_floors_at_five_minutes() {
        let pricing = PricingService::new();
        assert_eq!(pricing.estimate_duration_min(0.5), 5);
        assert_eq!(pricing.estimate_duration_min(10.0), 24);
    }
}
