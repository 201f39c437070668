//! End-to-end dispatch scenarios against live Postgres and Redis.
//!
//! These tests need both stores running with the schema from `schema.sql`
//! applied:
//!
//! ```bash
//! docker run -d -p 5432:5432 -e POSTGRES_USER=kite -e POSTGRES_PASSWORD=kite \
//!     -e POSTGRES_DB=kite_dispatch postgres:16-alpine
//! docker run -d -p 6379:6379 redis:7-alpine
//! psql "$DATABASE_URL" -f schema.sql
//! cargo test --test dispatch_flow -- --ignored
//! ```

use std::sync::Arc;

use uuid::Uuid;

use kite_dispatch::config::Config;
use kite_dispatch::db;
use kite_dispatch::models::driver::{
    CreateDriverRequest, DriverStatus, UpdateDriverLocationRequest, VehicleClass,
};
use kite_dispatch::models::offer::AcceptOfferRequest;
use kite_dispatch::models::payment::{CreatePaymentRequest, PaymentMethod, PaymentStatus};
use kite_dispatch::models::ride::{
    CancelActor, CancelRideRequest, CreateRideRequest, Location, Ride, RideStatus,
};
use kite_dispatch::models::trip::EndTripRequest;
use kite_dispatch::models::user::CreateUserRequest;
use kite_dispatch::services::pricing_service::PricingService;
use kite_dispatch::state::AppState;
use kite_dispatch::KiteError;

async fn test_state() -> Arc<AppState> {
    let config = Config::from_env();
    let pool = db::connect_postgres(&config).await.expect("postgres not reachable");
    let redis = db::connect_redis(&config).await.expect("redis not reachable");
    Arc::new(AppState::new(config, pool, redis))
}

fn unique_phone() -> String {
    format!("9{:09}", Uuid::new_v4().as_u128() % 1_000_000_000)
}

async fn rider(state: &AppState) -> Uuid {
    let req = CreateUserRequest {
        phone: unique_phone(),
        name: "Test Rider".to_string(),
        email: None,
    };
    state
        .user_service
        .create_user(&req)
        .await
        .expect("create rider")
        .id
}

async fn online_sedan_at(state: &AppState, lat: f64, lng: f64) -> Uuid {
    let req = CreateDriverRequest {
        phone: unique_phone(),
        name: "Test Driver".to_string(),
        email: None,
        license_number: "DL-0042".to_string(),
        vehicle_class: VehicleClass::Sedan,
        vehicle_number: "KA-01-AB-1234".to_string(),
    };
    let driver = state.driver_service.create_driver(&req).await.expect("create driver");
    state.driver_service.go_online(driver.id).await.expect("go online");
    state
        .driver_service
        .update_location(
            driver.id,
            &UpdateDriverLocationRequest {
                lat,
                lng,
                heading: None,
                speed: None,
                accuracy: None,
            },
        )
        .await
        .expect("location update");
    driver.id
}

fn sedan_ride_request(user_id: Uuid, lat: f64, lng: f64) -> CreateRideRequest {
    CreateRideRequest {
        user_id,
        pickup: Location {
            lat,
            lng,
            address: Some("pickup".to_string()),
        },
        dropoff: Location {
            lat: lat + 0.04,
            lng: lng + 0.03,
            address: Some("dropoff".to_string()),
        },
        vehicle_class: VehicleClass::Sedan,
        payment_method: PaymentMethod::Cash,
    }
}

/// Create offers for the ride and accept with whichever driver received one.
async fn match_and_accept(state: &AppState, ride: &Ride, drivers: &[Uuid]) -> Uuid {
    state
        .matching_service
        .find_and_offer_drivers(ride)
        .await
        .expect("matching round");

    for &driver_id in drivers {
        let offers = state
            .matching_service
            .get_pending_offers(driver_id)
            .await
            .expect("pending offers");
        if let Some(offer) = offers.iter().find(|o| o.ride_id == ride.id) {
            state
                .driver_service
                .accept_offer(
                    driver_id,
                    &AcceptOfferRequest {
                        ride_id: ride.id,
                        offer_id: offer.id,
                    },
                )
                .await
                .expect("accept offer");
            return driver_id;
        }
    }
    panic!("no driver received an offer for ride {}", ride.id);
}

#[tokio::test]
#[ignore] // requires Postgres + Redis running
async fn concurrent_accepts_have_exactly_one_winner() {
    let state = test_state().await;
    let (lat, lng) = (12.9716, 77.5946);

    let user = rider(&state).await;
    let d1 = online_sedan_at(&state, lat + 0.001, lng + 0.001).await;
    let d2 = online_sedan_at(&state, lat + 0.002, lng + 0.002).await;

    let ride = state
        .ride_service
        .create_ride(&sedan_ride_request(user, lat, lng), None)
        .await
        .expect("create ride");
    state
        .matching_service
        .find_and_offer_drivers(&ride)
        .await
        .expect("matching round");

    let offer_of = |driver_id: Uuid| {
        let state = Arc::clone(&state);
        let ride_id = ride.id;
        async move {
            state
                .matching_service
                .get_pending_offers(driver_id)
                .await
                .unwrap()
                .into_iter()
                .find(|o| o.ride_id == ride_id)
                .expect("driver should hold an offer")
        }
    };
    let o1 = offer_of(d1).await;
    let o2 = offer_of(d2).await;

    let req1 = AcceptOfferRequest {
        ride_id: ride.id,
        offer_id: o1.id,
    };
    let req2 = AcceptOfferRequest {
        ride_id: ride.id,
        offer_id: o2.id,
    };
    let (r1, r2) = tokio::join!(
        state.driver_service.accept_offer(d1, &req1),
        state.driver_service.accept_offer(d2, &req2),
    );

    let winners = [r1.is_ok(), r2.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(winners, 1, "exactly one accept must win");

    let (winner, loser_result) = if r1.is_ok() { (d1, r2) } else { (d2, r1) };
    match loser_result {
        Err(KiteError::RideAlreadyAssigned) | Err(KiteError::BadRequest(_)) => {}
        other => panic!("loser should observe a domain conflict, got {other:?}"),
    }

    let stored = state.ride_repo.get_by_id(ride.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RideStatus::DriverAssigned);
    assert_eq!(stored.driver_id, Some(winner));

    let loser = if winner == d1 { d2 } else { d1 };
    let loser_row = state.driver_service.get_driver(loser).await.unwrap();
    assert_eq!(loser_row.status, DriverStatus::Online);
    let winner_row = state.driver_service.get_driver(winner).await.unwrap();
    assert_eq!(winner_row.status, DriverStatus::Busy);
}

#[tokio::test]
#[ignore] // requires Postgres + Redis running
async fn ride_create_replays_on_idempotency_key() {
    let state = test_state().await;
    let (lat, lng) = (28.6139, 77.2090);

    let user = rider(&state).await;
    let _driver = online_sedan_at(&state, lat + 0.001, lng).await;

    let key = format!("test-key-{}", Uuid::new_v4());
    let req = sedan_ride_request(user, lat, lng);

    let first = state
        .ride_service
        .create_ride(&req, Some(&key))
        .await
        .expect("first create");
    let second = state
        .ride_service
        .create_ride(&req, Some(&key))
        .await
        .expect("replayed create");

    assert_eq!(first.id, second.id);

    // Without the key the active-ride bound kicks in instead.
    let err = state.ride_service.create_ride(&req, None).await.unwrap_err();
    assert!(matches!(err, KiteError::ActiveRideExists));
}

#[tokio::test]
#[ignore] // requires Postgres + Redis running
async fn cancelling_an_assigned_ride_releases_the_driver() {
    let state = test_state().await;
    let (lat, lng) = (19.0760, 72.8777);

    let user = rider(&state).await;
    let driver = online_sedan_at(&state, lat + 0.001, lng).await;

    let ride = state
        .ride_service
        .create_ride(&sedan_ride_request(user, lat, lng), None)
        .await
        .unwrap();
    let assigned = match_and_accept(&state, &ride, &[driver]).await;
    assert_eq!(assigned, driver);

    state
        .ride_service
        .cancel_ride(
            ride.id,
            &CancelRideRequest {
                cancelled_by: CancelActor::User,
                reason: Some("changed my mind".to_string()),
            },
        )
        .await
        .unwrap();

    let stored = state.ride_repo.get_by_id(ride.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RideStatus::Cancelled);
    assert_eq!(stored.cancelled_by, Some(CancelActor::User));

    let driver_row = state.driver_service.get_driver(driver).await.unwrap();
    assert_eq!(driver_row.status, DriverStatus::Online);
}

#[tokio::test]
#[ignore] // requires Postgres + Redis running
async fn trip_settlement_prices_the_odometer_and_frees_the_driver() {
    let state = test_state().await;
    let (lat, lng) = (13.0827, 80.2707);

    let user = rider(&state).await;
    // Five drivers near the pickup keep the surge probe at 1.0.
    let mut drivers = Vec::new();
    for i in 0..5 {
        drivers.push(online_sedan_at(&state, lat + 0.001 * (i + 1) as f64, lng).await);
    }

    let ride = state
        .ride_service
        .create_ride(&sedan_ride_request(user, lat, lng), None)
        .await
        .unwrap();
    assert_eq!(ride.surge_multiplier, 1.0);

    let driver = match_and_accept(&state, &ride, &drivers).await;

    state
        .ride_service
        .update_ride_status(ride.id, RideStatus::DriverArrived)
        .await
        .unwrap();

    let trip = state.trip_service.start_trip(ride.id).await.unwrap();
    // A second start is a no-op returning the same trip.
    let again = state.trip_service.start_trip(ride.id).await.unwrap();
    assert_eq!(trip.id, again.id);

    let done = state
        .trip_service
        .end_trip(
            trip.id,
            &EndTripRequest {
                end_lat: lat + 0.04,
                end_lng: lng + 0.03,
                odometer_km: Some(5.0),
            },
        )
        .await
        .unwrap();

    // The trip ends seconds after it starts, so duration clamps to one
    // minute; settlement must equal the pricing formula bit for bit.
    let expected = PricingService::new().settle_fare(VehicleClass::Sedan, 5.0, 1, 1.0);
    assert_eq!(done.total_fare, Some(expected.total));
    assert_eq!(done.actual_distance_km, Some(5.0));

    let stored_ride = state.ride_repo.get_by_id(ride.id).await.unwrap().unwrap();
    assert_eq!(stored_ride.status, RideStatus::Completed);

    let driver_row = state.driver_service.get_driver(driver).await.unwrap();
    assert_eq!(driver_row.status, DriverStatus::Online);
    assert_eq!(driver_row.total_trips, 1);

    // Payment closes the cycle.
    let payment = state
        .payment_service
        .process_payment(&CreatePaymentRequest {
            trip_id: trip.id,
            method: PaymentMethod::Cash,
            idempotency_key: Some(format!("pay-{}", Uuid::new_v4())),
        })
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(payment.amount, expected.total);

    let refunded = state.payment_service.refund_payment(payment.id).await.unwrap();
    assert_eq!(refunded.status, PaymentStatus::Refunded);
}
