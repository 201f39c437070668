// src/state.rs
use std::sync::Arc;

use redis::aio::ConnectionManager;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cache::{PresenceCache, SpatialIndex};
use crate::config::Config;
use crate::repository::{
    DriverRepository, PaymentRepository, RideOfferRepository, RideRepository, TripRepository,
    UserRepository,
};
use crate::services::driver_service::DriverService;
use crate::services::matching_service::MatchingService;
use crate::services::payment_service::PaymentService;
use crate::services::pricing_service::PricingService;
use crate::services::ride_service::RideService;
use crate::services::trip_service::TripService;
use crate::services::user_service::UserService;
use crate::tracking::{self, LocationUpdate, TrackingRegistry};

/// Everything a request can reach, wired once at startup and shared behind
/// an `Arc`.
pub struct AppState {
    pub config: Config,
    pub pool: PgPool,
    pub redis: ConnectionManager,

    pub ride_repo: RideRepository,
    pub offer_repo: RideOfferRepository,

    pub presence: PresenceCache,
    pub tracking: Arc<TrackingRegistry>,

    pub user_service: Arc<UserService>,
    pub ride_service: Arc<RideService>,
    pub driver_service: Arc<DriverService>,
    pub matching_service: Arc<MatchingService>,
    pub trip_service: Arc<TripService>,
    pub payment_service: Arc<PaymentService>,

    // Held for teardown: the dispatcher drains the topic until every
    // publisher handle is gone.
    _dispatcher: JoinHandle<()>,
    _topic: mpsc::Sender<LocationUpdate>,
}

impl AppState {
    pub fn new(config: Config, pool: PgPool, redis: ConnectionManager) -> Self {
        let user_repo = UserRepository::new(pool.clone());
        let driver_repo = DriverRepository::new(pool.clone());
        let ride_repo = RideRepository::new(pool.clone());
        let trip_repo = TripRepository::new(pool.clone());
        let offer_repo = RideOfferRepository::new(pool.clone());
        let payment_repo = PaymentRepository::new(pool.clone());

        let presence = PresenceCache::new(redis.clone());
        let spatial = SpatialIndex::new(redis.clone());
        let pricing = Arc::new(PricingService::new());

        let registry = Arc::new(TrackingRegistry::new());
        let (topic, dispatcher) = tracking::start_dispatcher(Arc::clone(&registry));

        let user_service = Arc::new(UserService::new(user_repo.clone()));

        let ride_service = Arc::new(RideService::new(
            ride_repo.clone(),
            user_repo.clone(),
            driver_repo.clone(),
            Arc::clone(&pricing),
            presence.clone(),
            spatial.clone(),
            pool.clone(),
        ));

        let driver_service = Arc::new(DriverService::new(
            pool.clone(),
            driver_repo.clone(),
            ride_repo.clone(),
            offer_repo.clone(),
            user_repo,
            presence.clone(),
            spatial.clone(),
            topic.clone(),
        ));

        let matching_service = Arc::new(MatchingService::new(
            driver_repo.clone(),
            ride_repo.clone(),
            offer_repo.clone(),
            presence.clone(),
            spatial.clone(),
            pool.clone(),
            config.matching_radius_km,
            config.offer_timeout_secs,
        ));

        let trip_service = Arc::new(TripService::new(
            pool.clone(),
            trip_repo.clone(),
            ride_repo.clone(),
            driver_repo,
            Arc::clone(&pricing),
            presence.clone(),
        ));

        let payment_service = Arc::new(PaymentService::new(
            payment_repo,
            trip_repo,
            config.payment_currency.clone(),
        ));

        Self {
            config,
            pool,
            redis,
            ride_repo,
            offer_repo,
            presence,
            tracking: registry,
            user_service,
            ride_service,
            driver_service,
            matching_service,
            trip_service,
            payment_service,
            _dispatcher: dispatcher,
            _topic: topic,
        }
    }
}
