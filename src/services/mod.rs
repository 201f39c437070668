pub mod driver_service;
pub mod matching_service;
pub mod payment_service;
pub mod pricing_service;
pub mod ride_service;
pub mod trip_service;
pub mod user_service;
