pub mod driver_handler;
pub mod health_handler;
pub mod payment_handler;
pub mod ride_handler;
pub mod track_handler;
pub mod trip_handler;
pub mod user_handler;
