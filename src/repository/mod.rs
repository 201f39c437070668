pub mod driver_repo;
pub mod offer_repo;
pub mod payment_repo;
pub mod ride_repo;
pub mod trip_repo;
pub mod user_repo;

pub use driver_repo::DriverRepository;
pub use offer_repo::RideOfferRepository;
pub use payment_repo::PaymentRepository;
pub use ride_repo::RideRepository;
pub use trip_repo::TripRepository;
pub use user_repo::UserRepository;

/// True when the underlying database error is a unique-constraint violation.
/// Offer fan-out and phone registration rely on this to turn races into
/// domain outcomes instead of 500s.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Name of the constraint a database error violated, when the driver
/// reports one.
pub fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db) => db.constraint(),
        _ => None,
    }
}
