pub mod driver;
pub mod offer;
pub mod payment;
pub mod ride;
pub mod trip;
pub mod user;
