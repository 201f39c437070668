pub mod presence;
pub mod spatial;

pub use presence::{DriverLocation, DriverMeta, PresenceCache};
pub use spatial::SpatialIndex;
