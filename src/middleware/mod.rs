pub mod idempotency;
pub mod rate_limit;
