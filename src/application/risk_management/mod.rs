// Dispatch guards
pub mod cooldown_tracker;
pub mod rate_limiter;

pub use cooldown_tracker::{CooldownState, CooldownTracker};
pub use rate_limiter::{RateLimitState, RateLimiter};
