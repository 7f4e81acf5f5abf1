pub mod feature_flags;
pub mod mock;
pub mod observability;
pub mod persistence;
pub mod scheduler;

pub use feature_flags::InMemoryFeatureFlags;
pub use mock::{MockAgent, MockBehavior};
pub use scheduler::IntervalScheduler;
