// Agent registry and contract-enforcing runner
pub mod registry;
pub mod runner;

pub use registry::{AgentBinding, AgentRegistry};
pub use runner::AgentRunner;
