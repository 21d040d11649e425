pub mod builtin;
pub mod schema;

pub use builtin::{builtin_capabilities, default_fleet};
pub use schema::{AgentSpec, FleetDefinition, TaskBatch};
