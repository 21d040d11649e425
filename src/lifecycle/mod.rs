pub mod manager;
pub mod state_machine;

pub use manager::{AgentLifecycleManager, BulkFailure, BulkOutcome, LifecycleConfig, SweepReport};
pub use state_machine::{AgentLifecycle, LifecycleEvent, LifecycleState, LifecycleStateMachine};
