pub mod agents;
pub mod api;
pub mod capabilities;
pub mod config;
pub mod conflict;
pub mod definitions;
pub mod engine;
pub mod error;
pub mod factory;
pub mod lifecycle;
pub mod locks;
pub mod registry;
pub mod storage;
pub mod types;

pub use config::Config;
pub use engine::Orchestrator;
pub use error::{ConcordError, Result};
pub use types::*;
