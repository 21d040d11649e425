pub mod coordination;
pub mod writeback;

pub use coordination::{Orchestrator, TaskReport, TaskTicket};
pub use writeback::{Baseline, WriteBack, WriteOutcome};
