//! Repair Orchestrator
//!
//! Builds the source context once, then generates, executes and evaluates
//! candidates until one passes or the iteration budget runs out.

mod attempt;
mod engine;
mod feedback;

pub use attempt::{Attempt, AttemptOutcome, Report, TerminalStatus};
pub use engine::{LoopState, RepairError, RepairOrchestrator, RepairSettings};
pub use feedback::{FailureKind, RepairFeedback};
