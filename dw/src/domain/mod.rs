//! Domain types
//!
//! The immutable inputs of one generation task: the task bundle itself and the
//! example usage it is tested against.

mod example;
mod task;

pub use example::{ExampleError, ExampleUsage};
pub use task::GenerationTask;
