//! Tool system for the generator
//!
//! Tools are capabilities the model may call while producing a candidate.
//! Which tools a generation call sees depends on its source context.

mod error;
mod executor;
mod traits;

pub mod builtin;

pub use error::ToolError;
pub use executor::ToolExecutor;
pub use traits::{Tool, ToolResult};
