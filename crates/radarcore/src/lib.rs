//! Core data model for the dynamic run engine
//!
//! Run identities and records, the dynamic value type, the error taxonomy and
//! the visualization event stream. Nothing in here executes anything.

mod error;
pub mod events;
mod run;
mod value;

pub use error::{EventStreamError, FlowError};
pub use events::{EventBus, RunEvent, RunEventKind};
pub use run::{RunId, RunKind, RunRecord, RunState};
pub use value::Value;

/// Result type for run operations
pub type Result<T> = std::result::Result<T, FlowError>;
