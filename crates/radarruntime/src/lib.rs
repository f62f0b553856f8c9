//! Dynamic task/flow execution runtime
//!
//! Flows are ordinary async code. The graph they produce is never declared:
//! it is discovered while they run, from which futures get resolved before
//! each new task or subflow is created, and can be laid out into rings at any
//! point from the run registry or from the recorded event stream.

mod context;
mod executor;
mod future;
pub mod graph;
mod registry;
mod runtime;
mod tracker;

pub use context::{Arg, Flow, FlowContext};
pub use executor::{Task, TaskBody, TaskExecutor};
pub use future::RunFuture;
pub use graph::{EdgeKind, ExecutionGraph, RingEntry, RunNode};
pub use registry::{Records, RunRegistry};
pub use runtime::{FlowRuntime, RuntimeConfig};
pub use tracker::{DependencyTracker, ExecutionContext};
