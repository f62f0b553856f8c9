use crate::RunId;
use thiserror::Error;

/// Errors raised while running tasks and flows.
///
/// Failures are captured on the run that produced them and only surface when
/// someone resolves that run's future, so the type is `Clone`: every
/// resolution of a failed future hands back the same error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    #[error("task '{name}' ({run_id}) failed: {cause}")]
    TaskFailed {
        run_id: RunId,
        name: String,
        cause: Box<FlowError>,
    },

    #[error("flow '{name}' ({run_id}) failed: {cause}")]
    FlowFailed {
        run_id: RunId,
        name: String,
        cause: Box<FlowError>,
    },

    #[error("{run_id} not resolved within {timeout_ms}ms")]
    ResolutionTimeout { run_id: RunId, timeout_ms: u64 },

    #[error("dependency edge from {run_id} to {dependency} rejected: edges must point to earlier runs")]
    CyclicDependencyRejected { run_id: RunId, dependency: RunId },

    #[error("unknown run: {0}")]
    UnknownRun(RunId),

    #[error("{0} already finalized")]
    AlreadyFinalized(RunId),

    #[error("{0} was dropped before reaching a terminal state")]
    Abandoned(RunId),

    #[error("{0}")]
    Execution(String),
}

impl FlowError {
    /// Shorthand for a failure raised from inside a task or flow body.
    pub fn msg(message: impl Into<String>) -> Self {
        FlowError::Execution(message.into())
    }

    /// The run that raised this error, if the error is tied to one.
    pub fn run_id(&self) -> Option<RunId> {
        match self {
            FlowError::TaskFailed { run_id, .. }
            | FlowError::FlowFailed { run_id, .. }
            | FlowError::ResolutionTimeout { run_id, .. }
            | FlowError::CyclicDependencyRejected { run_id, .. }
            | FlowError::AlreadyFinalized(run_id)
            | FlowError::Abandoned(run_id)
            | FlowError::UnknownRun(run_id) => Some(*run_id),
            FlowError::Execution(_) => None,
        }
    }

    /// Run ids from the outermost failed run down to the run that originally
    /// raised.
    pub fn run_chain(&self) -> Vec<RunId> {
        let mut chain = Vec::new();
        let mut current = self;
        loop {
            match current {
                FlowError::TaskFailed { run_id, cause, .. }
                | FlowError::FlowFailed { run_id, cause, .. } => {
                    chain.push(*run_id);
                    current = cause;
                }
                other => {
                    if let Some(id) = other.run_id() {
                        if chain.last() != Some(&id) {
                            chain.push(id);
                        }
                    }
                    return chain;
                }
            }
        }
    }

    /// The innermost error, below every task/flow wrapper.
    pub fn root_cause(&self) -> &FlowError {
        match self {
            FlowError::TaskFailed { cause, .. } | FlowError::FlowFailed { cause, .. } => {
                cause.root_cause()
            }
            other => other,
        }
    }
}

/// Errors reading or writing a serialized event stream.
#[derive(Error, Debug)]
pub enum EventStreamError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error on line {line}: {source}")]
    Serialization {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}
