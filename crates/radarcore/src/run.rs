use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a single task or flow run.
///
/// Ids are handed out by the run registry in creation order, so comparing two
/// ids tells you which run was created first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl RunId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Task,
    Flow,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunKind::Task => f.write_str("task"),
            RunKind::Flow => f.write_str("flow"),
        }
    }
}

/// Lifecycle state shared by runs and the futures bound to them.
///
/// Transitions only move forward: `Pending -> Running -> Completed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    pub fn can_transition_to(self, next: RunState) -> bool {
        match (self, next) {
            (RunState::Pending, RunState::Running) => true,
            (RunState::Pending | RunState::Running, RunState::Completed | RunState::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One execution of a task or flow as held by the run registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub kind: RunKind,
    pub name: String,
    /// Run that was executing when this one was created, if any.
    pub parent: Option<RunId>,
    /// Runs whose futures were resolved in the creating scope before this run
    /// started. Always strictly lower ids than `id`.
    pub dependencies: Vec<RunId>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub state: RunState,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn new(
        id: RunId,
        kind: RunKind,
        name: impl Into<String>,
        parent: Option<RunId>,
        dependencies: Vec<RunId>,
    ) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            parent,
            dependencies,
            started_at: Utc::now(),
            ended_at: None,
            state: RunState::Running,
            error: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0) as u64)
    }
}
