use crate::{RunId, RunKind, RunRecord, RunState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEventKind {
    RunCreated,
    RunFinalized,
}

/// One entry of the visualization feed.
///
/// A consumer replaying these in order can rebuild the run forest and the
/// dependency graph, live or after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub event: RunEventKind,
    pub run_id: RunId,
    pub kind: RunKind,
    pub name: String,
    pub parent_run_id: Option<RunId>,
    pub dependency_ids: Vec<RunId>,
    pub state: RunState,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunEvent {
    pub fn created(record: &RunRecord) -> Self {
        Self {
            event: RunEventKind::RunCreated,
            run_id: record.id,
            kind: record.kind,
            name: record.name.clone(),
            parent_run_id: record.parent,
            dependency_ids: record.dependencies.clone(),
            state: record.state,
            timestamp: record.started_at,
            error: None,
        }
    }

    pub fn finalized(record: &RunRecord) -> Self {
        Self {
            event: RunEventKind::RunFinalized,
            run_id: record.id,
            kind: record.kind,
            name: record.name.clone(),
            parent_run_id: record.parent,
            dependency_ids: record.dependencies.clone(),
            state: record.state,
            timestamp: record.ended_at.unwrap_or_else(Utc::now),
            error: record.error.clone(),
        }
    }
}

/// Live fan-out of run events to any number of subscribers.
///
/// Subscribers that fall behind by more than the buffer size miss events;
/// the registry journal keeps the complete stream.
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: RunEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("run event dropped: no subscribers");
        }
    }
}
