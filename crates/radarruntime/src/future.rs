use crate::context::FlowContext;
use radarcore::{FlowError, RunId, RunKind, RunState, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Slot {
    Pending,
    Running,
    Done(Result<Value, FlowError>),
}

impl Slot {
    fn state(&self) -> RunState {
        match self {
            Slot::Pending => RunState::Pending,
            Slot::Running => RunState::Running,
            Slot::Done(Ok(_)) => RunState::Completed,
            Slot::Done(Err(_)) => RunState::Failed,
        }
    }
}

/// Handle to the eventual result of a task or flow run.
///
/// Cloning is cheap; every clone observes the same outcome.
#[derive(Clone)]
pub struct RunFuture {
    id: Uuid,
    run_id: RunId,
    kind: RunKind,
    name: Arc<str>,
    rx: watch::Receiver<Slot>,
}

/// Write side of a [`RunFuture`], held by whoever executes the run.
pub(crate) struct Completer {
    tx: watch::Sender<Slot>,
}

impl RunFuture {
    pub(crate) fn channel(run_id: RunId, name: &str, kind: RunKind) -> (RunFuture, Completer) {
        let (tx, rx) = watch::channel(Slot::Pending);
        let future = RunFuture {
            id: Uuid::new_v4(),
            run_id,
            kind,
            name: Arc::from(name),
            rx,
        };
        (future, Completer { tx })
    }

    /// A future whose run already finished, as produced by inline flows.
    pub(crate) fn ready(
        run_id: RunId,
        name: &str,
        kind: RunKind,
        outcome: Result<Value, FlowError>,
    ) -> RunFuture {
        let (future, completer) = RunFuture::channel(run_id, name, kind);
        completer.complete(outcome);
        future
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn kind(&self) -> RunKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> RunState {
        self.rx.borrow().state()
    }

    /// The outcome if the run has finished, without waiting or recording a
    /// dependency.
    pub fn peek(&self) -> Option<Result<Value, FlowError>> {
        match &*self.rx.borrow() {
            Slot::Done(outcome) => Some(outcome.clone()),
            _ => None,
        }
    }

    /// Wait for the run to finish and return its value or its failure.
    ///
    /// The run is recorded as resolved in `ctx`, so runs created afterwards
    /// from that context depend on it. Uses the runtime's default timeout,
    /// if one is configured.
    pub async fn resolve(&self, ctx: &FlowContext) -> Result<Value, FlowError> {
        self.wait(ctx, ctx.config().resolve_timeout()).await
    }

    /// Like [`resolve`](Self::resolve), failing with `ResolutionTimeout` once
    /// `timeout` elapses. The run itself keeps going.
    pub async fn resolve_timeout(
        &self,
        ctx: &FlowContext,
        timeout: Duration,
    ) -> Result<Value, FlowError> {
        self.wait(ctx, Some(timeout)).await
    }

    async fn wait(
        &self,
        ctx: &FlowContext,
        timeout: Option<Duration>,
    ) -> Result<Value, FlowError> {
        let mut rx = self.rx.clone();
        let finished = async {
            rx.wait_for(|slot| matches!(slot, Slot::Done(_)))
                .await
                .map(|slot| (*slot).clone())
        };

        let slot = match timeout {
            Some(limit) => match tokio::time::timeout(limit, finished).await {
                Ok(slot) => slot,
                Err(_) => {
                    tracing::warn!(
                        "Gave up waiting on {} '{}' after {:?}",
                        self.run_id,
                        self.name,
                        limit
                    );
                    return Err(FlowError::ResolutionTimeout {
                        run_id: self.run_id,
                        timeout_ms: limit.as_millis() as u64,
                    });
                }
            },
            None => finished.await,
        };

        match slot {
            Ok(Slot::Done(outcome)) => {
                ctx.record_resolution(self.run_id);
                outcome
            }
            Ok(_) | Err(_) => Err(FlowError::Abandoned(self.run_id)),
        }
    }
}

impl fmt::Debug for RunFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunFuture")
            .field("id", &self.id)
            .field("run_id", &self.run_id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl Completer {
    /// `Pending -> Running`. Returns false if the run already moved on.
    pub(crate) fn start(&self) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.state().can_transition_to(RunState::Running) {
                *slot = Slot::Running;
                true
            } else {
                false
            }
        })
    }

    /// Consumes the completer, so a run's outcome is published exactly once.
    pub(crate) fn complete(self, outcome: Result<Value, FlowError>) {
        self.tx.send_modify(|slot| *slot = Slot::Done(outcome));
    }
}
