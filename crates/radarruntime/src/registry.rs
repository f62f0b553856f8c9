use chrono::Utc;
use parking_lot::RwLock;
use radarcore::{EventBus, FlowError, RunEvent, RunId, RunKind, RunRecord, RunState, Value};
use std::collections::HashSet;
use tokio::sync::broadcast;

/// Append-only table of every task and flow run in the process.
///
/// Creation and finalization happen under one write lock, which also orders
/// the event journal and the live broadcast: the n-th `run_created` event is
/// always for `RunId(n)`.
pub struct RunRegistry {
    inner: RwLock<RegistryInner>,
    event_bus: EventBus,
}

#[derive(Default)]
struct RegistryInner {
    records: Vec<RunRecord>,
    journal: Vec<RunEvent>,
}

impl RunRegistry {
    pub fn new(event_buffer_size: usize) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            event_bus: EventBus::new(event_buffer_size),
        }
    }

    /// Append a new `Running` record and return its id.
    ///
    /// Every dependency must name a run created strictly before this one.
    pub fn create(
        &self,
        kind: RunKind,
        name: &str,
        parent: Option<RunId>,
        dependencies: Vec<RunId>,
    ) -> Result<RunId, FlowError> {
        let mut inner = self.inner.write();
        let id = RunId(inner.records.len() as u64);

        if let Some(parent) = parent {
            if parent >= id {
                return Err(FlowError::UnknownRun(parent));
            }
        }
        if let Some(&dependency) = dependencies.iter().find(|dep| **dep >= id) {
            return Err(FlowError::CyclicDependencyRejected {
                run_id: id,
                dependency,
            });
        }

        let record = RunRecord::new(id, kind, name, parent, dependencies);
        let event = RunEvent::created(&record);
        inner.records.push(record);
        inner.journal.push(event.clone());
        self.event_bus.emit(event);

        tracing::debug!("Created {} {} '{}' (parent: {:?})", kind, id, name, parent);
        Ok(id)
    }

    /// Move a run to its terminal state. Only the first call succeeds.
    pub fn finalize(
        &self,
        run_id: RunId,
        outcome: &Result<Value, FlowError>,
    ) -> Result<(), FlowError> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let record = inner
            .records
            .get_mut(run_id.0 as usize)
            .ok_or(FlowError::UnknownRun(run_id))?;

        if record.is_finalized() {
            return Err(FlowError::AlreadyFinalized(run_id));
        }

        match outcome {
            Ok(_) => record.state = RunState::Completed,
            Err(e) => {
                record.state = RunState::Failed;
                record.error = Some(e.to_string());
            }
        }
        record.ended_at = Some(Utc::now());

        let duration_ms = record.duration_ms();
        let event = RunEvent::finalized(record);
        inner.journal.push(event.clone());
        self.event_bus.emit(event);

        tracing::debug!(
            duration_ms,
            "Finalized {} as {:?}",
            run_id,
            outcome.as_ref().map(|_| ())
        );
        Ok(())
    }

    pub fn get(&self, run_id: RunId) -> Option<RunRecord> {
        self.inner.read().records.get(run_id.0 as usize).cloned()
    }

    /// Records in creation order.
    ///
    /// The iterator reads lazily, so runs created while iterating are picked
    /// up; clone it to restart from the same position.
    pub fn all(&self) -> Records<'_> {
        Records {
            registry: self,
            next: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dependencies_of(&self, run_id: RunId) -> Option<Vec<RunId>> {
        self.inner
            .read()
            .records
            .get(run_id.0 as usize)
            .map(|r| r.dependencies.clone())
    }

    /// `root` followed by every run nested below it, in creation order.
    pub fn subtree(&self, root: RunId) -> Vec<RunRecord> {
        let inner = self.inner.read();
        let mut members = HashSet::new();
        let mut out = Vec::new();
        // Children always have higher ids than their parent, so one forward
        // pass sees every parent before its children.
        for record in inner.records.iter().skip(root.0 as usize) {
            let included = record.id == root
                || record.parent.is_some_and(|p| members.contains(&p));
            if included {
                members.insert(record.id);
                out.push(record.clone());
            }
        }
        out
    }

    /// Every event emitted so far, in order.
    pub fn events(&self) -> Vec<RunEvent> {
        self.inner.read().journal.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.event_bus.subscribe()
    }
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[derive(Clone)]
pub struct Records<'a> {
    registry: &'a RunRegistry,
    next: usize,
}

impl Iterator for Records<'_> {
    type Item = RunRecord;

    fn next(&mut self) -> Option<RunRecord> {
        let record = self.registry.inner.read().records.get(self.next).cloned()?;
        self.next += 1;
        Some(record)
    }
}
