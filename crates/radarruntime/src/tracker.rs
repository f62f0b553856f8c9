//! Dependency discovery.
//!
//! Nothing about a flow's graph is declared up front. Each execution context
//! remembers which runs have been resolved inside it; whenever a new run is
//! created from that context, the remembered set becomes the new run's
//! dependency edges.

use crate::registry::RunRegistry;
use parking_lot::Mutex;
use radarcore::RunId;
use std::collections::HashSet;

/// Lexical scope of one running flow (or of the process root).
///
/// A fresh context is pushed for every flow run; `scoped` derives a sibling
/// context inside the same run for loop bodies and similar blocks.
#[derive(Debug)]
pub struct ExecutionContext {
    active_run: Option<RunId>,
    /// Root-first chain of enclosing runs, ending with `active_run`.
    lineage: Vec<RunId>,
    resolved: Mutex<Vec<RunId>>,
}

impl ExecutionContext {
    /// Context outside of any run.
    pub fn root() -> Self {
        Self {
            active_run: None,
            lineage: Vec::new(),
            resolved: Mutex::new(Vec::new()),
        }
    }

    /// Empty context for a run created from `parent`.
    pub fn enter(parent: &ExecutionContext, run_id: RunId) -> Self {
        let mut lineage = parent.lineage.clone();
        lineage.push(run_id);
        Self {
            active_run: Some(run_id),
            lineage,
            resolved: Mutex::new(Vec::new()),
        }
    }

    /// Context in the same run, starting from a snapshot of this one's
    /// resolved set. What gets resolved in the copy stays in the copy.
    pub fn scoped(&self) -> Self {
        Self {
            active_run: self.active_run,
            lineage: self.lineage.clone(),
            resolved: Mutex::new(self.resolved()),
        }
    }

    pub fn active_run(&self) -> Option<RunId> {
        self.active_run
    }

    pub fn lineage(&self) -> &[RunId] {
        &self.lineage
    }

    pub fn depth(&self) -> usize {
        self.lineage.len()
    }

    /// Remember that `run_id` was resolved here. Returns false if it already
    /// was, so repeated resolution never duplicates an edge.
    pub fn record_resolution(&self, run_id: RunId) -> bool {
        let mut resolved = self.resolved.lock();
        if resolved.contains(&run_id) {
            return false;
        }
        resolved.push(run_id);
        true
    }

    /// Resolved runs in resolution order.
    pub fn resolved(&self) -> Vec<RunId> {
        self.resolved.lock().clone()
    }
}

/// Turns an execution context's resolved set into dependency edges.
pub struct DependencyTracker<'a> {
    registry: &'a RunRegistry,
    minimize: bool,
}

impl<'a> DependencyTracker<'a> {
    pub fn new(registry: &'a RunRegistry, minimize: bool) -> Self {
        Self { registry, minimize }
    }

    /// Edges for a run about to be created from `ctx`, sorted by run id.
    ///
    /// Runs in the context's own lineage are left out: the nesting already
    /// relates them to the new run.
    pub fn dependencies_for(&self, ctx: &ExecutionContext) -> Vec<RunId> {
        let lineage: HashSet<RunId> = ctx.lineage().iter().copied().collect();
        let mut candidates: Vec<RunId> = ctx
            .resolved()
            .into_iter()
            .filter(|id| !lineage.contains(id))
            .collect();
        candidates.sort_unstable();
        candidates.dedup();

        if self.minimize && candidates.len() > 1 {
            let before = candidates.len();
            candidates = self.minimize_edges(candidates);
            if candidates.len() != before {
                tracing::debug!(
                    "Dropped {} implied dependency edge(s)",
                    before - candidates.len()
                );
            }
        }
        candidates
    }

    /// Drop every candidate that another candidate already depends on,
    /// directly or transitively.
    fn minimize_edges(&self, candidates: Vec<RunId>) -> Vec<RunId> {
        let mut implied = HashSet::new();
        let mut visited = HashSet::new();
        for &candidate in &candidates {
            let mut stack = self.registry.dependencies_of(candidate).unwrap_or_default();
            while let Some(dep) = stack.pop() {
                implied.insert(dep);
                if visited.insert(dep) {
                    if let Some(next) = self.registry.dependencies_of(dep) {
                        stack.extend(next);
                    }
                }
            }
        }
        candidates
            .into_iter()
            .filter(|id| !implied.contains(id))
            .collect()
    }
}
