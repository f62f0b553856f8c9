use crate::registry::RunRegistry;
use petgraph::algo::{is_isomorphic_matching, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use radarcore::{FlowError, RunEvent, RunEventKind, RunId, RunKind, RunRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Parent run to a run created inside it.
    Nesting,
    /// Resolved run to a run created after the resolution.
    Dependency,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunNode {
    pub run_id: RunId,
    pub kind: RunKind,
    pub name: String,
}

/// Layout row for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingEntry {
    pub ring_index: usize,
    pub run_id: RunId,
    pub name: String,
    pub kind: RunKind,
    pub dependency_ids: Vec<RunId>,
    pub parent_run_id: Option<RunId>,
}

/// Run forest plus dependency edges, layered into rings.
///
/// A run's ring index is the length of the longest chain of nesting and
/// dependency edges that leads to it, so a nested run sits at least one ring
/// outside its parent and strictly outside everything it depends on.
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    graph: DiGraph<RunNode, EdgeKind>,
    index: HashMap<RunId, NodeIndex>,
    entries: Vec<RingEntry>,
}

impl ExecutionGraph {
    /// Lay out `records`. Parents and dependencies outside the set are kept
    /// on the entries but do not contribute edges.
    pub fn build(records: impl IntoIterator<Item = RunRecord>) -> Result<Self, FlowError> {
        let mut records: Vec<RunRecord> = records.into_iter().collect();
        records.sort_by_key(|r| r.id);

        let mut graph = DiGraph::new();
        let mut index = HashMap::with_capacity(records.len());
        for record in &records {
            let node = graph.add_node(RunNode {
                run_id: record.id,
                kind: record.kind,
                name: record.name.clone(),
            });
            index.insert(record.id, node);
        }

        for record in &records {
            let to = index[&record.id];
            if let Some(parent) = record.parent.and_then(|p| index.get(&p)) {
                graph.add_edge(*parent, to, EdgeKind::Nesting);
            }
            for dep in &record.dependencies {
                if let Some(from) = index.get(dep) {
                    graph.add_edge(*from, to, EdgeKind::Dependency);
                }
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            let node = cycle.node_id();
            let dependency = graph
                .neighbors_directed(node, Direction::Incoming)
                .next()
                .unwrap_or(node);
            FlowError::CyclicDependencyRejected {
                run_id: graph[node].run_id,
                dependency: graph[dependency].run_id,
            }
        })?;

        let mut rings: HashMap<NodeIndex, usize> = HashMap::with_capacity(order.len());
        for node in order {
            let ring = graph
                .neighbors_directed(node, Direction::Incoming)
                .filter_map(|pred| rings.get(&pred).map(|r| r + 1))
                .max()
                .unwrap_or(0);
            rings.insert(node, ring);
        }

        let mut entries: Vec<RingEntry> = records
            .into_iter()
            .map(|record| RingEntry {
                ring_index: rings[&index[&record.id]],
                run_id: record.id,
                name: record.name,
                kind: record.kind,
                dependency_ids: record.dependencies,
                parent_run_id: record.parent,
            })
            .collect();
        entries.sort_by_key(|e| (e.ring_index, e.run_id));

        tracing::debug!(
            "Laid out {} runs over {} rings",
            entries.len(),
            entries.last().map_or(0, |e| e.ring_index + 1)
        );

        Ok(Self {
            graph,
            index,
            entries,
        })
    }

    /// Graph of `root` and every run nested below it.
    pub fn from_registry(registry: &RunRegistry, root: RunId) -> Result<Self, FlowError> {
        let records = registry.subtree(root);
        if records.is_empty() {
            return Err(FlowError::UnknownRun(root));
        }
        Self::build(records)
    }

    /// Rebuild the graph from a recorded event stream.
    pub fn from_events(events: &[RunEvent]) -> Result<Self, FlowError> {
        Self::build(records_from_events(events))
    }

    /// Rows sorted by `(ring_index, run_id)`.
    pub fn entries(&self) -> &[RingEntry] {
        &self.entries
    }

    pub fn entry(&self, run_id: RunId) -> Option<&RingEntry> {
        self.entries.iter().find(|e| e.run_id == run_id)
    }

    pub fn ring_of(&self, run_id: RunId) -> Option<usize> {
        self.entry(run_id).map(|e| e.ring_index)
    }

    /// Entries grouped by ring, innermost first.
    pub fn rings(&self) -> Vec<Vec<&RingEntry>> {
        let mut grouped: BTreeMap<usize, Vec<&RingEntry>> = BTreeMap::new();
        for entry in &self.entries {
            grouped.entry(entry.ring_index).or_default().push(entry);
        }
        grouped.into_values().collect()
    }

    pub fn run_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edges(&self, kind: EdgeKind) -> Vec<(RunId, RunId)> {
        let mut edges: Vec<(RunId, RunId)> = self
            .graph
            .raw_edges()
            .iter()
            .filter(|e| e.weight == kind)
            .map(|e| (self.graph[e.source()].run_id, self.graph[e.target()].run_id))
            .collect();
        edges.sort();
        edges
    }

    pub fn contains(&self, run_id: RunId) -> bool {
        self.index.contains_key(&run_id)
    }

    /// Same shape: runs match by kind and name, edges by kind.
    pub fn is_isomorphic_to(&self, other: &ExecutionGraph) -> bool {
        is_isomorphic_matching(
            &self.graph,
            &other.graph,
            |a: &RunNode, b: &RunNode| a.kind == b.kind && a.name == b.name,
            |a: &EdgeKind, b: &EdgeKind| a == b,
        )
    }
}

/// Replay `run_created` / `run_finalized` events into records. Later events
/// for the same run overwrite state, end time and error.
pub fn records_from_events(events: &[RunEvent]) -> Vec<RunRecord> {
    let mut records: BTreeMap<RunId, RunRecord> = BTreeMap::new();
    for event in events {
        let record = records.entry(event.run_id).or_insert_with(|| RunRecord {
            id: event.run_id,
            kind: event.kind,
            name: event.name.clone(),
            parent: event.parent_run_id,
            dependencies: event.dependency_ids.clone(),
            started_at: event.timestamp,
            ended_at: None,
            state: event.state,
            error: None,
        });
        match event.event {
            RunEventKind::RunCreated => {
                record.started_at = event.timestamp;
            }
            RunEventKind::RunFinalized => {
                record.state = event.state;
                record.ended_at = Some(event.timestamp);
                record.error = event.error.clone();
            }
        }
    }
    records.into_values().collect()
}
