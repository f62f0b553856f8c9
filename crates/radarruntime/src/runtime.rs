use crate::context::{Arg, FlowContext, Shared};
use crate::executor::TaskExecutor;
use crate::future::RunFuture;
use crate::graph::ExecutionGraph;
use crate::registry::RunRegistry;
use radarcore::{FlowError, RunEvent, RunEventKind, RunId, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// Process-level entry point: owns the run registry and the task workers.
///
/// Top-level flows and tasks are submitted from the runtime's root context;
/// everything nested goes through the `FlowContext` handed to flow bodies.
pub struct FlowRuntime {
    shared: Arc<Shared>,
    root: FlowContext,
}

impl FlowRuntime {
    /// Create a new runtime with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        let registry = Arc::new(RunRegistry::new(config.event_buffer_size));
        let executor = TaskExecutor::new(registry.clone(), config.max_parallel_tasks);
        let shared = Arc::new(Shared {
            registry,
            executor,
            config,
        });
        let root = FlowContext::root(shared.clone());
        Self { shared, root }
    }

    /// Context outside of any run. Resolutions made here feed the
    /// dependencies of later top-level submissions.
    pub fn root(&self) -> &FlowContext {
        &self.root
    }

    /// Run a top-level flow to completion.
    pub async fn run_flow<F, Fut>(
        &self,
        name: &str,
        args: Vec<Arg>,
        body: F,
    ) -> Result<RunFuture, FlowError>
    where
        F: FnOnce(FlowContext, Vec<Value>) -> Fut + Send,
        Fut: Future<Output = Result<Value, FlowError>> + Send,
    {
        self.root.submit_flow(name, args, body).await
    }

    /// Submit a task that belongs to no flow.
    pub async fn submit_task<F, Fut>(
        &self,
        name: &str,
        args: Vec<Arg>,
        body: F,
    ) -> Result<RunFuture, FlowError>
    where
        F: FnOnce(Vec<Value>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, FlowError>> + Send + 'static,
    {
        self.root.submit_task(name, args, body).await
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.shared.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    /// Subscribe to run events as they happen
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.shared.registry.subscribe()
    }

    /// Every event emitted so far
    pub fn events(&self) -> Vec<RunEvent> {
        self.shared.registry.events()
    }

    /// Wait until every run in flight has emitted `run_finalized`, giving up
    /// after `limit`. Returns whether the runtime went idle.
    pub async fn wait_until_idle(&self, limit: Duration) -> bool {
        // Subscribe before scanning, so a run finishing in between is not missed.
        let mut feed = self.subscribe_events();
        let registry = self.registry();
        let mut running: HashSet<RunId> = registry
            .all()
            .filter(|r| !r.is_finalized())
            .map(|r| r.id)
            .collect();

        let drained = async {
            while !running.is_empty() {
                match feed.recv().await {
                    Ok(event) => match event.event {
                        RunEventKind::RunCreated => {
                            running.insert(event.run_id);
                        }
                        RunEventKind::RunFinalized => {
                            running.remove(&event.run_id);
                        }
                    },
                    Err(RecvError::Lagged(missed)) => {
                        tracing::debug!("Event feed lagged by {}, rescanning", missed);
                        running.retain(|id| {
                            registry.get(*id).is_some_and(|r| !r.is_finalized())
                        });
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        };

        tokio::time::timeout(limit, drained).await.is_ok()
    }

    /// Ring layout of `root` and everything nested below it.
    pub fn graph_for(&self, root: RunId) -> Result<ExecutionGraph, FlowError> {
        ExecutionGraph::from_registry(&self.shared.registry, root)
    }
}

impl Default for FlowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Task bodies allowed to run at the same time.
    pub max_parallel_tasks: usize,
    pub event_buffer_size: usize,
    /// Leave out dependency edges already implied through another edge.
    pub minimize_edges: bool,
    /// Timeout applied by `RunFuture::resolve` when the caller gives none.
    pub resolve_timeout_ms: Option<u64>,
}

impl RuntimeConfig {
    pub fn with_max_parallel_tasks(mut self, max: usize) -> Self {
        self.max_parallel_tasks = max;
        self
    }

    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    pub fn with_minimize_edges(mut self, minimize: bool) -> Self {
        self.minimize_edges = minimize;
        self
    }

    /// Sub-millisecond timeouts round up, so only `Duration::ZERO` means
    /// "give up immediately".
    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_nanos().div_ceil(1_000_000);
        self.resolve_timeout_ms = Some(u64::try_from(millis).unwrap_or(u64::MAX));
        self
    }

    pub fn resolve_timeout(&self) -> Option<Duration> {
        self.resolve_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 10,
            event_buffer_size: 1000,
            minimize_edges: true,
            resolve_timeout_ms: None,
        }
    }
}
