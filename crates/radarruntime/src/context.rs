use crate::executor::{panic_message, Task, TaskBody, TaskExecutor};
use crate::future::RunFuture;
use crate::registry::RunRegistry;
use crate::runtime::RuntimeConfig;
use crate::tracker::{DependencyTracker, ExecutionContext};
use async_trait::async_trait;
use futures::FutureExt;
use radarcore::{FlowError, RunId, RunKind, Value};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Orchestration logic that may submit tasks and subflows.
#[async_trait]
pub trait Flow: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: FlowContext, args: Vec<Value>) -> Result<Value, FlowError>;
}

/// Argument to a task or flow invocation.
///
/// Futures are resolved by the engine before the new run is created, which
/// also records them as dependencies of that run.
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    Future(RunFuture),
}

impl From<RunFuture> for Arg {
    fn from(future: RunFuture) -> Self {
        Arg::Future(future)
    }
}

impl From<&RunFuture> for Arg {
    fn from(future: &RunFuture) -> Self {
        Arg::Future(future.clone())
    }
}

macro_rules! arg_from_value {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Arg {
            fn from(v: $ty) -> Self {
                Arg::Value(Value::from(v))
            }
        })*
    };
}

arg_from_value!(Value, String, &str, char, f64, i64, usize, bool);

pub(crate) struct Shared {
    pub(crate) registry: Arc<RunRegistry>,
    pub(crate) executor: TaskExecutor,
    pub(crate) config: RuntimeConfig,
}

/// Handle a flow body uses to invoke tasks and subflows.
///
/// Each flow run gets its own context; it is passed into the body explicitly
/// rather than looked up from ambient state. Clones share the same scope.
#[derive(Clone)]
pub struct FlowContext {
    shared: Arc<Shared>,
    scope: Arc<ExecutionContext>,
}

impl FlowContext {
    pub(crate) fn root(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            scope: Arc::new(ExecutionContext::root()),
        }
    }

    fn enter(&self, run_id: RunId) -> Self {
        Self {
            shared: self.shared.clone(),
            scope: Arc::new(ExecutionContext::enter(&self.scope, run_id)),
        }
    }

    /// A context for a block inside the current run, e.g. one loop iteration.
    ///
    /// It starts with everything resolved so far; resolutions made through it
    /// stay local, so sibling iterations never pick up edges to each other.
    pub fn scope(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            scope: Arc::new(self.scope.scoped()),
        }
    }

    /// Innermost running flow, or `None` at the root.
    pub fn active_run(&self) -> Option<RunId> {
        self.scope.active_run()
    }

    pub fn lineage(&self) -> &[RunId] {
        self.scope.lineage()
    }

    /// Runs resolved in this scope so far.
    pub fn resolved(&self) -> Vec<RunId> {
        self.scope.resolved()
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.shared.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    pub(crate) fn record_resolution(&self, run_id: RunId) {
        if self.scope.record_resolution(run_id) {
            tracing::trace!("{} resolved in scope of {:?}", run_id, self.active_run());
        }
    }

    /// Submit a task body to the worker pool.
    ///
    /// Future arguments are resolved first; a failed argument fails the
    /// submission instead of starting the task.
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
        let values = self.resolve_args(args).await?;
        let run_id = self.create_run(RunKind::Task, name)?;
        let body: TaskBody = Box::pin(async move { body(values).await });
        Ok(self.shared.executor.spawn(run_id, name, body))
    }

    pub async fn run_task(
        &self,
        task: Arc<dyn Task>,
        args: Vec<Arg>,
    ) -> Result<RunFuture, FlowError> {
        let name = task.name().to_string();
        self.submit_task(&name, args, move |values| async move { task.run(values).await })
            .await
    }

    /// Run a (sub)flow to completion on the calling task and return its
    /// already-finished future.
    ///
    /// A failure inside the body is captured on the returned future, like a
    /// task failure. `Err` is returned only when a future argument fails or
    /// the run cannot be registered.
    pub async fn submit_flow<F, Fut>(
        &self,
        name: &str,
        args: Vec<Arg>,
        body: F,
    ) -> Result<RunFuture, FlowError>
    where
        F: FnOnce(FlowContext, Vec<Value>) -> Fut + Send,
        Fut: Future<Output = Result<Value, FlowError>> + Send,
    {
        let values = self.resolve_args(args).await?;
        let run_id = self.create_run(RunKind::Flow, name)?;
        let child = self.enter(run_id);

        tracing::info!("Starting flow {} '{}' at depth {}", run_id, name, child.scope.depth());
        let start = Instant::now();
        // Covers panics raised while building the body future as well.
        let guarded = AssertUnwindSafe(async move { body(child, values).await });
        let outcome = match guarded.catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(FlowError::msg(panic_message(panic))),
        };
        let outcome = outcome.map_err(|cause| FlowError::FlowFailed {
            run_id,
            name: name.to_string(),
            cause: Box::new(cause),
        });

        self.shared.registry.finalize(run_id, &outcome)?;
        match &outcome {
            Ok(_) => tracing::info!(
                "Flow {} '{}' completed in {}ms",
                run_id,
                name,
                start.elapsed().as_millis()
            ),
            Err(e) if self.active_run().is_none() => {
                tracing::error!(chain = ?e.run_chain(), "{}", e)
            }
            Err(e) => tracing::warn!("{}", e),
        }

        Ok(RunFuture::ready(run_id, name, RunKind::Flow, outcome))
    }

    pub async fn run_flow(
        &self,
        flow: Arc<dyn Flow>,
        args: Vec<Arg>,
    ) -> Result<RunFuture, FlowError> {
        let name = flow.name().to_string();
        self.submit_flow(&name, args, move |ctx, values| async move {
            flow.run(ctx, values).await
        })
        .await
    }

    async fn resolve_args(&self, args: Vec<Arg>) -> Result<Vec<Value>, FlowError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Arg::Value(value) => values.push(value),
                Arg::Future(future) => values.push(future.resolve(self).await?),
            }
        }
        Ok(values)
    }

    fn create_run(&self, kind: RunKind, name: &str) -> Result<RunId, FlowError> {
        let tracker =
            DependencyTracker::new(&self.shared.registry, self.shared.config.minimize_edges);
        let dependencies = tracker.dependencies_for(&self.scope);
        self.shared
            .registry
            .create(kind, name, self.scope.active_run(), dependencies)
    }
}
