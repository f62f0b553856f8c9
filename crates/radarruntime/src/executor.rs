use crate::future::RunFuture;
use crate::registry::RunRegistry;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use radarcore::{FlowError, RunId, RunKind, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Boxed body of a task, ready to run on a worker.
pub type TaskBody = BoxFuture<'static, Result<Value, FlowError>>;

/// A named, reusable unit of work.
///
/// Implement this for tasks you want to submit more than once; one-off work
/// can go through `FlowContext::submit_task` with a closure instead.
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, args: Vec<Value>) -> Result<Value, FlowError>;
}

/// Runs task bodies on tokio workers, at most `max_parallel` at a time.
///
/// Whatever a body returns or raises (panics included) is captured on its run
/// and future; nothing propagates to the submitter until it resolves.
#[derive(Clone)]
pub struct TaskExecutor {
    registry: Arc<RunRegistry>,
    permits: Arc<Semaphore>,
}

impl TaskExecutor {
    pub fn new(registry: Arc<RunRegistry>, max_parallel: usize) -> Self {
        Self {
            registry,
            permits: Arc::new(Semaphore::new(max_parallel.max(1))),
        }
    }

    /// Start `body` for an already created task run and hand back its future.
    pub fn spawn(&self, run_id: RunId, name: &str, body: TaskBody) -> RunFuture {
        let (future, completer) = RunFuture::channel(run_id, name, RunKind::Task);
        let registry = self.registry.clone();
        let permits = self.permits.clone();
        let name = name.to_string();

        if self.permits.available_permits() == 0 {
            tracing::debug!("All workers busy, task {} '{}' queued", run_id, name);
        }

        tokio::spawn(async move {
            let outcome = match permits.acquire_owned().await {
                Ok(_permit) => {
                    completer.start();
                    tracing::info!("Starting task {} '{}'", run_id, name);
                    let start = Instant::now();
                    let result = match AssertUnwindSafe(body).catch_unwind().await {
                        Ok(result) => result,
                        Err(panic) => Err(FlowError::msg(panic_message(panic))),
                    };
                    tracing::info!(
                        "Task {} '{}' finished in {}ms",
                        run_id,
                        name,
                        start.elapsed().as_millis()
                    );
                    result
                }
                Err(_) => Err(FlowError::msg("task worker pool is closed")),
            };

            let outcome = outcome.map_err(|cause| FlowError::TaskFailed {
                run_id,
                name: name.clone(),
                cause: Box::new(cause),
            });
            if let Err(e) = &outcome {
                tracing::warn!("{}", e);
            }
            if let Err(e) = registry.finalize(run_id, &outcome) {
                tracing::error!("Could not finalize task {}: {}", run_id, e);
            }
            completer.complete(outcome);
        });

        future
    }
}

pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
