//! The scheduler loop: one independent loop per registered periodic task.

use std::{future::Future, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use tokio::{
    sync::mpsc,
    time::{self, MissedTickBehavior},
};

/// Boxed future produced by one periodic-task invocation.
pub type TaskFuture = BoxFuture<'static, ()>;

/// A periodic-task callback; receives its scheduler slot index.
pub type TaskFn = Arc<dyn Fn(usize) -> TaskFuture + Send + Sync>;

/// A periodic background task and the interval it re-arms on.
#[derive(Clone)]
pub struct PeriodicTask {
    pub(crate) run: TaskFn,
    pub(crate) every: Duration,
}

impl PeriodicTask {
    /// Wraps an async closure into a task firing immediately at server start
    /// and then every `every`.
    pub fn new<F, Fut>(every: Duration, task: F) -> Self
    where
        F: Fn(usize) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            run: Arc::new(move |slot| Box::pin(task(slot))),
            every,
        }
    }

    pub fn interval(&self) -> Duration {
        self.every
    }
}

/// Runs `task` once immediately, then on every interval tick, until `exit`
/// fires. Schedulers are independent of each other and of the worker pool;
/// no ordering is guaranteed across loops.
pub(crate) async fn run(
    server: String,
    slot: usize,
    task: PeriodicTask,
    mut exit: mpsc::Receiver<()>,
) {
    let mut ticker = time::interval(task.every);
    // A task outrunning its interval delays the next tick instead of
    // triggering a burst of catch-up invocations.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = exit.recv() => {
                tracing::info!(server = %server, slot, "scheduler exiting");
                return;
            }
            _ = ticker.tick() => (task.run)(slot).await,
        }
    }
}
