//! Server lifecycle, options and the two submission paths.

use std::{
    fmt,
    future::Future,
    sync::{Arc, Weak},
    time::Duration,
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::{
    sync::{mpsc, oneshot, Mutex, RwLock},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ConveyorConfig,
    dedup::DedupCache,
    error::ServerError,
    message::{Message, Request},
    workers::{self, PeriodicTask, WorkerContext},
};

/// Boxed future returned by an action callback.
pub type ActionFuture<R> = BoxFuture<'static, anyhow::Result<R>>;

/// The user callback invoked by workers: `(token, payload, worker_slot)`.
pub type ActionFn<M> =
    Arc<dyn Fn(CancellationToken, M, usize) -> ActionFuture<<M as Message>::Reply> + Send + Sync>;

/// Wraps an async closure into an [`ActionFn`].
pub fn action<M, F, Fut>(f: F) -> ActionFn<M>
where
    M: Message,
    F: Fn(CancellationToken, M, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<M::Reply>> + Send + 'static,
{
    Arc::new(move |token, msg, slot| Box::pin(f(token, msg, slot)))
}

/// Policy flags for a server, immutable after registration.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub(crate) latest_only: bool,
    pub(crate) deduplicate: bool,
    pub(crate) workers: Option<usize>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shed load by collapsing the backlog to its newest entry before each
    /// action invocation. Forces the worker pool down to a single worker and
    /// makes synchronous submission an error.
    pub fn latest_only(mut self) -> Self {
        self.latest_only = true;
        self
    }

    /// Reject submissions whose payload hash is already queued or executing.
    pub fn deduplicate(mut self) -> Self {
        self.deduplicate = true;
        self
    }

    /// Overrides the worker-pool size for this server.
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = Some(count);
        self
    }
}

/// Externally observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Started,
}

/// Everything that exists only while the server runs.
struct Running<M: Message> {
    queue_tx: mpsc::Sender<Request<M>>,
    /// Keeps the queue open on servers without workers (scheduler-only
    /// servers still accept and buffer submissions, as a worker-backed one
    /// would while its pool is busy).
    _queue_rx: workers::SharedQueue<M>,
    worker_exit: Vec<mpsc::Sender<()>>,
    scheduler_exit: Vec<mpsc::Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

enum Lifecycle<M: Message> {
    Stopped,
    Started(Running<M>),
}

/// A named worker-pool server.
///
/// Created through [`crate::registry::Registry::register`]; the registry
/// holds one `Arc` and hands out clones. The server starts in the stopped
/// state: no workers or schedulers run until [`Server::start`] is called,
/// and every submission against a stopped server fails with
/// [`ServerError::Stopped`].
///
/// # Contract
///
/// `start` must not be called while the server is started, and `stop` must
/// not race another `stop` on the same server. Both misuses are degraded to
/// a warning rather than undefined behavior, but callers should not rely on
/// that.
pub struct Server<M: Message> {
    name: String,
    options: Options,
    worker_count: usize,
    action: Option<ActionFn<M>>,
    tasks: Vec<PeriodicTask>,
    queue_capacity: usize,
    dedup: Arc<DedupCache>,
    lifecycle: RwLock<Lifecycle<M>>,
    /// Back-reference for self-removal on stop; weak so dropping the
    /// registry never leaks servers through a cycle.
    registry: Weak<DashMap<String, Arc<Server<M>>>>,
}

impl<M: Message> fmt::Debug for Server<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("worker_count", &self.worker_count)
            .field("queue_capacity", &self.queue_capacity)
            .finish_non_exhaustive()
    }
}

impl<M: Message> Server<M> {
    pub(crate) fn new(
        name: String,
        action: Option<ActionFn<M>>,
        tasks: Vec<PeriodicTask>,
        options: Options,
        config: &ConveyorConfig,
        registry: Weak<DashMap<String, Arc<Server<M>>>>,
    ) -> Self {
        let mut worker_count = options
            .workers
            .or(config.workers.default_count)
            .unwrap_or_else(default_worker_count);
        if options.latest_only {
            worker_count = 1;
        }
        if action.is_none() {
            worker_count = 0;
        }
        let capacity = config.queue.capacity;
        Self {
            name,
            options,
            worker_count,
            action,
            tasks,
            queue_capacity: capacity,
            dedup: Arc::new(DedupCache::new(
                capacity,
                Duration::from_secs(config.dedup.ttl_secs),
            )),
            lifecycle: RwLock::new(Lifecycle::Stopped),
            registry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub async fn state(&self) -> ServerState {
        match *self.lifecycle.read().await {
            Lifecycle::Stopped => ServerState::Stopped,
            Lifecycle::Started(_) => ServerState::Started,
        }
    }

    /// Spawns the worker pool and one scheduler per periodic task, then
    /// flips the server to started.
    pub async fn start(&self) {
        let mut lifecycle = self.lifecycle.write().await;
        if matches!(*lifecycle, Lifecycle::Started(_)) {
            tracing::warn!(server = %self.name, "start called on a started server");
            return;
        }

        let (queue_tx, queue_rx) = mpsc::channel(self.queue_capacity);
        let queue = Arc::new(Mutex::new(queue_rx));
        let mut handles = Vec::with_capacity(self.worker_count + self.tasks.len());

        let mut worker_exit = Vec::with_capacity(self.worker_count);
        if let Some(action) = &self.action {
            for slot in 0..self.worker_count {
                let (exit_tx, exit_rx) = mpsc::channel(1);
                worker_exit.push(exit_tx);
                let ctx = WorkerContext {
                    server: self.name.clone(),
                    slot,
                    latest_only: self.options.latest_only,
                    action: action.clone(),
                    dedup: self.dedup.clone(),
                    queue: queue.clone(),
                };
                handles.push(tokio::spawn(workers::pool::run(ctx, exit_rx)));
            }
        }

        let mut scheduler_exit = Vec::with_capacity(self.tasks.len());
        for (slot, task) in self.tasks.iter().enumerate() {
            let (exit_tx, exit_rx) = mpsc::channel(1);
            scheduler_exit.push(exit_tx);
            handles.push(tokio::spawn(workers::schedule::run(
                self.name.clone(),
                slot,
                task.clone(),
                exit_rx,
            )));
        }

        *lifecycle = Lifecycle::Started(Running {
            queue_tx,
            _queue_rx: queue,
            worker_exit,
            scheduler_exit,
            handles,
        });
        tracing::info!(
            server = %self.name,
            workers = self.worker_count,
            schedulers = self.tasks.len(),
            "server started"
        );
    }

    /// Stops the server and removes it from its registry.
    ///
    /// The state flips to stopped *before* the exit signals go out, so any
    /// submission racing this call is rejected cleanly. Does not return
    /// until every worker and scheduler has exited; requests still buffered
    /// in the queue at that point are abandoned.
    pub async fn stop(&self) {
        let running = {
            let mut lifecycle = self.lifecycle.write().await;
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Started(running) => running,
                Lifecycle::Stopped => {
                    tracing::warn!(server = %self.name, "stop called on a stopped server");
                    return;
                }
            }
        };
        let Running {
            queue_tx,
            _queue_rx,
            worker_exit,
            scheduler_exit,
            handles,
        } = running;

        for exit in &worker_exit {
            let _ = exit.send(()).await;
        }
        for exit in &scheduler_exit {
            let _ = exit.send(()).await;
        }
        // Closing the queue makes in-flight submissions fail over to
        // `ServerError::Stopped` once the workers are gone.
        drop(queue_tx);
        for handle in handles {
            let _ = handle.await;
        }

        if let Some(servers) = self.registry.upgrade() {
            servers.remove(&self.name);
        }
        tracing::info!(server = %self.name, "server stopped");
    }

    /// Synchronous submission: blocks until the action's reply arrives or
    /// `token` fires.
    ///
    /// The request is enqueued even when `token` is already canceled; the
    /// caller just does not wait for the outcome. Cancellation never
    /// preempts a running action and never removes a queued request.
    pub async fn post(&self, token: CancellationToken, msg: M) -> Result<M::Reply, ServerError> {
        let queue_tx = self.queue_sender().await?;
        if self.options.latest_only {
            return Err(ServerError::CoalescingUnsupported);
        }
        let hash = self.record_dedup(&msg)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = Request::new(msg, token.clone(), Some(reply_tx));
        if queue_tx.send(request).await.is_err() {
            self.release_dedup(hash);
            return Err(ServerError::Stopped(self.name.clone()));
        }

        tokio::select! {
            biased;
            replied = reply_rx => match replied {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(error)) => Err(ServerError::Action(error)),
                // The request was abandoned by a stopping server before a
                // worker could reply.
                Err(_) => Err(ServerError::Stopped(self.name.clone())),
            },
            _ = token.cancelled() => Err(ServerError::Canceled),
        }
    }

    /// Asynchronous submission: returns as soon as the request is buffered.
    ///
    /// Blocks while the queue is full; that is the only backpressure the
    /// server applies.
    pub async fn push(&self, token: CancellationToken, msg: M) -> Result<(), ServerError> {
        let queue_tx = self.queue_sender().await?;
        let hash = self.record_dedup(&msg)?;

        let request = Request::new(msg, token, None);
        if queue_tx.send(request).await.is_err() {
            self.release_dedup(hash);
            return Err(ServerError::Stopped(self.name.clone()));
        }
        Ok(())
    }

    /// Clones the queue sender while the state is observed as started.
    ///
    /// A `stop` winning the race after this returns closes the queue, and
    /// the subsequent send surfaces as [`ServerError::Stopped`]; no panic
    /// path exists.
    async fn queue_sender(&self) -> Result<mpsc::Sender<Request<M>>, ServerError> {
        match &*self.lifecycle.read().await {
            Lifecycle::Started(running) => Ok(running.queue_tx.clone()),
            Lifecycle::Stopped => Err(ServerError::Stopped(self.name.clone())),
        }
    }

    /// Records the payload hash in the dedupe cache when the policy applies.
    ///
    /// Recording happens before enqueueing, so no window exists in which two
    /// submissions of the same hash can both pass the check.
    fn record_dedup(&self, msg: &M) -> Result<Option<String>, ServerError> {
        if !self.options.deduplicate || !msg.unique() {
            return Ok(None);
        }
        let Some(hash) = msg.dedup_hash() else {
            return Ok(None);
        };
        if self.dedup.try_record(&hash) {
            Ok(Some(hash))
        } else {
            Err(ServerError::DuplicateMessage(hash))
        }
    }

    /// Backs out a recorded hash when the enqueue it guarded failed.
    fn release_dedup(&self, hash: Option<String>) {
        if let Some(hash) = hash {
            self.dedup.remove(&hash);
        }
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
        * 2
}
