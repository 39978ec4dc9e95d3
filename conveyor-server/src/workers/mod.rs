//! The background loops behind a started server: the worker pool draining
//! the request queue and one scheduler per periodic task.

pub(crate) mod pool;
pub(crate) mod schedule;

pub use schedule::{PeriodicTask, TaskFn, TaskFuture};

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::{
    dedup::DedupCache,
    message::{Message, Request},
    server::ActionFn,
};

/// Receiving end of a server's queue, shared by all workers of the pool.
pub(crate) type SharedQueue<M> = Arc<Mutex<mpsc::Receiver<Request<M>>>>;

/// Everything one worker needs, assembled at start time.
pub(crate) struct WorkerContext<M: Message> {
    pub(crate) server: String,
    pub(crate) slot: usize,
    pub(crate) latest_only: bool,
    pub(crate) action: ActionFn<M>,
    pub(crate) dedup: Arc<DedupCache>,
    pub(crate) queue: SharedQueue<M>,
}
