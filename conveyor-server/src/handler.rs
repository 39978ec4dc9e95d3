//! Declarative server descriptions.
//!
//! A richer type can describe a whole server (name, worker count, schedule
//! and message handling) and have the registry assemble it via
//! [`crate::registry::Registry::register_handler`]. The registered
//! [`crate::server::Server`] handle is returned for the host to hold,
//! composing has-a style instead of by embedding.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{message::Message, workers::PeriodicTask};

/// A type that knows how to be a server.
#[async_trait]
pub trait ServerHandler<M: Message>: Send + Sync + 'static {
    /// Registry key for the server built from this handler.
    fn name(&self) -> String;

    /// Number of concurrent workers the server should run. Still subject to
    /// the policy forcing: one worker under latest-only coalescing.
    fn worker_count(&self) -> usize;

    /// Periodic background tasks to run alongside the workers.
    fn schedule(&self) -> Vec<PeriodicTask> {
        Vec::new()
    }

    /// Processes one message on worker `slot`.
    async fn handle(
        &self,
        token: CancellationToken,
        msg: M,
        slot: usize,
    ) -> anyhow::Result<M::Reply>;
}
