//! The worker loop: drains the request queue and invokes the action.

use tokio::sync::mpsc;

use super::WorkerContext;
use crate::message::{Message, Request};

/// Services the queue until the exit signal fires or the queue closes.
///
/// Exit is polled first on every iteration, so a signaled worker returns
/// without draining the backlog; buffered requests are abandoned.
pub(crate) async fn run<M: Message>(ctx: WorkerContext<M>, mut exit: mpsc::Receiver<()>) {
    loop {
        tokio::select! {
            biased;
            _ = exit.recv() => {
                tracing::debug!(server = %ctx.server, slot = ctx.slot, "worker exiting");
                return;
            }
            received = next_request(&ctx) => {
                match received {
                    Some(request) => process(&ctx, request).await,
                    None => {
                        tracing::debug!(server = %ctx.server, slot = ctx.slot, "queue closed, worker exiting");
                        return;
                    }
                }
            }
        }
    }
}

/// Pops the next request, collapsing the backlog to its newest entry when
/// latest-only coalescing is on. Collapsed-away requests are never executed;
/// none of them can carry a reply slot because synchronous submission is
/// rejected on latest-only servers.
async fn next_request<M: Message>(ctx: &WorkerContext<M>) -> Option<Request<M>> {
    let mut queue = ctx.queue.lock().await;
    let mut request = queue.recv().await?;
    if ctx.latest_only {
        while let Ok(newer) = queue.try_recv() {
            request = newer;
        }
    }
    Some(request)
}

async fn process<M: Message>(ctx: &WorkerContext<M>, request: Request<M>) {
    let Request { msg, token, reply } = request;
    // Captured up front: the payload moves into the action, and the hash
    // must be released whether or not the action succeeds.
    let hash = msg.dedup_hash();

    let result = (ctx.action)(token, msg, ctx.slot).await;
    match reply {
        Some(reply) => {
            if reply.send(result).is_err() {
                tracing::debug!(
                    server = %ctx.server,
                    slot = ctx.slot,
                    "caller stopped waiting for the reply"
                );
            }
        }
        None => {
            if let Err(error) = result {
                tracing::error!(
                    server = %ctx.server,
                    slot = ctx.slot,
                    "action failed: {:#}",
                    error
                );
            }
        }
    }

    if let Some(hash) = hash {
        ctx.dedup.remove(&hash);
    }
}
