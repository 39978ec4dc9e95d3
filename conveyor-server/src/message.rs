//! The payload contract and the request type that travels through the queue.

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// The contract every server payload implements.
///
/// The associated `Reply` type is what the server's action produces for this
/// payload; it is delivered back to synchronous callers through the reply
/// slot and discarded for asynchronous ones.
///
/// The two hash methods form an optional capability: payloads that return
/// `Some` from [`Message::dedup_hash`] carry an identity the server can use
/// for in-flight deduplication. The defaults opt out entirely, so a plain
/// payload needs nothing beyond `impl Message for Foo { type Reply = Bar; }`.
pub trait Message: Send + 'static {
    /// The result type the action produces for this payload.
    type Reply: Send + 'static;

    /// Identity hash for deduplication. `None` disables deduplication for
    /// this payload regardless of server options.
    fn dedup_hash(&self) -> Option<String> {
        None
    }

    /// Whether the hash should actually block duplicate submissions. A
    /// payload may expose a hash for bookkeeping while opting out of the
    /// duplicate check itself.
    fn unique(&self) -> bool {
        false
    }
}

/// Sending half of a request's single-use reply slot.
pub(crate) type ReplyTx<M> = oneshot::Sender<anyhow::Result<<M as Message>::Reply>>;

/// The unit buffered in a server's queue.
///
/// `reply` is present only for synchronous submissions. The slot is written
/// at most once; if the caller stopped waiting (cancellation) the worker's
/// send simply fails and the result is dropped.
pub(crate) struct Request<M: Message> {
    pub(crate) msg: M,
    pub(crate) token: CancellationToken,
    pub(crate) reply: Option<ReplyTx<M>>,
}

impl<M: Message> Request<M> {
    pub(crate) fn new(msg: M, token: CancellationToken, reply: Option<ReplyTx<M>>) -> Self {
        Self { msg, token, reply }
    }
}
