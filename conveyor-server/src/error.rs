use thiserror::Error;

/// Defines the primary error types for registration, submission and shutdown.
///
/// Every operation in this crate reports failure through this enum; none of
/// the lifecycle races (submitting against a stopping server, duplicate
/// registration) surface as panics.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A server with the requested name is already registered.
    #[error("a server named `{0}` is already registered")]
    DuplicateName(String),

    /// No server with the requested name is registered.
    #[error("no server named `{0}` is registered")]
    NotFound(String),

    /// The target server is not in the started state. Also returned when a
    /// submission loses the race against `stop()` and finds the queue closed.
    #[error("server `{0}` is stopped")]
    Stopped(String),

    /// A message with the same hash is already queued or executing.
    #[error("message with hash `{0}` is already in flight")]
    DuplicateMessage(String),

    /// Synchronous submission is incompatible with latest-only coalescing:
    /// a coalesced-away request would leave its caller waiting forever.
    #[error("synchronous post is not supported on a latest-only server")]
    CoalescingUnsupported,

    /// The caller's cancellation token fired before a reply was delivered.
    #[error("submission canceled before a reply was delivered")]
    Canceled,

    /// The action callback itself failed; carries the worker-reported error.
    #[error("action failed: {0:#}")]
    Action(anyhow::Error),
}
