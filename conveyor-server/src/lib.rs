//! A named, concurrent worker-pool server for in-process message processing.
//!
//! This crate provides the building blocks for producer-consumer style
//! services inside a host process: each [`server::Server`] owns a bounded
//! request queue drained by a pool of concurrent workers, plus one background
//! loop per registered periodic task. Servers are registered by name in an
//! explicitly constructed [`registry::Registry`], so callers can submit
//! messages by name without passing server handles around.
//!
//! # Key Components
//!
//! *   [`registry::Registry`]: A concurrency-safe map from server name to
//!     server handle, with name-based submission and shutdown.
//! *   [`server::Server`]: The worker-pool server itself, exposing
//!     synchronous ([`server::Server::post`]) and asynchronous
//!     ([`server::Server::push`]) submission.
//! *   [`message::Message`]: The payload contract, including the optional
//!     hash capability that drives in-flight deduplication.
//! *   [`handler::ServerHandler`]: A declarative server description for
//!     building a server from a richer type rather than loose closures.
/// Configuration structures for queue, dedup-cache and worker defaults.
pub mod config;
/// The time-bounded presence cache backing deduplication.
mod dedup;
/// Error types returned by registration, submission and shutdown.
pub mod error;
/// Declarative server descriptions (trait + has-a composition).
pub mod handler;
/// The payload contract and the internal queued-request type.
pub mod message;
/// The process-wide (but explicitly owned) named-server registry.
pub mod registry;
/// Server lifecycle, options and submission paths.
pub mod server;
/// The worker and scheduler loops.
pub mod workers;

pub use config::ConveyorConfig;
pub use error::ServerError;
pub use handler::ServerHandler;
pub use message::Message;
pub use registry::Registry;
pub use server::{action, ActionFn, Options, Server, ServerState};
pub use workers::PeriodicTask;

/// Re-exported so hosts do not need a direct `tokio-util` dependency to
/// construct cancellation tokens for [`server::Server::post`].
pub use tokio_util::sync::CancellationToken;
