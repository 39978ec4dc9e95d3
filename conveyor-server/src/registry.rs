//! The named-server registry.
//!
//! The registry is an explicitly constructed value the host process owns and
//! injects where needed, not a package-level global. Cloning is cheap and
//! shares the underlying map, so one registry can be handed to every
//! component that submits by name.

use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use rand::{distributions::Alphanumeric, Rng};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ConveyorConfig,
    error::ServerError,
    handler::ServerHandler,
    message::Message,
    server::{ActionFn, Options, Server},
    workers::PeriodicTask,
};

/// Length of generated server names.
const GENERATED_NAME_LEN: usize = 16;

/// A concurrency-safe map from server name to server handle.
pub struct Registry<M: Message> {
    servers: Arc<DashMap<String, Arc<Server<M>>>>,
    config: ConveyorConfig,
}

impl<M: Message> Clone for Registry<M> {
    fn clone(&self) -> Self {
        Self {
            servers: self.servers.clone(),
            config: self.config.clone(),
        }
    }
}

impl<M: Message> Default for Registry<M> {
    fn default() -> Self {
        Self::new(ConveyorConfig::default())
    }
}

impl<M: Message> Registry<M> {
    pub fn new(config: ConveyorConfig) -> Self {
        Self {
            servers: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Builds a server and inserts it under `name`; a random name is
    /// generated when `None` is given.
    ///
    /// The check-then-insert is atomic: of two concurrent registrations of
    /// one name, exactly one succeeds and the other gets
    /// [`ServerError::DuplicateName`].
    pub fn register(
        &self,
        name: Option<String>,
        action: Option<ActionFn<M>>,
        tasks: Vec<PeriodicTask>,
        options: Options,
    ) -> Result<Arc<Server<M>>, ServerError> {
        let name = name.unwrap_or_else(generated_name);
        let server = Arc::new(Server::new(
            name.clone(),
            action,
            tasks,
            options,
            &self.config,
            Arc::downgrade(&self.servers),
        ));
        match self.servers.entry(name) {
            Entry::Occupied(occupied) => Err(ServerError::DuplicateName(occupied.key().clone())),
            Entry::Vacant(vacant) => {
                vacant.insert(server.clone());
                tracing::debug!(server = %server.name(), "server registered");
                Ok(server)
            }
        }
    }

    /// Builds a server from a declarative [`ServerHandler`] description.
    ///
    /// The handler supplies the name, worker count, schedule and message
    /// action; `options` still carry the policy flags. The returned handle
    /// is what binds the server to the handler's owner: the host keeps it
    /// alongside the handler value.
    pub fn register_handler<H>(
        &self,
        handler: Arc<H>,
        options: Options,
    ) -> Result<Arc<Server<M>>, ServerError>
    where
        H: ServerHandler<M>,
    {
        let name = handler.name();
        let tasks = handler.schedule();
        let options = options.workers(handler.worker_count());
        let handling = handler.clone();
        let action: ActionFn<M> = Arc::new(move |token, msg, slot| {
            let handler = handling.clone();
            Box::pin(async move { handler.handle(token, msg, slot).await })
        });
        self.register(Some(name), Some(action), tasks, options)
    }

    /// Looks up a server by name.
    pub fn get(&self, name: &str) -> Result<Arc<Server<M>>, ServerError> {
        self.servers
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServerError::NotFound(name.to_string()))
    }

    /// Synchronous name-based submission; see [`Server::post`].
    pub async fn post(
        &self,
        token: CancellationToken,
        name: &str,
        msg: M,
    ) -> Result<M::Reply, ServerError> {
        self.get(name)?.post(token, msg).await
    }

    /// Asynchronous name-based submission; see [`Server::push`].
    pub async fn push(
        &self,
        token: CancellationToken,
        name: &str,
        msg: M,
    ) -> Result<(), ServerError> {
        self.get(name)?.push(token, msg).await
    }

    /// Stops the named server; it removes itself from the registry before
    /// this returns.
    pub async fn stop(&self, name: &str) -> Result<(), ServerError> {
        self.get(name)?.stop().await;
        Ok(())
    }

    /// Stops every registered server. Intended for host teardown.
    pub async fn stop_all(&self) {
        for name in self.names() {
            if let Ok(server) = self.get(&name) {
                server.stop().await;
            }
        }
    }

    /// Names of all currently registered servers.
    pub fn names(&self) -> Vec<String> {
        self.servers.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

fn generated_name() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_NAME_LEN)
        .map(char::from)
        .collect()
}
