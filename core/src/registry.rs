//! Service registry: name → client.
//!
//! # Design
//! A `Registry` resolves names through its `ConfigStore` and builds each
//! client once, on first lookup. Clients are held behind their own mutex:
//! the process-wide registry lock is only taken for the lookup, so calls to
//! different services run concurrently and `with_service` may be nested for
//! distinct names. Nesting `with_service` for the same name deadlocks, as
//! any non-reentrant lock would.
//!
//! The process-wide instance is reached only through `configure`,
//! `set_raise_on_failure` and `with_service`; callers that want isolated
//! state construct their own `Registry`.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::client::ServiceClient;
use crate::config::ConfigStore;
use crate::engine::FailurePolicy;
use crate::error::ClientError;

/// Shared handle to one registered client.
pub type SharedClient = Arc<Mutex<ServiceClient>>;

/// Clients for named services, built lazily from a configuration store.
pub struct Registry {
    store: Option<Box<dyn ConfigStore>>,
    clients: HashMap<String, SharedClient>,
    raise_on_failure: bool,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            store: None,
            clients: HashMap::new(),
            raise_on_failure: true,
        }
    }

    /// Replace the store. Clients built from the previous store are dropped.
    pub fn configure(&mut self, store: impl ConfigStore + 'static) {
        self.store = Some(Box::new(store));
        self.clients.clear();
    }

    pub fn raise_on_failure(&self) -> bool {
        self.raise_on_failure
    }

    /// Default failure policy for clients whose config does not set one.
    /// Idle clients are updated now; a client busy in a call picks the
    /// default up on its next `with_service`.
    pub fn set_raise_on_failure(&mut self, raise: bool) {
        self.raise_on_failure = raise;
        for client in self.clients.values() {
            if let Some(mut client) = client.try_lock() {
                apply_default(&mut client, raise);
            }
        }
    }

    /// Register a prebuilt client under its own name.
    pub fn insert(&mut self, mut client: ServiceClient) {
        apply_default(&mut client, self.raise_on_failure);
        self.clients
            .insert(client.name().to_string(), Arc::new(Mutex::new(client)));
    }

    pub fn service(&mut self, name: &str) -> Result<SharedClient, ClientError> {
        if let Some(client) = self.clients.get(name) {
            return Ok(Arc::clone(client));
        }
        let config = self
            .store
            .as_ref()
            .and_then(|store| store.resolve(name))
            .ok_or_else(|| ClientError::UnknownService(name.to_string()))?;
        let mut client = ServiceClient::new(name, config)?;
        apply_default(&mut client, self.raise_on_failure);
        tracing::debug!(service = name, "built service client");
        let client = Arc::new(Mutex::new(client));
        self.clients.insert(name.to_string(), Arc::clone(&client));
        Ok(client)
    }
}

/// A `raiseOnFailure` in the client's own config always wins.
fn apply_default(client: &mut ServiceClient, raise: bool) {
    if client.config().raise_on_failure.is_none() {
        client.set_failure_policy(FailurePolicy::from_raise(raise));
    }
}

static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();

fn global() -> &'static Mutex<Registry> {
    REGISTRY.get_or_init(|| Mutex::new(Registry::new()))
}

/// Load the process-wide registry from `store`.
pub fn configure(store: impl ConfigStore + 'static) {
    global().lock().configure(store);
}

/// Process-wide default for whether terminal failures are returned as errors.
pub fn set_raise_on_failure(raise: bool) {
    global().lock().set_raise_on_failure(raise);
}

/// Run `f` against the process-wide client for `name`. Only that client is
/// locked while `f` runs.
pub fn with_service<R>(
    name: &str,
    f: impl FnOnce(&mut ServiceClient) -> R,
) -> Result<R, ClientError> {
    let (client, raise) = {
        let mut registry = global().lock();
        (registry.service(name)?, registry.raise_on_failure())
    };
    let mut client = client.lock();
    apply_default(&mut client, raise);
    Ok(f(&mut client))
}
