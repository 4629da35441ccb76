//! Client registry.
//!
//! A client is one independent caller sharing the engine. Its context holds
//! an optional logger sink and the set of top-level handles it created, which
//! is what lets [`ClientRegistry::release`] tell whether the caller is leaking
//! live sessions or scenes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;

use crate::error::{HostError, HostResult};
use crate::handle::{ClientId, HandleKind, SceneId, SceneParamsId, SessionId, SessionParamsId};
use crate::logging::LoggerSink;

/// A top-level handle owned by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnedHandle {
    SceneParams(SceneParamsId),
    SessionParams(SessionParamsId),
    Scene(SceneId),
    Session(SessionId),
}

/// Per-client state.
#[derive(Default)]
pub struct ClientContext {
    logger: Option<LoggerSink>,
    owned: HashSet<OwnedHandle>,
}

impl ClientContext {
    /// The registered logger sink, if any.
    pub fn logger(&self) -> Option<&LoggerSink> {
        self.logger.as_ref()
    }

    fn live_sessions(&self) -> usize {
        self.owned
            .iter()
            .filter(|h| matches!(h, OwnedHandle::Session(_)))
            .count()
    }

    fn live_scenes(&self) -> usize {
        self.owned
            .iter()
            .filter(|h| matches!(h, OwnedHandle::Scene(_)))
            .count()
    }
}

/// Maps client IDs to their contexts.
pub struct ClientRegistry {
    next_id: AtomicU32,
    clients: RwLock<HashMap<ClientId, ClientContext>>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a new client. IDs start at 1 and are never reused.
    pub fn create(&self) -> ClientId {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.clients.write().insert(id, ClientContext::default());
        log::debug!("ClientRegistry: registered {id}");
        id
    }

    /// Removes a client context.
    ///
    /// Releasing while sessions or scenes are still alive is a usage error:
    /// the context is removed anyway, the leftovers are returned inside
    /// [`HostError::UsageWarning`] and stay alive until destroyed explicitly.
    pub fn release(&self, id: ClientId) -> HostResult<()> {
        let context = self
            .clients
            .write()
            .remove(&id)
            .ok_or(HostError::invalid(HandleKind::Client, u64::from(id.0)))?;

        let sessions = context.live_sessions();
        let scenes = context.live_scenes();
        if sessions > 0 || scenes > 0 {
            return Err(HostError::UsageWarning(format!(
                "{id} released with {sessions} live session(s) and {scenes} live scene(s); \
                 they are orphaned and must be destroyed explicitly"
            )));
        }
        log::debug!("ClientRegistry: released {id}");
        Ok(())
    }

    /// Whether `id` is a registered client.
    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.read().contains_key(&id)
    }

    /// Sets or clears the client's logger sink.
    pub fn set_logger(&self, id: ClientId, sink: Option<LoggerSink>) -> HostResult<()> {
        let mut clients = self.clients.write();
        let context = clients
            .get_mut(&id)
            .ok_or(HostError::invalid(HandleKind::Client, u64::from(id.0)))?;
        context.logger = sink;
        Ok(())
    }

    /// The client's logger sink, if the client exists and has one.
    pub fn logger(&self, id: ClientId) -> Option<LoggerSink> {
        self.clients.read().get(&id).and_then(|c| c.logger().cloned())
    }

    /// Records that `id` now owns `handle`. Unknown clients are ignored:
    /// objects of released clients are orphans and tracked nowhere.
    pub fn track(&self, id: ClientId, handle: OwnedHandle) {
        if let Some(context) = self.clients.write().get_mut(&id) {
            context.owned.insert(handle);
        }
    }

    /// Records that `handle` was destroyed.
    pub fn untrack(&self, id: ClientId, handle: OwnedHandle) {
        if let Some(context) = self.clients.write().get_mut(&id) {
            context.owned.remove(&handle);
        }
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    /// Whether no clients are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every client context.
    pub fn clear(&self) {
        self.clients.write().clear();
    }
}
