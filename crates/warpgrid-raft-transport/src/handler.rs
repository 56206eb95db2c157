//! Registry of inbound message handlers, one per local store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::types::{RaftMessageRequest, StoreId};

/// Consumes inbound messages addressed to one store.
///
/// Runs on the inbound dispatch task; an error ends the sending peer's
/// session.
pub type RaftMessageHandler = Arc<dyn Fn(RaftMessageRequest) -> anyhow::Result<()> + Send + Sync>;

/// Maps local store IDs to their handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Mutex<HashMap<StoreId, RaftMessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a store, replacing any previous one.
    pub fn listen(&self, store_id: StoreId, handler: RaftMessageHandler) {
        let mut handlers = self.handlers.lock().expect("handlers lock");
        handlers.insert(store_id, handler);
        debug!(store_id, "raft handler registered");
    }

    /// Unregister a store's handler.
    pub fn stop(&self, store_id: StoreId) {
        let mut handlers = self.handlers.lock().expect("handlers lock");
        if handlers.remove(&store_id).is_some() {
            debug!(store_id, "raft handler removed");
        }
    }

    /// Handler for a store. The lock is released before the caller
    /// invokes it.
    pub fn get(&self, store_id: StoreId) -> Option<RaftMessageHandler> {
        let handlers = self.handlers.lock().expect("handlers lock");
        handlers.get(&store_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().expect("handlers lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
