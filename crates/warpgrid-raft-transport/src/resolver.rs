//! Node address resolution.
//!
//! The transport never caches addresses: every new delivery worker asks
//! the resolver again, so membership changes are picked up on the next
//! connection.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use crate::error::{TransportError, TransportResult};
use crate::types::NodeId;

/// Maps a node ID to the `host:port` its transport server listens on.
pub trait AddressResolver: Send + Sync + 'static {
    fn resolve(&self, node_id: NodeId) -> TransportResult<String>;
}

impl<F> AddressResolver for F
where
    F: Fn(NodeId) -> TransportResult<String> + Send + Sync + 'static,
{
    fn resolve(&self, node_id: NodeId) -> TransportResult<String> {
        self(node_id)
    }
}

/// Resolver backed by an in-memory address table.
pub struct StaticResolver {
    addrs: RwLock<HashMap<NodeId, String>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self {
            addrs: RwLock::new(HashMap::new()),
        }
    }

    /// Register or update the address of a node.
    pub fn insert(&self, node_id: NodeId, addr: impl Into<String>) {
        let addr = addr.into();
        debug!(node_id, %addr, "registered node address");
        let mut addrs = self.addrs.write().expect("resolver lock");
        addrs.insert(node_id, addr);
    }

    pub fn remove(&self, node_id: NodeId) {
        let mut addrs = self.addrs.write().expect("resolver lock");
        addrs.remove(&node_id);
    }

    pub fn len(&self) -> usize {
        self.addrs.read().expect("resolver lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StaticResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<(NodeId, String)> for StaticResolver {
    fn from_iter<I: IntoIterator<Item = (NodeId, String)>>(iter: I) -> Self {
        Self {
            addrs: RwLock::new(iter.into_iter().collect()),
        }
    }
}

impl AddressResolver for StaticResolver {
    fn resolve(&self, node_id: NodeId) -> TransportResult<String> {
        let addrs = self.addrs.read().expect("resolver lock");
        addrs
            .get(&node_id)
            .cloned()
            .ok_or_else(|| TransportError::Resolution {
                node_id,
                reason: "no address registered".to_string(),
            })
    }
}
