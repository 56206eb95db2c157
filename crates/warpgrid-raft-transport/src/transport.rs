//! `RaftTransport`: the entry point consensus code talks to.
//!
//! Outbound, callers obtain a `RaftSender` carrying their error handler
//! and hand it messages with `send_async`. Inbound, stores register a
//! handler with `listen` and the gRPC server routes each received
//! message to it.
//!
//! Callers are responsible for draining the snapshot status receiver
//! returned by `RaftTransport::new`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::handler::HandlerRegistry;
use crate::queue::{NewQueue, OutboundQueueTable, QueueKey};
use crate::resolver::AddressResolver;
use crate::stopper::Stopper;
use crate::stream::{GrpcConnector, RaftConnector};
use crate::types::{RaftMessageRequest, ReplicaDescriptor, StoreId, TrafficClass};
use crate::worker::DeliveryWorker;

/// Outcome of sending one snapshot message.
#[derive(Debug, Clone)]
pub struct SnapshotStatus {
    pub request: RaftMessageRequest,
    pub error: Option<TransportError>,
}

/// Invoked once for every delivery worker that ends with an error,
/// with the replica it was delivering to.
pub type ErrorHandler = Arc<dyn Fn(TransportError, ReplicaDescriptor) + Send + Sync>;

/// Raft message transport for one node.
pub struct RaftTransport {
    config: TransportConfig,
    resolver: Arc<dyn AddressResolver>,
    connector: Arc<dyn RaftConnector>,
    stopper: Stopper,
    pub(crate) handlers: HandlerRegistry,
    queues: OutboundQueueTable,
    snapshot_status: mpsc::Sender<SnapshotStatus>,
}

impl RaftTransport {
    /// Create a transport. The returned receiver yields one
    /// `SnapshotStatus` per snapshot message sent.
    pub fn new(
        config: TransportConfig,
        resolver: Arc<dyn AddressResolver>,
        connector: Arc<dyn RaftConnector>,
        stopper: Stopper,
    ) -> (Arc<Self>, mpsc::Receiver<SnapshotStatus>) {
        let (snapshot_status, statuses) = mpsc::channel(config.snapshot_status_buffer.max(1));
        let transport = Arc::new(Self {
            queues: OutboundQueueTable::new(config.send_buffer_size),
            config,
            resolver,
            connector,
            stopper,
            handlers: HandlerRegistry::new(),
            snapshot_status,
        });
        (transport, statuses)
    }

    /// Create a transport that dials peers over gRPC.
    pub fn grpc(
        config: TransportConfig,
        resolver: Arc<dyn AddressResolver>,
        stopper: Stopper,
    ) -> (Arc<Self>, mpsc::Receiver<SnapshotStatus>) {
        let connector = Arc::new(GrpcConnector::new(&config));
        Self::new(config, resolver, connector, stopper)
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn stopper(&self) -> &Stopper {
        &self.stopper
    }

    /// Register the handler for messages addressed to `store_id`.
    pub fn listen<F>(&self, store_id: StoreId, handler: F)
    where
        F: Fn(RaftMessageRequest) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers.listen(store_id, Arc::new(handler));
    }

    /// Unregister the handler for `store_id`.
    pub fn stop(&self, store_id: StoreId) {
        self.handlers.stop(store_id);
    }

    /// Build a sender that reports worker failures to `on_error`.
    pub fn make_sender<F>(self: &Arc<Self>, on_error: F) -> RaftSender
    where
        F: Fn(TransportError, ReplicaDescriptor) + Send + Sync + 'static,
    {
        RaftSender {
            transport: Arc::clone(self),
            on_error: Arc::new(on_error),
        }
    }

    /// Number of live outbound queues.
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    pub fn has_queue(&self, to_replica: ReplicaDescriptor, class: TrafficClass) -> bool {
        self.queues.contains(QueueKey::new(to_replica, class))
    }

    /// Messages waiting in the queue for a replica and class.
    pub fn queued(&self, to_replica: ReplicaDescriptor, class: TrafficClass) -> Option<usize> {
        self.queues.queued(QueueKey::new(to_replica, class))
    }
}

/// Handle used by consensus code to send messages.
#[derive(Clone)]
pub struct RaftSender {
    transport: Arc<RaftTransport>,
    on_error: ErrorHandler,
}

impl RaftSender {
    /// Queue a message for its destination replica.
    ///
    /// Never blocks. Returns `false` if the destination's queue is full
    /// or no worker could be started for it; `true` only means the
    /// message was queued, not that it will be delivered.
    pub fn send_async(&self, req: RaftMessageRequest) -> bool {
        let key = QueueKey::for_request(&req);
        let (tx, created) = self.transport.queues.get_or_create(key);
        if let Some(queue) = created {
            self.start_worker(key, queue);
        }

        match tx.try_send(req) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(
                    node_id = key.to_replica.node_id,
                    store_id = key.to_replica.store_id,
                    class = %key.class,
                    "raft send queue full, dropping message"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    fn start_worker(&self, key: QueueKey, queue: NewQueue) {
        let NewQueue {
            receiver,
            generation,
        } = queue;
        let transport = &self.transport;
        let worker = DeliveryWorker {
            key,
            queue: receiver,
            resolver: Arc::clone(&transport.resolver),
            connector: Arc::clone(&transport.connector),
            stopper: transport.stopper.clone(),
            snapshot_status: transport.snapshot_status.clone(),
            idle_timeout: transport.config.idle_timeout(),
        };

        let task_transport = Arc::clone(transport);
        let on_error = Arc::clone(&self.on_error);
        let spawned = transport.stopper.run_task("raft-delivery-worker", async move {
            let result = worker.run().await;
            // Unregister before reporting so a retry from the error
            // handler builds a fresh queue.
            task_transport.queues.remove(key, generation);

            let to = key.to_replica;
            match result {
                Ok(()) => {
                    debug!(node_id = to.node_id, store_id = to.store_id, class = %key.class, "raft delivery worker exited");
                }
                Err(e) => {
                    warn!(node_id = to.node_id, store_id = to.store_id, class = %key.class, error = %e, "raft delivery worker failed");
                    on_error(e, to);
                }
            }
        });

        if let Err(e) = spawned {
            transport.queues.remove(key, generation);
            warn!(
                node_id = key.to_replica.node_id,
                store_id = key.to_replica.store_id,
                error = %e,
                "failed to start raft delivery worker"
            );
            (self.on_error)(e, key.to_replica);
        }
    }
}
