//! WarpGrid Raft transport: moves consensus messages between stores.
//!
//! The transport is asynchronous with respect to the caller. Outbound
//! messages are queued per destination replica and traffic class, and a
//! single delivery worker drains each queue into one long-lived gRPC
//! stream. Workers are created lazily on the first send and torn down on
//! idle timeout, stream failure, or shutdown; whatever is still queued at
//! that point is dropped and the next send builds a fresh path.
//!
//! # Architecture
//!
//! ```text
//! RaftSender::send_async
//!   └── OutboundQueueTable ── (replica, class) → bounded queue
//!         └── DeliveryWorker ── resolve → connect → drain into stream
//!                                   │
//!                           MultiRaft.RaftMessage (client stream)
//!                                   │
//! RaftTransportServer ── InboundDispatcher ── HandlerRegistry → handler
//! ```
//!
//! - **`types`**: Replica descriptors, message types, traffic classes
//! - **`wire`**: Protobuf conversions for the `MultiRaft` service
//! - **`stopper`**: Supervised background tasks and shutdown phases
//! - **`resolver`**: Node ID → network address lookup
//! - **`stream`**: Outbound stream abstraction and the gRPC connector
//! - **`queue`** / **`worker`**: Outbound queues and their workers
//! - **`handler`** / **`server`**: Inbound routing to registered stores
//! - **`transport`**: `RaftTransport` and `RaftSender`

pub mod config;
pub mod error;
pub mod handler;
pub mod queue;
pub mod resolver;
pub mod server;
pub mod stopper;
pub mod stream;
pub mod transport;
pub mod types;
pub mod wire;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

/// Generated protobuf types and gRPC service stubs.
pub mod proto {
    tonic::include_proto!("warpgrid.raft.transport");
}

pub use config::TransportConfig;
pub use error::{TransportError, TransportResult};
pub use handler::{HandlerRegistry, RaftMessageHandler};
pub use resolver::{AddressResolver, StaticResolver};
pub use server::RaftTransportServer;
pub use stopper::Stopper;
pub use stream::{GrpcConnector, OutboundStream, RaftConnector};
pub use transport::{ErrorHandler, RaftSender, RaftTransport, SnapshotStatus};
pub use types::{
    MessageType, NodeId, RangeId, RaftMessageRequest, ReplicaDescriptor, ReplicaId, StoreId,
    TrafficClass,
};
