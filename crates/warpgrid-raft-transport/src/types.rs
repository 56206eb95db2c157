//! Core data types carried by the transport.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub type NodeId = u64;
pub type StoreId = u64;
pub type ReplicaId = u64;
pub type RangeId = u64;

/// One replica of a range: the store hosting it and that store's node.
///
/// Used as the routing key for outbound queues, so equality and hashing
/// are exact over all three fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicaDescriptor {
    pub node_id: NodeId,
    pub store_id: StoreId,
    pub replica_id: ReplicaId,
}

impl ReplicaDescriptor {
    pub fn new(node_id: NodeId, store_id: StoreId, replica_id: ReplicaId) -> Self {
        Self {
            node_id,
            store_id,
            replica_id,
        }
    }
}

/// Kind of consensus message being carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Append,
    AppendResponse,
    Vote,
    VoteResponse,
    Heartbeat,
    HeartbeatResponse,
    Snapshot,
    TimeoutNow,
}

/// Outbound traffic partition.
///
/// Snapshots travel on their own queue and stream so that a large state
/// transfer never sits in front of heartbeats and appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficClass {
    Normal,
    Snapshot,
}

impl std::fmt::Display for TrafficClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrafficClass::Normal => f.write_str("normal"),
            TrafficClass::Snapshot => f.write_str("snapshot"),
        }
    }
}

/// A consensus message addressed to one replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaftMessageRequest {
    pub range_id: RangeId,
    pub from_replica: ReplicaDescriptor,
    pub to_replica: ReplicaDescriptor,
    pub message_type: MessageType,
    pub payload: Bytes,
}

impl RaftMessageRequest {
    pub fn new(
        range_id: RangeId,
        from_replica: ReplicaDescriptor,
        to_replica: ReplicaDescriptor,
        message_type: MessageType,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            range_id,
            from_replica,
            to_replica,
            message_type,
            payload: payload.into(),
        }
    }

    pub fn is_snapshot(&self) -> bool {
        self.message_type == MessageType::Snapshot
    }

    /// Queue this message travels on.
    pub fn traffic_class(&self) -> TrafficClass {
        if self.is_snapshot() {
            TrafficClass::Snapshot
        } else {
            TrafficClass::Normal
        }
    }
}
