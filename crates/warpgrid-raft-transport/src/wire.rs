//! Conversions between the domain types and the `MultiRaft` protobuf schema.

use crate::error::TransportError;
use crate::proto;
use crate::types::{MessageType, RaftMessageRequest, ReplicaDescriptor};

impl From<ReplicaDescriptor> for proto::ReplicaDescriptor {
    fn from(r: ReplicaDescriptor) -> Self {
        proto::ReplicaDescriptor {
            node_id: r.node_id,
            store_id: r.store_id,
            replica_id: r.replica_id,
        }
    }
}

impl From<proto::ReplicaDescriptor> for ReplicaDescriptor {
    fn from(r: proto::ReplicaDescriptor) -> Self {
        ReplicaDescriptor::new(r.node_id, r.store_id, r.replica_id)
    }
}

impl From<MessageType> for proto::MessageType {
    fn from(t: MessageType) -> Self {
        match t {
            MessageType::Append => proto::MessageType::Append,
            MessageType::AppendResponse => proto::MessageType::AppendResponse,
            MessageType::Vote => proto::MessageType::Vote,
            MessageType::VoteResponse => proto::MessageType::VoteResponse,
            MessageType::Heartbeat => proto::MessageType::Heartbeat,
            MessageType::HeartbeatResponse => proto::MessageType::HeartbeatResponse,
            MessageType::Snapshot => proto::MessageType::Snapshot,
            MessageType::TimeoutNow => proto::MessageType::TimeoutNow,
        }
    }
}

impl TryFrom<i32> for MessageType {
    type Error = TransportError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        let t = proto::MessageType::try_from(value)
            .map_err(|_| TransportError::InvalidMessage(format!("unknown message type {value}")))?;
        Ok(match t {
            proto::MessageType::Unspecified => {
                return Err(TransportError::InvalidMessage(
                    "message type not set".to_string(),
                ));
            }
            proto::MessageType::Append => MessageType::Append,
            proto::MessageType::AppendResponse => MessageType::AppendResponse,
            proto::MessageType::Vote => MessageType::Vote,
            proto::MessageType::VoteResponse => MessageType::VoteResponse,
            proto::MessageType::Heartbeat => MessageType::Heartbeat,
            proto::MessageType::HeartbeatResponse => MessageType::HeartbeatResponse,
            proto::MessageType::Snapshot => MessageType::Snapshot,
            proto::MessageType::TimeoutNow => MessageType::TimeoutNow,
        })
    }
}

impl From<RaftMessageRequest> for proto::RaftMessageRequest {
    fn from(req: RaftMessageRequest) -> Self {
        proto::RaftMessageRequest {
            range_id: req.range_id,
            from_replica: Some(req.from_replica.into()),
            to_replica: Some(req.to_replica.into()),
            message_type: proto::MessageType::from(req.message_type) as i32,
            payload: req.payload.to_vec(),
        }
    }
}

impl TryFrom<proto::RaftMessageRequest> for RaftMessageRequest {
    type Error = TransportError;

    fn try_from(req: proto::RaftMessageRequest) -> Result<Self, Self::Error> {
        let from_replica = req
            .from_replica
            .ok_or_else(|| TransportError::InvalidMessage("missing from_replica".to_string()))?;
        let to_replica = req
            .to_replica
            .ok_or_else(|| TransportError::InvalidMessage("missing to_replica".to_string()))?;

        Ok(RaftMessageRequest {
            range_id: req.range_id,
            from_replica: from_replica.into(),
            to_replica: to_replica.into(),
            message_type: MessageType::try_from(req.message_type)?,
            payload: req.payload.into(),
        })
    }
}
