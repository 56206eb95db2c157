//! Error types for the Raft transport.

use thiserror::Error;
use tonic::{Code, Status};

use crate::types::{NodeId, StoreId};

/// Result type alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors that end an outbound worker or an inbound session.
///
/// A full outbound queue is not an error: `RaftSender::send_async`
/// reports it by returning `false`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to resolve address of node {node_id}: {reason}")]
    Resolution { node_id: NodeId, reason: String },

    #[error("failed to connect to {addr}: {reason}")]
    Connection { addr: String, reason: String },

    #[error("stream write failed: {0}")]
    StreamWrite(String),

    #[error("stream read failed: {0}")]
    StreamRead(String),

    #[error("peer closed the stream")]
    PeerClosed,

    #[error("unable to proxy message to unknown store {0}")]
    UnknownDestination(StoreId),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("handler for store {store_id} failed: {reason}")]
    Handler { store_id: StoreId, reason: String },

    #[error("node is shutting down")]
    ShuttingDown,

    #[error("no tokio runtime available to run {0}")]
    NoRuntime(&'static str),
}

impl TransportError {
    /// Error reported by the client when the server ends the stream
    /// with a non-OK status.
    pub fn from_status(status: &Status) -> Self {
        TransportError::StreamRead(format!(
            "{:?}: {}",
            status.code(),
            status.message()
        ))
    }
}

impl From<TransportError> for Status {
    fn from(err: TransportError) -> Self {
        let code = match &err {
            TransportError::UnknownDestination(_) => Code::NotFound,
            TransportError::InvalidMessage(_) => Code::InvalidArgument,
            TransportError::ShuttingDown => Code::Unavailable,
            _ => Code::Internal,
        };
        Status::new(code, err.to_string())
    }
}
