//! Outbound message streams.
//!
//! A delivery worker sees its peer as an `OutboundStream`: a sink it
//! writes messages into, plus a future that resolves when the peer ends
//! the stream. `RaftConnector` opens such streams; `GrpcConnector` does
//! so over the `MultiRaft.RaftMessage` client-streaming RPC.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tonic::transport::Endpoint;
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::proto;
use crate::proto::multi_raft_client::MultiRaftClient;
use crate::types::RaftMessageRequest;

/// Future resolving with the reason the peer ended a stream.
pub type ClosedFuture = Pin<Box<dyn Future<Output = TransportError> + Send>>;

/// An open stream of consensus messages to one peer.
pub struct OutboundStream {
    sink: StreamSink,
    closed: ClosedFuture,
}

impl OutboundStream {
    /// Build a stream from a message sink and a future that resolves
    /// once the receiving side hangs up.
    pub fn new<F>(sink: mpsc::Sender<RaftMessageRequest>, closed: F) -> Self
    where
        F: Future<Output = TransportError> + Send + 'static,
    {
        Self {
            sink: StreamSink { tx: sink },
            closed: Box::pin(closed),
        }
    }

    /// Separate the write half from the hang-up notification.
    pub fn split(self) -> (StreamSink, ClosedFuture) {
        (self.sink, self.closed)
    }
}

/// Write half of an `OutboundStream`.
pub struct StreamSink {
    tx: mpsc::Sender<RaftMessageRequest>,
}

impl StreamSink {
    /// Write one message. Waits while the stream buffer is full.
    pub async fn send(&self, req: RaftMessageRequest) -> TransportResult<()> {
        self.tx
            .send(req)
            .await
            .map_err(|_| TransportError::StreamWrite("peer stream is gone".to_string()))
    }
}

/// Opens outbound streams to peer transports.
#[tonic::async_trait]
pub trait RaftConnector: Send + Sync + 'static {
    async fn open_stream(&self, addr: &str) -> TransportResult<OutboundStream>;
}

/// Connector that dials peers over gRPC.
pub struct GrpcConnector {
    connect_timeout: Duration,
    stream_buffer_size: usize,
}

impl GrpcConnector {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            stream_buffer_size: config.stream_buffer_size.max(1),
        }
    }
}

#[tonic::async_trait]
impl RaftConnector for GrpcConnector {
    async fn open_stream(&self, addr: &str) -> TransportResult<OutboundStream> {
        let endpoint = format!("http://{addr}");
        let ep = Endpoint::from_shared(endpoint.clone())
            .map_err(|e| TransportError::Connection {
                addr: addr.to_string(),
                reason: format!("invalid endpoint {endpoint}: {e}"),
            })?
            .connect_timeout(self.connect_timeout);

        let channel = ep.connect().await.map_err(|e| {
            warn!(%addr, error = %e, "failed to connect to raft peer");
            TransportError::Connection {
                addr: addr.to_string(),
                reason: e.to_string(),
            }
        })?;
        debug!(%addr, "connected to raft peer");

        let mut client = MultiRaftClient::new(channel);
        let (tx, rx) = mpsc::channel(self.stream_buffer_size);
        let body = ReceiverStream::new(rx).map(proto::RaftMessageRequest::from);

        // The server only answers when it ends the session, so the
        // response doubles as the hang-up signal.
        let closed = async move {
            match client.raft_message(body).await {
                Ok(_) => TransportError::PeerClosed,
                Err(status) => TransportError::from_status(&status),
            }
        };

        Ok(OutboundStream::new(tx, closed))
    }
}
