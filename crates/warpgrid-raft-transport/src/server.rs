//! Inbound side: accepts `MultiRaft.RaftMessage` streams from peers and
//! routes each message to the handler of its destination store.
//!
//! Each peer stream is read by a supervised dispatch task. A message for
//! a store with no registered handler, or a handler error, ends that
//! peer's session with an error status; the peer reconnects on its next
//! send. When the node starts draining, open sessions are answered with
//! an empty response instead, which the peer sees as a clean close.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, warn};

use crate::error::{TransportError, TransportResult};
use crate::proto;
use crate::proto::multi_raft_server::{MultiRaft, MultiRaftServer};
use crate::transport::RaftTransport;
use crate::types::RaftMessageRequest;

impl RaftTransport {
    /// Serve one inbound peer stream until it ends, fails, or the node
    /// drains.
    pub async fn handle_inbound<S>(self: &Arc<Self>, stream: S) -> Result<(), Status>
    where
        S: Stream<Item = Result<proto::RaftMessageRequest, Status>> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let transport = Arc::clone(self);
        self.stopper().run_task("raft-inbound-dispatch", async move {
            let _ = done_tx.send(transport.dispatch(stream).await);
        })?;

        tokio::select! {
            result = done_rx => match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    warn!(error = %e, "inbound raft stream failed");
                    Err(e.into())
                }
                Err(_) => Err(Status::aborted("inbound raft dispatch ended unexpectedly")),
            },
            _ = self.stopper().should_drain() => {
                debug!("closing inbound raft stream for drain");
                Ok(())
            }
        }
    }

    async fn dispatch<S>(&self, stream: S) -> TransportResult<()>
    where
        S: Stream<Item = Result<proto::RaftMessageRequest, Status>> + Send,
    {
        tokio::pin!(stream);
        loop {
            let next = tokio::select! {
                biased;
                _ = self.stopper().should_drain() => return Ok(()),
                next = stream.next() => next,
            };

            // The peer closed its side, e.g. after idling out.
            let Some(item) = next else {
                return Ok(());
            };

            let wire = item.map_err(|status| TransportError::StreamRead(status.to_string()))?;
            let req = RaftMessageRequest::try_from(wire)?;
            let store_id = req.to_replica.store_id;

            let handler = self
                .handlers
                .get(store_id)
                .ok_or(TransportError::UnknownDestination(store_id))?;

            handler(req).map_err(|e| TransportError::Handler {
                store_id,
                reason: e.to_string(),
            })?;
        }
    }
}

/// gRPC implementation of the `MultiRaft` service.
pub struct RaftTransportServer {
    transport: Arc<RaftTransport>,
}

impl RaftTransportServer {
    pub fn new(transport: Arc<RaftTransport>) -> Self {
        Self { transport }
    }

    /// Get the tonic service for mounting on a gRPC server.
    pub fn into_service(self) -> MultiRaftServer<Self> {
        MultiRaftServer::new(self)
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let addr = listener.local_addr()?;
        info!(%addr, "raft transport server listening");

        tonic::transport::Server::builder()
            .add_service(self.into_service())
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await?;

        info!(%addr, "raft transport server stopped");
        Ok(())
    }
}

#[tonic::async_trait]
impl MultiRaft for RaftTransportServer {
    async fn raft_message(
        &self,
        request: Request<Streaming<proto::RaftMessageRequest>>,
    ) -> Result<Response<proto::RaftMessageResponse>, Status> {
        let remote = request.remote_addr();
        debug!(?remote, "inbound raft stream opened");

        self.transport.handle_inbound(request.into_inner()).await?;

        debug!(?remote, "inbound raft stream closed");
        Ok(Response::new(proto::RaftMessageResponse {}))
    }
}
