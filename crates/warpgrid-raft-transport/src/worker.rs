//! Delivery worker: drains one outbound queue into one peer stream.
//!
//! A worker owns exactly one stream to one replica for one traffic
//! class. It never retries: the first resolution, connection, or write
//! failure ends it, and everything still queued is dropped with it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{TransportError, TransportResult};
use crate::queue::QueueKey;
use crate::resolver::AddressResolver;
use crate::stopper::Stopper;
use crate::stream::{RaftConnector, StreamSink};
use crate::transport::SnapshotStatus;
use crate::types::RaftMessageRequest;

pub(crate) struct DeliveryWorker {
    pub(crate) key: QueueKey,
    pub(crate) queue: mpsc::Receiver<RaftMessageRequest>,
    pub(crate) resolver: Arc<dyn AddressResolver>,
    pub(crate) connector: Arc<dyn RaftConnector>,
    pub(crate) stopper: Stopper,
    pub(crate) snapshot_status: mpsc::Sender<SnapshotStatus>,
    pub(crate) idle_timeout: Duration,
}

impl DeliveryWorker {
    /// Run until idle, stopped, or failed. `Ok` means a clean exit that
    /// must not be reported to the sender's error handler.
    pub(crate) async fn run(mut self) -> TransportResult<()> {
        let to = self.key.to_replica;
        let addr = self.resolver.resolve(to.node_id)?;

        let stream = tokio::select! {
            biased;
            _ = self.stopper.should_stop() => return Ok(()),
            stream = self.connector.open_stream(&addr) => stream?,
        };
        let (sink, closed) = stream.split();

        // Watch for the peer hanging up while the main loop waits on the
        // queue.
        let (closed_tx, mut closed_rx) = oneshot::channel();
        let watcher_stopper = self.stopper.clone();
        self.stopper.run_task("raft-stream-watcher", async move {
            tokio::select! {
                _ = watcher_stopper.should_stop() => {}
                reason = closed => {
                    let _ = closed_tx.send(reason);
                }
            }
        })?;

        debug!(
            node_id = to.node_id,
            store_id = to.store_id,
            class = %self.key.class,
            %addr,
            "raft delivery worker started"
        );

        loop {
            let req = tokio::select! {
                biased;
                _ = self.stopper.should_stop() => return Ok(()),
                reason = &mut closed_rx => {
                    return Err(reason.unwrap_or(TransportError::PeerClosed));
                }
                _ = tokio::time::sleep(self.idle_timeout) => {
                    debug!(
                        node_id = to.node_id,
                        store_id = to.store_id,
                        class = %self.key.class,
                        "raft delivery worker idle"
                    );
                    return Ok(());
                }
                req = self.queue.recv() => match req {
                    Some(req) => req,
                    None => return Ok(()),
                },
            };

            self.deliver(&sink, req).await?;
        }
    }

    /// Write one message, publishing a snapshot status for snapshots.
    async fn deliver(&self, sink: &StreamSink, req: RaftMessageRequest) -> TransportResult<()> {
        let snapshot = req.is_snapshot().then(|| req.clone());

        let result = tokio::select! {
            biased;
            _ = self.stopper.should_stop() => return Ok(()),
            result = sink.send(req) => result,
        };

        if let Some(request) = snapshot {
            let status = SnapshotStatus {
                request,
                error: result.as_ref().err().cloned(),
            };
            tokio::select! {
                biased;
                _ = self.stopper.should_stop() => return Ok(()),
                sent = self.snapshot_status.send(status) => {
                    if sent.is_err() {
                        debug!("snapshot status receiver dropped");
                    }
                }
            }
        }

        result
    }
}
