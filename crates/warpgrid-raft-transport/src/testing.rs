//! In-memory peers for exercising workers and the transport without a
//! network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc, oneshot};

use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::resolver::StaticResolver;
use crate::stopper::Stopper;
use crate::stream::{OutboundStream, RaftConnector};
use crate::transport::{RaftTransport, SnapshotStatus};
use crate::types::{MessageType, RaftMessageRequest, ReplicaDescriptor};

/// The receiving end of one mock stream.
pub(crate) struct MockPeer {
    pub(crate) messages: mpsc::Receiver<RaftMessageRequest>,
    hang_up: oneshot::Sender<TransportError>,
}

impl MockPeer {
    /// End the stream from the peer's side with the given reason.
    pub(crate) fn hang_up(self, reason: TransportError) {
        let _ = self.hang_up.send(reason);
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        mpsc::Receiver<RaftMessageRequest>,
        oneshot::Sender<TransportError>,
    ) {
        (self.messages, self.hang_up)
    }
}

/// Connector handing every opened stream to the test as a `MockPeer`.
pub(crate) struct MockConnector {
    opened: AtomicUsize,
    gate: Option<Semaphore>,
    stream_buffer: usize,
    peers: mpsc::UnboundedSender<MockPeer>,
}

impl MockConnector {
    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Let gated `open_stream` calls proceed.
    pub(crate) fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }
}

#[tonic::async_trait]
impl RaftConnector for MockConnector {
    async fn open_stream(&self, addr: &str) -> TransportResult<OutboundStream> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.map_err(|_| TransportError::Connection {
                addr: addr.to_string(),
                reason: "gate closed".to_string(),
            })?;
        }

        let (tx, messages) = mpsc::channel(self.stream_buffer);
        let (hang_up, hung_up) = oneshot::channel();
        let _ = self.peers.send(MockPeer { messages, hang_up });

        Ok(OutboundStream::new(tx, async move {
            hung_up.await.unwrap_or(TransportError::PeerClosed)
        }))
    }
}

/// A transport wired to a `MockConnector`, resolving nodes 1 to 3.
pub(crate) struct MockHarness {
    pub(crate) transport: Arc<RaftTransport>,
    pub(crate) statuses: mpsc::Receiver<SnapshotStatus>,
    pub(crate) connector: Arc<MockConnector>,
    pub(crate) stopper: Stopper,
    peers: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockPeer>>,
}

impl MockHarness {
    pub(crate) fn new(config: TransportConfig) -> Self {
        Self::build(config, None)
    }

    /// Like `new`, but streams only open after `open_gate`.
    pub(crate) fn gated(config: TransportConfig) -> Self {
        Self::build(config, Some(Semaphore::new(0)))
    }

    fn build(config: TransportConfig, gate: Option<Semaphore>) -> Self {
        let (peers_tx, peers) = mpsc::unbounded_channel();
        let connector = Arc::new(MockConnector {
            opened: AtomicUsize::new(0),
            gate,
            stream_buffer: 128,
            peers: peers_tx,
        });
        let resolver: StaticResolver = (1..=3)
            .map(|node_id| (node_id, format!("mock-{node_id}:7000")))
            .collect();
        let stopper = Stopper::new();
        let (transport, statuses) = RaftTransport::new(
            config,
            Arc::new(resolver),
            Arc::clone(&connector) as Arc<dyn RaftConnector>,
            stopper.clone(),
        );
        Self {
            transport,
            statuses,
            connector,
            stopper,
            peers: tokio::sync::Mutex::new(peers),
        }
    }

    /// Next stream opened by a worker.
    pub(crate) async fn accept(&self) -> MockPeer {
        let mut peers = self.peers.lock().await;
        tokio::time::timeout(Duration::from_secs(5), peers.recv())
            .await
            .expect("timed out waiting for a stream")
            .expect("connector dropped")
    }
}

pub(crate) type ErrorRecord = (TransportError, ReplicaDescriptor);

/// Error handler that records every report.
pub(crate) fn error_log() -> (
    impl Fn(TransportError, ReplicaDescriptor) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<ErrorRecord>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |err: TransportError, to: ReplicaDescriptor| {
        let _ = tx.send((err, to));
    };
    (handler, rx)
}

pub(crate) fn heartbeat(to: ReplicaDescriptor, payload: Vec<u8>) -> RaftMessageRequest {
    RaftMessageRequest::new(
        1,
        ReplicaDescriptor::new(1, 10, 100),
        to,
        MessageType::Heartbeat,
        payload,
    )
}

pub(crate) fn snapshot(to: ReplicaDescriptor, payload: Vec<u8>) -> RaftMessageRequest {
    RaftMessageRequest::new(
        1,
        ReplicaDescriptor::new(1, 10, 100),
        to,
        MessageType::Snapshot,
        payload,
    )
}

/// Receive with a deadline; `None` means the stream ended.
pub(crate) async fn recv_within(
    rx: &mut mpsc::Receiver<RaftMessageRequest>,
    wait: Duration,
) -> Option<RaftMessageRequest> {
    tokio::time::timeout(wait, rx.recv())
        .await
        .expect("timed out waiting for a message")
}

/// Poll `cond` until it holds, failing after a few seconds.
pub(crate) async fn eventually(cond: impl Fn() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
