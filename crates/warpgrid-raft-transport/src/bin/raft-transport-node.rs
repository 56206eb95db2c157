//! raft-transport-node: run a Raft transport endpoint from the shell.
//!
//! Stands up the transport without a consensus engine: `serve` registers
//! logging handlers for local stores, `ping` pushes heartbeats at a
//! remote store and reports what the transport says about them.
//!
//! # Usage
//!
//! ```text
//! raft-transport-node serve --node-id 2 --listen 127.0.0.1:7002 --store 20 --peer 1=127.0.0.1:7001
//! raft-transport-node ping --node-id 1 --peer 2=127.0.0.1:7002 --to-node 2 --to-store 20
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

use warpgrid_raft_transport::{
    MessageType, NodeId, RaftMessageRequest, RaftTransport, RaftTransportServer,
    ReplicaDescriptor, StaticResolver, Stopper, StoreId, TrafficClass, TransportConfig,
    TransportError,
};

/// Upper bound on waiting for queued heartbeats after the last send.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "raft-transport-node", about = "WarpGrid Raft transport node")]
struct Cli {
    /// Transport config file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Accept inbound Raft streams and log every message received.
    Serve {
        /// This node's ID.
        #[arg(long)]
        node_id: NodeId,

        /// Address to listen on.
        #[arg(long, default_value = "127.0.0.1:7000")]
        listen: SocketAddr,

        /// Local store IDs to register handlers for.
        #[arg(long = "store", required = true)]
        stores: Vec<StoreId>,

        /// Peer addresses, as `node_id=host:port`.
        #[arg(long = "peer", value_parser = parse_peer)]
        peers: Vec<(NodeId, String)>,
    },
    /// Send heartbeats to a store on a remote node.
    Ping {
        /// This node's ID.
        #[arg(long)]
        node_id: NodeId,

        /// Peer addresses, as `node_id=host:port`.
        #[arg(long = "peer", value_parser = parse_peer)]
        peers: Vec<(NodeId, String)>,

        #[arg(long)]
        to_node: NodeId,

        #[arg(long)]
        to_store: StoreId,

        /// Number of heartbeats to send.
        #[arg(long, default_value = "10")]
        count: u64,

        /// Delay between heartbeats in milliseconds.
        #[arg(long, default_value = "100")]
        interval_ms: u64,
    },
}

/// Heartbeat payload used by `ping`.
#[derive(Debug, Serialize, Deserialize)]
struct Ping {
    seq: u64,
    from_node: NodeId,
}

fn parse_peer(s: &str) -> Result<(NodeId, String), String> {
    let (id, addr) = s
        .split_once('=')
        .ok_or_else(|| format!("expected node_id=host:port, got {s}"))?;
    let id = id
        .parse::<NodeId>()
        .map_err(|e| format!("invalid node id {id}: {e}"))?;
    Ok((id, addr.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,warpgrid_raft_transport=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => TransportConfig::from_file(path)?,
        None => TransportConfig::default(),
    };

    match cli.command {
        Command::Serve {
            node_id,
            listen,
            stores,
            peers,
        } => run_serve(config, node_id, listen, stores, peers).await,
        Command::Ping {
            node_id,
            peers,
            to_node,
            to_store,
            count,
            interval_ms,
        } => {
            let target = ReplicaDescriptor::new(to_node, to_store, 0);
            run_ping(config, node_id, peers, target, count, interval_ms).await
        }
    }
}

async fn run_serve(
    config: TransportConfig,
    node_id: NodeId,
    listen: SocketAddr,
    stores: Vec<StoreId>,
    peers: Vec<(NodeId, String)>,
) -> anyhow::Result<()> {
    let stopper = Stopper::new();
    let resolver: StaticResolver = peers.into_iter().collect();
    info!(node_id, peers = resolver.len(), "loaded peer map");
    let (transport, mut statuses) = RaftTransport::grpc(config, Arc::new(resolver), stopper.clone());

    for store_id in stores {
        transport.listen(store_id, move |req: RaftMessageRequest| {
            let ping = serde_json::from_slice::<Ping>(&req.payload).ok();
            info!(
                store_id,
                from_node = req.from_replica.node_id,
                message_type = ?req.message_type,
                seq = ping.map(|p| p.seq),
                "received raft message"
            );
            Ok(())
        });
    }

    // This node only receives, but statuses must still be drained.
    tokio::spawn(async move { while statuses.recv().await.is_some() {} });

    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(node_id, addr = %listen, "raft transport node starting");

    let drain = stopper.clone();
    let server = RaftTransportServer::new(Arc::clone(&transport));
    let server_handle = tokio::spawn(server.serve(listener, async move {
        drain.should_drain().await;
    }));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    stopper.stop().await;
    server_handle.await??;

    info!(node_id, "raft transport node stopped");
    Ok(())
}

async fn run_ping(
    config: TransportConfig,
    node_id: NodeId,
    peers: Vec<(NodeId, String)>,
    target: ReplicaDescriptor,
    count: u64,
    interval_ms: u64,
) -> anyhow::Result<()> {
    let stopper = Stopper::new();
    let resolver: StaticResolver = peers.into_iter().collect();
    let (transport, _statuses) = RaftTransport::grpc(config, Arc::new(resolver), stopper.clone());

    let (err_tx, mut err_rx) = mpsc::unbounded_channel();
    let sender = transport.make_sender(move |err, to| {
        let _ = err_tx.send((err, to));
    });

    let from = ReplicaDescriptor::new(node_id, 0, 0);
    let mut dropped = 0u64;
    for seq in 0..count {
        let payload = serde_json::to_vec(&Ping {
            seq,
            from_node: node_id,
        })?;
        let req = RaftMessageRequest::new(0, from, target, MessageType::Heartbeat, payload);
        if !sender.send_async(req) {
            dropped += 1;
        }

        report_errors(&mut err_rx);
        tokio::time::sleep(Duration::from_millis(interval_ms)).await;
    }

    if !wait_for_flush(&transport, target, FLUSH_TIMEOUT).await {
        warn!("heartbeats still queued at shutdown");
    }
    tokio::time::sleep(Duration::from_millis(interval_ms)).await;
    report_errors(&mut err_rx);

    info!(queued = count - dropped, dropped, "ping finished");
    stopper.stop().await;
    Ok(())
}

/// Wait until nothing is queued for `target`, or `timeout` passes.
/// Returns whether the queue emptied.
async fn wait_for_flush(
    transport: &RaftTransport,
    target: ReplicaDescriptor,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !transport
            .queued(target, TrafficClass::Normal)
            .is_some_and(|n| n > 0)
        {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn report_errors(err_rx: &mut mpsc::UnboundedReceiver<(TransportError, ReplicaDescriptor)>) {
    while let Ok((err, to)) = err_rx.try_recv() {
        warn!(to_node = to.node_id, to_store = to.store_id, error = %err, "destination unreachable");
    }
}
