//! tests/common/harness.rs
//!
//! Building blocks for integration tests: spawning real nodes over loopback
//! UDP, and a "raw peer" that speaks the wire protocol directly so tests can
//! observe exactly what a node puts on the wire without running a second
//! full engine.

use anyhow::{Context, Result};
use gossip_network::codec::{self, Message};
use gossip_network::engine::{EngineCommand, EngineEvent};
use gossip_network::{App, Config};
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A handle to a real node spawned in the background of a test process.
pub struct TestNode {
    pub node_id: String,
    pub addr: SocketAddr,
    pub command_tx: mpsc::Sender<EngineCommand>,
    pub event_rx: mpsc::UnboundedReceiver<EngineEvent>,
    pub shutdown_token: CancellationToken,
}

impl TestNode {
    /// Spawns a node with short, test-friendly timing so the scenarios in
    /// this suite run in well under a second.
    pub async fn spawn(node_id: &str, peers: Vec<SocketAddr>) -> Result<Self> {
        let bind_addr = ephemeral_addr()?;
        let config = Config {
            node_id: Some(node_id.to_string()),
            bind_addr,
            peers,
            ack_timeout_ms: 150,
            ack_check_interval_ms: 40,
            max_retries: 3,
            anti_entropy_interval_ms: 150,
            peer_health_check_interval_ms: 200,
            peer_timeout_ms: 350,
            status_server: None,
        };

        let app = App::new(config).context("failed to create app")?;
        let shutdown_token = app.shutdown_token();
        let handle = app.run().await.context("failed to start node")?;

        Ok(Self {
            node_id: node_id.to_string(),
            addr: handle.bind_addr,
            command_tx: handle.command_tx,
            event_rx: handle.event_rx,
            shutdown_token,
        })
    }

    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
    }

    pub async fn add_peer(&self, peer_id: &str, addr: SocketAddr) -> Result<()> {
        self.command_tx
            .send(EngineCommand::AddPeer {
                peer_id: peer_id.to_string(),
                host: addr.ip(),
                port: addr.port(),
            })
            .await
            .context("engine command channel closed")
    }

    pub async fn send(&self, message: Message) -> Result<()> {
        self.command_tx
            .send(EngineCommand::Send(message))
            .await
            .context("engine command channel closed")
    }

    /// Waits up to `timeout` for an event matching `predicate`, discarding
    /// non-matching events observed along the way.
    pub async fn wait_for_event<F>(&mut self, timeout: Duration, mut predicate: F) -> Result<EngineEvent>
    where
        F: FnMut(&EngineEvent) -> bool,
    {
        tokio::time::timeout(timeout, async {
            loop {
                let event = self.event_rx.recv().await.context("event channel closed")?;
                if predicate(&event) {
                    return Ok(event);
                }
            }
        })
        .await
        .context("timed out waiting for event")?
    }

    /// Asserts no further event arrives within `timeout`.
    pub async fn assert_no_event(&mut self, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.event_rx.recv()).await {
            Ok(Some(event)) => anyhow::bail!("expected silence, got {event:?}"),
            Ok(None) => Ok(()),
            Err(_) => Ok(()),
        }
    }
}

/// A bare UDP peer that speaks the wire codec directly, standing in for a
/// second node whose exact on-the-wire behaviour a test wants to script or
/// observe (e.g. "never sends an ack").
pub struct RawPeer {
    socket: UdpSocket,
}

impl RawPeer {
    pub async fn bind() -> Result<Self> {
        let addr = ephemeral_addr()?;
        let socket = UdpSocket::bind(addr).await.context("failed to bind raw peer socket")?;
        Ok(Self { socket })
    }

    pub fn addr(&self) -> SocketAddr {
        self.socket.local_addr().expect("bound socket has a local address")
    }

    pub async fn send(&self, message: &Message, to: SocketAddr) -> Result<()> {
        let bytes = codec::encode(message);
        self.socket.send_to(&bytes, to).await.context("raw peer send failed")?;
        Ok(())
    }

    /// Waits up to `timeout` for the next datagram, decoded as a `Message`.
    pub async fn recv(&self, timeout: Duration) -> Result<(Message, SocketAddr)> {
        let mut buf = vec![0u8; 64 * 1024];
        let (len, from) = tokio::time::timeout(timeout, self.socket.recv_from(&mut buf))
            .await
            .context("timed out waiting for datagram")?
            .context("raw peer recv failed")?;
        Ok((codec::decode(&buf[..len]), from))
    }
}

fn ephemeral_addr() -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?)
}
