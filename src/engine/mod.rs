//! src/engine/mod.rs
//!
//! Defines the `Engine`: the scheduler and state machine that
//! binds the codec, history store, vector clock, and peer registry together.
//! It owns sequencing, unicast retry, broadcast fan-out, anti-entropy
//! rounds, the peer-health sweep, and inbound dispatch. A single `Engine`
//! value is the sole mutator of all five tables it owns.

use crate::clock::VectorClock;
use crate::codec::{self, Kind, Message};
use crate::config::Config;
use crate::peers::{PeerEvent, PeerRegistry};
use crate::store::HistoryStore;
use crate::transport::{InboundDatagram, TransportCommand};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time;
use tokio_util::sync::CancellationToken;

pub mod protocol;

/// Commands accepted from the application layer: `send`, `add_peer`,
/// `discover`.
#[derive(Debug)]
pub enum EngineCommand {
    Send(Message),
    AddPeer { peer_id: String, host: IpAddr, port: u16 },
    Discover { ports: Vec<u16>, host: IpAddr },
}

/// Events surfaced to the application layer.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    MessageReceived(Message),
    PeerDiscovered { peer_id: String, host: IpAddr, port: u16 },
    PeerStatusChanged { peer_id: String, active: bool },
}

/// Read-only snapshot published for the optional status server.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EngineStatus {
    pub node_id: String,
    pub active_peers: Vec<String>,
    pub history_len: usize,
    pub vector_clock: HashMap<String, u64>,
}

struct PendingAck {
    message: Message,
    target_peer_id: String,
    sent_time: Instant,
    retry_count: u32,
}

/// Intervals and retry limits the engine runs with.
#[derive(Debug, Clone)]
pub struct EngineTiming {
    pub ack_timeout: Duration,
    pub ack_check_interval: Duration,
    pub max_retries: u32,
    pub anti_entropy_interval: Duration,
    pub peer_health_check_interval: Duration,
    pub peer_timeout: Duration,
}

impl From<&Config> for EngineTiming {
    fn from(config: &Config) -> Self {
        Self {
            ack_timeout: Duration::from_millis(config.ack_timeout_ms),
            ack_check_interval: Duration::from_millis(config.ack_check_interval_ms),
            max_retries: config.max_retries,
            anti_entropy_interval: Duration::from_millis(config.anti_entropy_interval_ms),
            peer_health_check_interval: Duration::from_millis(config.peer_health_check_interval_ms),
            peer_timeout: Duration::from_millis(config.peer_timeout_ms),
        }
    }
}

pub struct Engine {
    node_id: String,
    bind_port: u16,
    timing: EngineTiming,

    history: HistoryStore,
    clock: VectorClock,
    peers: PeerRegistry,
    // Keyed by (message_id, target_peer_id): a single message_id can
    // legitimately be in flight to more than one peer when anti-entropy
    // re-sends it, and the two attempts must not collide.
    pending_acks: HashMap<(String, String), PendingAck>,
    next_sequence: HashMap<String, u64>,

    command_rx: mpsc::Receiver<EngineCommand>,
    inbound_rx: mpsc::Receiver<InboundDatagram>,
    transport_tx: mpsc::Sender<TransportCommand>,
    event_tx: mpsc::UnboundedSender<EngineEvent>,
    status_tx: Option<watch::Sender<EngineStatus>>,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_id: String,
        bind_port: u16,
        config: &Config,
        command_rx: mpsc::Receiver<EngineCommand>,
        inbound_rx: mpsc::Receiver<InboundDatagram>,
        transport_tx: mpsc::Sender<TransportCommand>,
        event_tx: mpsc::UnboundedSender<EngineEvent>,
        status_tx: Option<watch::Sender<EngineStatus>>,
    ) -> Self {
        Self {
            node_id,
            bind_port,
            timing: EngineTiming::from(config),
            history: HistoryStore::new(),
            clock: VectorClock::new(),
            peers: PeerRegistry::new(),
            pending_acks: HashMap::new(),
            next_sequence: HashMap::new(),
            command_rx,
            inbound_rx,
            transport_tx,
            event_tx,
            status_tx,
        }
    }

    pub async fn run(mut self, shutdown_token: CancellationToken) {
        tracing::info!(node_id = %self.node_id, "Engine service started");
        let mut anti_entropy_timer = time::interval(self.timing.anti_entropy_interval);
        let mut ack_timer = time::interval(self.timing.ack_check_interval);
        let mut health_timer = time::interval(self.timing.peer_health_check_interval);

        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => {
                    tracing::info!("Engine service received shutdown signal.");
                    break;
                }
                _ = anti_entropy_timer.tick() => {
                    self.run_anti_entropy_round().await;
                }
                _ = ack_timer.tick() => {
                    self.sweep_pending_acks().await;
                }
                _ = health_timer.tick() => {
                    self.sweep_peer_health();
                }
                Some(command) = self.command_rx.recv() => {
                    self.handle_command(command).await;
                }
                Some(inbound) = self.inbound_rx.recv() => {
                    let from = inbound.from;
                    let message = codec::decode(&inbound.data);
                    self.dispatch_inbound(message, from).await;
                }
                else => {
                    tracing::info!("Channel closed. Engine service shutting down.");
                    break;
                }
            }
        }
    }

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Send(message) => self.send(message).await,
            EngineCommand::AddPeer { peer_id, host, port } => self.add_peer(peer_id, host, port),
            EngineCommand::Discover { ports, host } => self.discover(ports, host).await,
        }
    }

    fn add_peer(&mut self, peer_id: String, host: IpAddr, port: u16) {
        if let Some(event) = self.peers.add(&self.node_id, &peer_id, host, port, Instant::now()) {
            self.emit_peer_event(&peer_id, event);
        }
        self.publish_status();
    }

    /// Sends an `anti_entropy_request` to every port in `ports` other than
    /// our own bound port. Doubles as a liveness probe; the registry is
    /// only populated once a reply arrives via the inbound path.
    async fn discover(&mut self, ports: Vec<u16>, host: IpAddr) {
        for port in ports {
            if port == self.bind_port {
                continue;
            }
            let mut request = Message::new("", self.node_id.clone(), "discovery", 0, Kind::AntiEntropyRequest);
            request.vector_clock = self.clock.snapshot();
            self.transmit(host, port, &request).await;
        }
    }

    /// The public `send` entry point. Validates, sequences, stores, stamps
    /// the clock snapshot, then routes via broadcast fan-out or
    /// unicast-with-retry.
    async fn send(&mut self, mut message: Message) {
        message.origin = self.node_id.clone();
        if !message.is_valid() {
            tracing::warn!(%message, "Rejected invalid outgoing message");
            return;
        }

        let destination = message.destination.clone();
        let seq = *self.next_sequence.entry(destination.clone()).or_insert(1);
        self.next_sequence.insert(destination.clone(), seq + 1);
        message.sequence_number = seq;
        message.message_id = codec::message_id(&message.origin, seq);

        self.clock.update(&self.node_id, seq);
        self.history.insert(message.clone());
        message.vector_clock = self.clock.snapshot();

        if message.is_broadcast() {
            self.broadcast(message).await;
        } else {
            self.unicast_with_retry(message, &destination).await;
        }
        self.publish_status();
    }

    async fn broadcast(&mut self, message: Message) {
        let bytes = codec::encode(&message);
        for peer_id in self.peers.active_peers() {
            if let Some(peer) = self.peers.lookup(&peer_id) {
                self.transport_tx
                    .send(TransportCommand::Send(peer.addr(), bytes.clone()))
                    .await
                    .ok();
            }
        }
    }

    /// Sends `message` to `peer_id` and, for chat messages, tracks it for
    /// acknowledgement. An unknown destination is logged and dropped, with
    /// no pending-ack entry created.
    async fn unicast_with_retry(&mut self, message: Message, peer_id: &str) {
        let Some(peer) = self.peers.lookup(peer_id).cloned() else {
            tracing::warn!(peer_id, "Unknown destination, dropping message");
            return;
        };
        self.emit_datagram(peer.addr(), &message).await;

        if message.kind == Kind::Chat {
            let key = (message.message_id.clone(), peer_id.to_string());
            self.pending_acks.entry(key).or_insert_with(|| PendingAck {
                message,
                target_peer_id: peer_id.to_string(),
                sent_time: Instant::now(),
                retry_count: 0,
            });
        }
    }

    /// Lower-level unreliable send: used for acks and anti-entropy envelopes
    /// which never track acknowledgement regardless of kind.
    async fn transmit(&mut self, host: IpAddr, port: u16, message: &Message) {
        self.emit_datagram(SocketAddr::new(host, port), message).await;
    }

    async fn emit_datagram(&mut self, addr: SocketAddr, message: &Message) {
        let bytes = codec::encode(message);
        self.transport_tx.send(TransportCommand::Send(addr, bytes)).await.ok();
    }

    async fn sweep_pending_acks(&mut self) {
        let now = Instant::now();
        let timeout = self.timing.ack_timeout;
        let max_retries = self.timing.max_retries;

        let expired: Vec<(String, String)> = self
            .pending_acks
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.sent_time) > timeout)
            .map(|(k, _)| k.clone())
            .collect();

        for key in expired {
            let should_resend = {
                let pending = self.pending_acks.get_mut(&key).expect("key just collected");
                if pending.retry_count < max_retries {
                    pending.retry_count += 1;
                    pending.sent_time = now;
                    true
                } else {
                    false
                }
            };

            if should_resend {
                let (message, addr) = {
                    let pending = &self.pending_acks[&key];
                    let addr = self.peers.lookup(&pending.target_peer_id).map(|p| p.addr());
                    (pending.message.clone(), addr)
                };
                if let Some(addr) = addr {
                    self.emit_datagram(addr, &message).await;
                }
            } else {
                tracing::debug!(message_id = %key.0, "Retry budget exhausted, dropping pending ack");
                self.pending_acks.remove(&key);
            }
        }
    }

    fn sweep_peer_health(&mut self) {
        let events = self.peers.sweep(Instant::now(), self.timing.peer_timeout);
        for (peer_id, event) in events {
            self.emit_peer_event(&peer_id, event);
        }
        self.publish_status();
    }

    async fn run_anti_entropy_round(&mut self) {
        let active = self.peers.active_peers();
        if active.is_empty() {
            return;
        }
        let index = rand::random::<usize>() % active.len();
        let peer_id = &active[index];
        let Some(peer) = self.peers.lookup(peer_id).cloned() else {
            return;
        };
        let mut request = Message::new("", self.node_id.clone(), peer_id.clone(), 0, Kind::AntiEntropyRequest);
        request.vector_clock = self.clock.snapshot();
        self.emit_datagram(peer.addr(), &request).await;
    }

    fn emit_peer_event(&self, peer_id: &str, event: PeerEvent) {
        let event = match event {
            PeerEvent::Discovered => {
                let Some(peer) = self.peers.lookup(peer_id) else { return };
                EngineEvent::PeerDiscovered {
                    peer_id: peer_id.to_string(),
                    host: peer.host,
                    port: peer.port,
                }
            }
            PeerEvent::StatusChanged { active } => EngineEvent::PeerStatusChanged {
                peer_id: peer_id.to_string(),
                active,
            },
        };
        self.event_tx.send(event).ok();
    }

    fn publish_status(&self) {
        let Some(status_tx) = &self.status_tx else { return };
        let status = EngineStatus {
            node_id: self.node_id.clone(),
            active_peers: self.peers.active_peers(),
            history_len: self.history.len(),
            vector_clock: self.clock.snapshot(),
        };
        status_tx.send(status).ok();
    }
}
