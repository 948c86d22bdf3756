//! src/app.rs
//!
//! Defines the main `App` struct, which wires the channels
//! linking Transport, Engine, and the optional status server, spawns each
//! as a Tokio task, and manages graceful shutdown.

use crate::{
    api::StatusServer,
    config::Config,
    engine::{Engine, EngineCommand, EngineEvent, EngineStatus},
    error::Result,
    transport::{InboundDatagram, Transport, TransportCommand},
};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// A cloneable seam through which the application layer (CLI, tests, other
/// services) drives a running `Engine` and observes its events.
pub struct EngineHandle {
    pub command_tx: mpsc::Sender<EngineCommand>,
    pub event_rx: mpsc::UnboundedReceiver<EngineEvent>,
    /// The socket address actually bound by Transport. Differs from
    /// `Config::bind_addr` when the configured port is `0`.
    pub bind_addr: std::net::SocketAddr,
}

pub struct App {
    config: Config,
    shutdown_token: CancellationToken,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            config,
            shutdown_token: CancellationToken::new(),
        })
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Spawns Transport, Engine, and the optional status server, returning
    /// an `EngineHandle` plus the join handles for all spawned tasks.
    pub async fn run(self) -> Result<EngineHandle> {
        let node_id = self
            .config
            .node_id
            .clone()
            .unwrap_or_else(|| format!("Node{}", self.config.bind_addr.port()));

        tracing::info!(node_id = %node_id, bind_addr = %self.config.bind_addr, "Starting node...");

        let (transport_command_tx, transport_command_rx) = mpsc::channel::<TransportCommand>(256);
        let (inbound_tx, inbound_rx) = mpsc::channel::<InboundDatagram>(256);
        let (engine_command_tx, engine_command_rx) = mpsc::channel::<EngineCommand>(256);
        let (event_tx, event_rx) = mpsc::unbounded_channel::<EngineEvent>();
        let (status_tx, status_rx) = watch::channel(EngineStatus::default());

        let transport = Transport::bind(self.config.bind_addr, transport_command_rx, inbound_tx).await?;
        let bind_addr = transport.local_addr();
        let bind_port = bind_addr.port();
        let transport_task = tokio::spawn(transport.run(self.shutdown_token.clone()));
        tracing::debug!("Transport service spawned.");

        let status_tx = self.config.status_server.as_ref().map(|_| status_tx);
        let engine = Engine::new(
            node_id,
            bind_port,
            &self.config,
            engine_command_rx,
            inbound_rx,
            transport_command_tx,
            event_tx,
            status_tx,
        );
        let engine_task = tokio::spawn(engine.run(self.shutdown_token.clone()));
        tracing::debug!("Engine service spawned.");

        for peer_addr in &self.config.peers {
            engine_command_tx
                .send(EngineCommand::AddPeer {
                    peer_id: peer_addr.to_string(),
                    host: peer_addr.ip(),
                    port: peer_addr.port(),
                })
                .await
                .ok();
        }

        let status_task = if let Some(status_config) = self.config.status_server.clone() {
            tracing::info!("Status server enabled.");
            let server = StatusServer::new(status_config.bind_addr, status_rx);
            Some(tokio::spawn(server.run(self.shutdown_token.clone())))
        } else {
            None
        };

        let shutdown_token = self.shutdown_token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl+C received. Initiating graceful shutdown...");
                shutdown_token.cancel();
            }
        });

        tokio::spawn(async move {
            if let Err(e) = transport_task.await {
                tracing::error!(error = ?e, "Transport service task failed");
            }
            if let Err(e) = engine_task.await {
                tracing::error!(error = ?e, "Engine service task failed");
            }
            if let Some(task) = status_task {
                if let Err(e) = task.await {
                    tracing::error!(error = ?e, "Status server task failed");
                }
            }
        });

        Ok(EngineHandle {
            command_tx: engine_command_tx,
            event_rx,
            bind_addr,
        })
    }
}
