//! src/transport.rs
//!
//! Defines the `Transport` service, responsible for all
//! low-level network I/O over a single unreliable UDP socket. Transport
//! never parses payloads: it hands the engine raw bytes and lets decode
//! failures stay the engine's concern, per the error-handling design (a
//! malformed datagram must never mutate engine state before the engine
//! even sees it).

use crate::error::{Error, Result};
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The maximum UDP datagram this node will attempt to read in one call.
const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// Commands accepted from the engine.
#[derive(Debug)]
pub enum TransportCommand {
    Send(SocketAddr, Vec<u8>),
}

/// A raw datagram received from a peer, bundled with its source address.
#[derive(Debug)]
pub struct InboundDatagram {
    pub from: SocketAddr,
    pub data: Vec<u8>,
}

pub struct Transport {
    socket: UdpSocket,
    command_rx: mpsc::Receiver<TransportCommand>,
    inbound_tx: mpsc::Sender<InboundDatagram>,
}

impl Transport {
    pub async fn bind(
        bind_addr: SocketAddr,
        command_rx: mpsc::Receiver<TransportCommand>,
        inbound_tx: mpsc::Sender<InboundDatagram>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| Error::Bind(bind_addr, e))?;
        Ok(Self {
            socket,
            command_rx,
            inbound_tx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket
            .local_addr()
            .expect("bound socket always has a local address")
    }

    /// The main run loop. Reads datagrams and forwards send commands until
    /// `shutdown_token` is cancelled or the command channel closes.
    pub async fn run(mut self, shutdown_token: CancellationToken) {
        let local_addr = self.local_addr();
        tracing::info!(%local_addr, "Transport service started");
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => {
                    tracing::info!("Transport service received shutdown signal.");
                    break;
                }
                recv = self.socket.recv_from(&mut buf) => {
                    match recv {
                        Ok((len, from)) => {
                            let inbound = InboundDatagram { from, data: buf[..len].to_vec() };
                            if self.inbound_tx.send(inbound).await.is_err() {
                                tracing::warn!("Inbound channel closed; transport shutting down.");
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to read datagram");
                        }
                    }
                }
                Some(command) = self.command_rx.recv() => {
                    self.handle_command(command).await;
                }
                else => {
                    tracing::info!("Command channel closed. Transport service shutting down.");
                    break;
                }
            }
        }
    }

    async fn handle_command(&self, command: TransportCommand) {
        match command {
            TransportCommand::Send(addr, bytes) => {
                if let Err(e) = self.socket.send_to(&bytes, addr).await {
                    tracing::warn!(peer = %addr, error = %e, "Failed to transmit datagram");
                }
            }
        }
    }
}
