//! src/api/mod.rs
//!
//! Defines the `StatusServer`: an optional, read-only HTTP introspection
//! endpoint over the engine's peer/history snapshot. Disabled unless
//! `Config::status_server` is set. Carries no chat payloads and exposes no
//! graphical interface, just a single JSON snapshot for operational visibility.

use crate::engine::EngineStatus;
use axum::{extract::State, routing::get, Json, Router};
use std::net::SocketAddr;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub struct StatusServer {
    bind_addr: SocketAddr,
    status_rx: watch::Receiver<EngineStatus>,
}

impl StatusServer {
    pub fn new(bind_addr: SocketAddr, status_rx: watch::Receiver<EngineStatus>) -> Self {
        Self { bind_addr, status_rx }
    }

    pub async fn run(self, shutdown_token: CancellationToken) -> crate::error::Result<()> {
        let app = Router::new()
            .route("/status", get(status_handler))
            .with_state(self.status_rx);

        tracing::info!(listen_addr = %self.bind_addr, "Status server listening");
        let listener = tokio::net::TcpListener::bind(self.bind_addr)
            .await
            .map_err(crate::error::Error::StatusServer)?;

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
                tracing::info!("Status server received shutdown signal.");
            })
            .await
            .map_err(|e| crate::error::Error::StatusServer(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        Ok(())
    }
}

async fn status_handler(State(status_rx): State<watch::Receiver<EngineStatus>>) -> Json<EngineStatus> {
    Json(status_rx.borrow().clone())
}
