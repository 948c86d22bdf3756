//! src/main.rs
//!
//! Binary entry point. A thin, convenience CLI around the gossip-network
//! library: parses `--port`/`--peers`, derives a node identifier per the
//! well-known default port convention, and drives the engine from a
//! line-oriented stdin loop. This binary, its argument parsing, and its
//! node-naming convention are all application-layer, not engine-layer.

use anyhow::Context;
use clap::Parser;
use gossip_network::codec::{Kind, Message, BROADCAST};
use gossip_network::engine::{EngineCommand, EngineEvent};
use gossip_network::{App, Config};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::io::{AsyncBufReadExt, BufReader};

/// The well-known default port set; a bound port at index `i` in this list
/// derives the node id `Node{i+1}`, matching the original chat node.
const DEFAULT_PORTS: [u16; 4] = [9001, 9002, 9003, 9004];

#[derive(Parser, Debug)]
#[command(about = "A peer-to-peer gossip chat node")]
struct Args {
    /// UDP port to bind on (1024-65535).
    #[arg(long, default_value_t = 9001)]
    port: u16,

    /// Comma-separated list of peer ports. Defaults to the well-known set.
    #[arg(long)]
    peers: Option<String>,
}

fn node_id_for_port(port: u16) -> String {
    match DEFAULT_PORTS.iter().position(|&p| p == port) {
        Some(index) => format!("Node{}", index + 1),
        None => format!("Node{port}"),
    }
}

fn discovery_ports(args: &Args) -> Vec<u16> {
    match &args.peers {
        Some(csv) => csv.split(',').filter_map(|p| p.trim().parse().ok()).collect(),
        None => DEFAULT_PORTS.to_vec(),
    }
}

fn parse_line(node_id: &str, line: &str) -> Option<Message> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if let Some(rest) = line.strip_prefix('@') {
        let (destination, text) = rest.split_once(' ')?;
        Some(Message::new(text, node_id, destination, 1, Kind::Chat))
    } else {
        Some(Message::new(line, node_id, BROADCAST, 1, Kind::Chat))
    }
}

fn print_event(node_id: &str, event: EngineEvent) {
    match event {
        EngineEvent::MessageReceived(message) => {
            if message.is_broadcast() {
                println!("[broadcast] {}: {}", message.origin, message.chat_text);
            } else {
                println!("[{node_id}] {}: {}", message.origin, message.chat_text);
            }
        }
        EngineEvent::PeerDiscovered { peer_id, host, port } => {
            println!("discovered peer {peer_id} at {host}:{port}");
        }
        EngineEvent::PeerStatusChanged { peer_id, active } => {
            println!("peer {peer_id} is now {}", if active { "active" } else { "inactive" });
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let node_id = node_id_for_port(args.port);
    let discovery = discovery_ports(&args);
    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), args.port);

    // `peers` is left empty here: the well-known peers are registered below,
    // by node id rather than address, so `App::run` doesn't also register
    // them under a second, address-keyed peer id.
    let config = Config {
        node_id: Some(node_id.clone()),
        bind_addr,
        ..Config::default()
    };

    let app = App::new(config).context("Failed to create app")?;
    let shutdown_token = app.shutdown_token();
    let mut handle = app.run().await.context("Failed to start node")?;

    // Manually register the well-known peers (deterministic setup) and
    // probe them with a discovery round, mirroring the original node.
    for &port in &discovery {
        if port == args.port {
            continue;
        }
        handle
            .command_tx
            .send(EngineCommand::AddPeer {
                peer_id: node_id_for_port(port),
                host: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port,
            })
            .await
            .ok();
    }
    handle
        .command_tx
        .send(EngineCommand::Discover {
            ports: discovery,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        })
        .await
        .ok();

    println!(
        "{node_id} listening on {bind_addr}. Type a message to broadcast, or '@Peer text' to unicast. Ctrl+C to quit."
    );

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => break,
            Some(event) = handle.event_rx.recv() => {
                print_event(&node_id, event);
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(text)) => {
                        if let Some(message) = parse_line(&node_id, &text) {
                            handle.command_tx.send(EngineCommand::Send(message)).await.ok();
                        }
                    }
                    _ => break,
                }
            }
        }
    }

    Ok(())
}
