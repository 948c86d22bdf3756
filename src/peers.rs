//! src/peers.rs
//!
//! The peer registry: a directory of known peers with
//! address, liveness flag, and last-seen timestamp. Mutated only by the
//! gossip engine, in response to inbound traffic or the periodic health
//! sweep. Emits `PeerEvent`s for the engine to forward to the application.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerInfo {
    pub peer_id: String,
    pub host: IpAddr,
    pub port: u16,
    pub active: bool,
}

impl PeerInfo {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerEvent {
    Discovered,
    StatusChanged { active: bool },
}

struct Entry {
    info: PeerInfo,
    last_seen: Instant,
}

#[derive(Default)]
pub struct PeerRegistry {
    peers: HashMap<String, Entry>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent upsert; rejects `peer_id == self_id`. Emits `Discovered`
    /// exactly once, on the first insertion of a distinct `peer_id`.
    pub fn add(
        &mut self,
        self_id: &str,
        peer_id: &str,
        host: IpAddr,
        port: u16,
        now: Instant,
    ) -> Option<PeerEvent> {
        if peer_id == self_id {
            return None;
        }
        let is_new = !self.peers.contains_key(peer_id);
        self.peers.insert(
            peer_id.to_string(),
            Entry {
                info: PeerInfo {
                    peer_id: peer_id.to_string(),
                    host,
                    port,
                    active: true,
                },
                last_seen: now,
            },
        );
        if is_new {
            Some(PeerEvent::Discovered)
        } else {
            None
        }
    }

    /// Updates `last_seen`; flips an inactive peer back to active and emits
    /// `StatusChanged(true)` on that edge transition.
    pub fn touch(&mut self, peer_id: &str, now: Instant) -> Option<PeerEvent> {
        let entry = self.peers.get_mut(peer_id)?;
        entry.last_seen = now;
        if !entry.info.active {
            entry.info.active = true;
            Some(PeerEvent::StatusChanged { active: true })
        } else {
            None
        }
    }

    /// Marks every peer whose `last_seen` has aged past `timeout` inactive,
    /// emitting one `StatusChanged(false)` per transition.
    pub fn sweep(&mut self, now: Instant, timeout: Duration) -> Vec<(String, PeerEvent)> {
        let mut events = Vec::new();
        for (peer_id, entry) in self.peers.iter_mut() {
            if entry.info.active && now.saturating_duration_since(entry.last_seen) > timeout {
                entry.info.active = false;
                events.push((peer_id.clone(), PeerEvent::StatusChanged { active: false }));
            }
        }
        events
    }

    pub fn active_peers(&self) -> Vec<String> {
        self.peers
            .values()
            .filter(|e| e.info.active)
            .map(|e| e.info.peer_id.clone())
            .collect()
    }

    pub fn lookup(&self, peer_id: &str) -> Option<&PeerInfo> {
        self.peers.get(peer_id).map(|e| &e.info)
    }

    pub fn snapshot(&self) -> Vec<PeerInfo> {
        self.peers.values().map(|e| e.info.clone()).collect()
    }
}
