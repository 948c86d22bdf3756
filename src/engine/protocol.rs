//! src/engine/protocol.rs
//!
//! Implements inbound dispatch: decoding is already done by the caller
//! (`Engine::run`); this module classifies by `Kind` and applies the
//! per-kind state transitions.

use super::Engine;
use crate::codec::{Kind, Message};
use std::net::SocketAddr;
use std::time::Instant;

impl Engine {
    /// Entry point for every decoded inbound message. Drops our own traffic
    /// and malformed decodes (empty origin) before touching any state: a
    /// malformed datagram must never mutate engine state.
    pub(crate) async fn dispatch_inbound(&mut self, message: Message, from: SocketAddr) {
        if message.origin.is_empty() || message.origin == self.node_id {
            return;
        }

        let now = Instant::now();
        if self.peers.lookup(&message.origin).is_none() {
            if let Some(event) = self
                .peers
                .add(&self.node_id, &message.origin, from.ip(), from.port(), now)
            {
                self.emit_peer_event(&message.origin, event);
            }
        } else if let Some(event) = self.peers.touch(&message.origin, now) {
            self.emit_peer_event(&message.origin, event);
        }

        match message.kind {
            Kind::Chat => self.handle_chat(message).await,
            Kind::AntiEntropyRequest => self.handle_anti_entropy_request(message, from).await,
            Kind::AntiEntropyResponse => self.handle_anti_entropy_response(message).await,
            Kind::Ack => self.handle_ack(message),
        }
        self.publish_status();
    }

    /// Store once, update the clock, deliver to the application if addressed
    /// to us or broadcast, ack if addressed to us directly. Duplicates are
    /// silently ignored (at-most-once delivery).
    async fn handle_chat(&mut self, message: Message) {
        if !message.is_valid() {
            return;
        }
        if self.history.has(&message.message_id) {
            return;
        }

        let is_for_us = message.destination == self.node_id || message.is_broadcast();
        let is_direct_to_us = message.destination == self.node_id;

        self.history.insert(message.clone());
        self.clock.update(&message.origin, message.sequence_number);

        if is_for_us {
            self.event_tx
                .send(super::EngineEvent::MessageReceived(message.clone()))
                .ok();
        }

        if is_direct_to_us {
            let mut ack = Message::new("", self.node_id.clone(), message.origin.clone(), 0, Kind::Ack);
            ack.message_id = message.message_id.clone();
            self.unicast_with_retry(ack, &message.origin).await;
        }
    }

    /// Replies with our vector clock and every message the requester lacks,
    /// all sent unreliably straight to the sender's address: the
    /// requester's own retry path, or the next anti-entropy round, covers
    /// loss.
    async fn handle_anti_entropy_request(&mut self, message: Message, from: SocketAddr) {
        let missing = self.history.missing_for(&message.vector_clock);

        let mut response = Message::new("", self.node_id.clone(), message.origin.clone(), 0, Kind::AntiEntropyResponse);
        response.vector_clock = self.clock.snapshot();
        self.transmit(from.ip(), from.port(), &response).await;

        if !missing.is_empty() {
            tracing::debug!(peer = %message.origin, count = missing.len(), "Anti-entropy: sending missing messages");
        }
        for missing_message in missing {
            self.transmit(from.ip(), from.port(), &missing_message).await;
        }
    }

    /// Treats the response's vector clock as the peer's knowledge and
    /// re-sends whatever it lacks via the standard unicast path. This can
    /// create a pending-ack entry for a message whose real destination
    /// differs from `message.origin`; the pending table is keyed by
    /// `(message_id, target_peer_id)` precisely so that does not collide
    /// with any other in-flight copy of the same message.
    async fn handle_anti_entropy_response(&mut self, message: Message) {
        let missing = self.history.missing_for(&message.vector_clock);
        if !missing.is_empty() {
            tracing::debug!(peer = %message.origin, count = missing.len(), "Anti-entropy: re-sending missing messages");
        }
        for missing_message in missing {
            self.unicast_with_retry(missing_message, &message.origin).await;
        }
    }

    fn handle_ack(&mut self, message: Message) {
        self.pending_acks
            .remove(&(message.message_id.clone(), message.origin.clone()));
    }
}
