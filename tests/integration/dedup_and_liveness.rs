//! tests/integration/dedup_and_liveness.rs
//!
//! S5 — a retransmitted duplicate is delivered to the application exactly
//! once. S6 — an unresponsive peer is marked inactive after `peer_timeout`
//! and flips back to active on its next datagram.

use crate::common::harness::{RawPeer, TestNode};
use gossip_network::codec::{Kind, Message};
use gossip_network::engine::EngineEvent;
use std::time::Duration;
use test_log::test;

#[test(tokio::test)]
async fn duplicate_chat_message_is_delivered_exactly_once() {
    let mut node_b = TestNode::spawn("B", vec![]).await.expect("spawn B");
    let raw_a = RawPeer::bind().await.expect("bind raw peer A");

    let msg = Message::new("hi", "A", "B", 1, Kind::Chat);
    raw_a.send(&msg, node_b.addr).await.expect("send first copy");
    raw_a.send(&msg, node_b.addr).await.expect("send duplicate copy");

    node_b
        .wait_for_event(Duration::from_millis(300), |e| {
            matches!(e, EngineEvent::MessageReceived(m) if m.message_id == "A_1")
        })
        .await
        .expect("expected exactly one delivery");

    node_b
        .assert_no_event(Duration::from_millis(200))
        .await
        .expect("duplicate must not be delivered a second time");

    node_b.shutdown();
}

#[test(tokio::test)]
async fn unresponsive_peer_goes_inactive_then_active_again() {
    let mut node_a = TestNode::spawn("A", vec![]).await.expect("spawn A");
    let raw_b = RawPeer::bind().await.expect("bind raw peer B");
    node_a.add_peer("B", raw_b.addr()).await.expect("add peer B");

    node_a
        .wait_for_event(Duration::from_millis(900), |e| {
            matches!(e, EngineEvent::PeerStatusChanged { peer_id, active } if peer_id == "B" && !active)
        })
        .await
        .expect("B should be marked inactive after the health timeout");

    // A single datagram from B, of any kind, revives it.
    let probe = Message::new("", "B", "discovery", 0, Kind::AntiEntropyRequest);
    raw_b.send(&probe, node_a.addr).await.expect("send probe");

    node_a
        .wait_for_event(Duration::from_millis(400), |e| {
            matches!(e, EngineEvent::PeerStatusChanged { peer_id, active } if peer_id == "B" && *active)
        })
        .await
        .expect("B should be marked active again after any inbound datagram");

    node_a.shutdown();
}
