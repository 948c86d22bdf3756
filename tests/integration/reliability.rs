//! tests/integration/reliability.rs
//!
//! S2 — an ack stops the retry cycle. S3 — retries are bounded by
//! `max_retries` and the message is never resent again afterward.

use crate::common::harness::{RawPeer, TestNode};
use gossip_network::codec::{Kind, Message};
use std::time::Duration;
use test_log::test;

#[test(tokio::test)]
async fn ack_received_stops_the_retry_cycle() {
    let node_a = TestNode::spawn("A", vec![]).await.expect("spawn A");
    let peer_b = RawPeer::bind().await.expect("bind raw peer B");
    node_a.add_peer("B", peer_b.addr()).await.expect("add peer B");

    node_a
        .send(Message::new("hi", "ignored", "B", 1, Kind::Chat))
        .await
        .expect("send");

    let (first, from) = peer_b.recv(Duration::from_millis(300)).await.expect("recv chat datagram");
    assert_eq!(first.kind, Kind::Chat);

    let mut ack = Message::new("", "B", "A", 0, Kind::Ack);
    ack.message_id = first.message_id.clone();
    peer_b.send(&ack, from).await.expect("send ack");

    // Past the ack timeout, no retry should have been sent.
    tokio::time::sleep(Duration::from_millis(250)).await;
    let retried = peer_b.recv(Duration::from_millis(50)).await;
    assert!(retried.is_err(), "expected no retry after ack, got {retried:?}");

    node_a.shutdown();
}

#[test(tokio::test)]
async fn retries_are_bounded_then_silently_dropped() {
    let node_a = TestNode::spawn("A", vec![]).await.expect("spawn A");
    // A peer that receives but never acks.
    let peer_b = RawPeer::bind().await.expect("bind raw peer B");
    node_a.add_peer("B", peer_b.addr()).await.expect("add peer B");

    node_a
        .send(Message::new("hi", "ignored", "B", 1, Kind::Chat))
        .await
        .expect("send");

    // One initial send plus up to `max_retries` (3) retries: 4 datagrams.
    for attempt in 0..4 {
        let (msg, _) = peer_b
            .recv(Duration::from_millis(400))
            .await
            .unwrap_or_else(|e| panic!("expected datagram #{attempt}: {e}"));
        assert_eq!(msg.kind, Kind::Chat);
        assert_eq!(msg.message_id, "A_1");
    }

    // The retry budget is now exhausted; nothing more should arrive.
    let fifth = peer_b.recv(Duration::from_millis(400)).await;
    assert!(fifth.is_err(), "expected no further retries, got {fifth:?}");

    node_a.shutdown();
}
