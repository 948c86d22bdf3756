//! tests/integration/sequencing.rs
//!
//! S1 — two sends to the same destination are assigned strictly increasing
//! sequence numbers, carried as-is on the wire.

use crate::common::harness::{RawPeer, TestNode};
use gossip_network::codec::{Kind, Message};
use std::time::Duration;
use test_log::test;

#[test(tokio::test)]
async fn two_sends_to_the_same_destination_get_increasing_sequence_numbers() {
    let node_a = TestNode::spawn("A", vec![]).await.expect("spawn A");
    let peer_b = RawPeer::bind().await.expect("bind raw peer B");
    node_a.add_peer("B", peer_b.addr()).await.expect("add peer B");

    node_a
        .send(Message::new("hi", "ignored", "B", 1, Kind::Chat))
        .await
        .expect("send first");
    node_a
        .send(Message::new("there", "ignored", "B", 1, Kind::Chat))
        .await
        .expect("send second");

    let (first, _) = peer_b.recv(Duration::from_millis(300)).await.expect("recv first datagram");
    let (second, _) = peer_b.recv(Duration::from_millis(300)).await.expect("recv second datagram");

    assert_eq!(first.origin, "A");
    assert_eq!(first.sequence_number, 1);
    assert_eq!(first.chat_text, "hi");

    assert_eq!(second.origin, "A");
    assert_eq!(second.sequence_number, 2);
    assert_eq!(second.chat_text, "there");

    node_a.shutdown();
}
