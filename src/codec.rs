//! src/codec.rs
//!
//! The message codec. Encodes and decodes a `Message` to and
//! from the compact, self-describing JSON wire form the gossip engine
//! exchanges over datagrams. Field names on the wire match the original
//! protocol exactly: `ChatText`, `Origin`, `Destination`, `SequenceNumber`,
//! `Type`, `VectorClock`, `MessageId`.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Destination sentinel emitted when the caller requests a broadcast.
pub const BROADCAST: &str = "broadcast";
/// Legacy destination sentinel some peers may still emit; accepted on decode.
pub const BROADCAST_LEGACY: &str = "-1";

/// Returns true if `destination` denotes "deliver to every peer", in either
/// of the two wire forms.
pub fn is_broadcast_destination(destination: &str) -> bool {
    destination == BROADCAST || destination == BROADCAST_LEGACY
}

/// The four message kinds the protocol exchanges. Serialized as the bare
/// integer `Type` field (0..3), not as a string tag, to match the wire
/// format's `Type (integer 0..3)` contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Kind {
    #[default]
    Chat,
    AntiEntropyRequest,
    AntiEntropyResponse,
    Ack,
}

impl Kind {
    fn as_u8(self) -> u8 {
        match self {
            Kind::Chat => 0,
            Kind::AntiEntropyRequest => 1,
            Kind::AntiEntropyResponse => 2,
            Kind::Ack => 3,
        }
    }

    fn from_u8(v: u8) -> Option<Kind> {
        match v {
            0 => Some(Kind::Chat),
            1 => Some(Kind::AntiEntropyRequest),
            2 => Some(Kind::AntiEntropyResponse),
            3 => Some(Kind::Ack),
            _ => None,
        }
    }
}

impl Serialize for Kind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Kind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        Kind::from_u8(value)
            .ok_or_else(|| de::Error::custom(format!("unknown message Type: {value}")))
    }
}

/// A single wire-level chat/control record.
///
/// `message_id` is a pure function of `(origin, sequence_number)`; it is
/// always regenerated on construction and, if absent on the wire, on decode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Message {
    pub chat_text: String,
    pub origin: String,
    pub destination: String,
    pub sequence_number: u64,
    #[serde(rename = "Type", default)]
    pub kind: Kind,
    #[serde(default)]
    pub vector_clock: HashMap<String, u64>,
    #[serde(default)]
    pub message_id: String,
}

impl Message {
    /// Builds a message, deriving `message_id` from `(origin, sequence_number)`.
    pub fn new(
        chat_text: impl Into<String>,
        origin: impl Into<String>,
        destination: impl Into<String>,
        sequence_number: u64,
        kind: Kind,
    ) -> Self {
        let origin = origin.into();
        let mut msg = Self {
            chat_text: chat_text.into(),
            origin,
            destination: destination.into(),
            sequence_number,
            kind,
            vector_clock: HashMap::new(),
            message_id: String::new(),
        };
        msg.message_id = message_id(&msg.origin, msg.sequence_number);
        msg
    }

    /// The zero-valued message produced when a datagram fails to decode.
    /// `is_valid` always rejects it.
    pub fn zero() -> Self {
        Self {
            chat_text: String::new(),
            origin: String::new(),
            destination: String::new(),
            sequence_number: 0,
            kind: Kind::Chat,
            vector_clock: HashMap::new(),
            message_id: String::new(),
        }
    }

    /// True for `chat`-shaped messages: non-empty origin and destination and
    /// a strictly positive sequence number. Anti-entropy requests are exempt
    /// from this check at the call sites that need that exemption.
    pub fn is_valid(&self) -> bool {
        self.sequence_number >= 1 && !self.origin.is_empty() && !self.destination.is_empty()
    }

    pub fn is_broadcast(&self) -> bool {
        is_broadcast_destination(&self.destination)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}->{} #{} ({:?})",
            self.origin, self.destination, self.sequence_number, self.kind
        )
    }
}

pub fn message_id(origin: &str, sequence_number: u64) -> String {
    format!("{origin}_{sequence_number}")
}

/// Encodes a message as compact (whitespace-free) JSON bytes.
pub fn encode(message: &Message) -> Vec<u8> {
    serde_json::to_vec(message).expect("Message is always serializable")
}

/// Decodes a datagram. Malformed input (not valid JSON, not an object, or
/// missing a required field) yields `Message::zero()`, which `is_valid`
/// rejects. A present-but-empty `MessageId` is regenerated from the decoded
/// `(origin, sequence_number)`.
pub fn decode(data: &[u8]) -> Message {
    match serde_json::from_slice::<Message>(data) {
        Ok(mut msg) => {
            if msg.message_id.is_empty() {
                msg.message_id = message_id(&msg.origin, msg.sequence_number);
            }
            msg
        }
        Err(_) => Message::zero(),
    }
}
