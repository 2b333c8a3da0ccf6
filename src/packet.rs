//! The wire packet (C1): an immutable record carrying routing + payload.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 64-bit opaque correlation token, generated per outbound request and
/// echoed verbatim by the matching response.
///
/// Rendered as lowercase hex in `Display`/`Debug`, matching the convention
/// the rest of the codebase uses for hash-like identifiers rather than
/// printing raw integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExchangeId(pub u64);

impl ExchangeId {
    /// Draw a fresh id from the 64-bit random space. Collisions are
    /// negligible but are still detected by the pending-response table on
    /// `reserve` (see `spec.md` §4.4).
    pub fn generate() -> Self {
        ExchangeId(rand::thread_rng().next_u64())
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Routing metadata distinguishing a fire-and-forget/awaited request from
/// its response. Not part of packet identity (see [`Packet`]'s `PartialEq`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketKind {
    Request,
    Response,
}

/// Immutable record carrying routing and payload across the wire.
///
/// Equality is defined by `(protocol_name, message_type, payload)` only —
/// `exchange_id` and `kind` are routing metadata, not identity (`spec.md`
/// §3). Callers must not rely on `Packet` equality for correlation; use the
/// pending-response table keyed by `exchange_id` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    pub exchange_id: ExchangeId,
    pub kind: PacketKind,
    pub protocol_name: String,
    pub message_type: String,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new_request(
        exchange_id: ExchangeId,
        protocol_name: impl Into<String>,
        message_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Packet {
            exchange_id,
            kind: PacketKind::Request,
            protocol_name: protocol_name.into(),
            message_type: message_type.into(),
            payload,
        }
    }

    pub fn new_response(
        exchange_id: ExchangeId,
        protocol_name: impl Into<String>,
        message_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Packet {
            exchange_id,
            kind: PacketKind::Response,
            protocol_name: protocol_name.into(),
            message_type: message_type.into(),
            payload,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self.kind, PacketKind::Request)
    }

    pub fn is_response(&self) -> bool {
        matches!(self.kind, PacketKind::Response)
    }
}

impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        self.protocol_name == other.protocol_name
            && self.message_type == other.message_type
            && self.payload == other.payload
    }
}

impl Eq for Packet {}
