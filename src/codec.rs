//! Codec interface (C2) and the default postcard-backed implementation (C10).
//!
//! The wire format is intentionally not part of the public contract: any
//! codec is acceptable as long as `decode_packet(encode_packet(p)) == p` for
//! every well-formed packet (`spec.md` §4.1, property 4).
//!
//! `Codec` only covers the *packet* envelope — both `Sender` and `Request`
//! hold it behind `Arc<dyn Codec>`, so every method on the trait has to be
//! dispatchable through a vtable. Payload (de)serialization is generic over
//! whatever type the caller asks for, and a trait with a generic method is
//! not object-safe, so it cannot live on `Codec` itself. It's exposed
//! instead as the free functions [`encode_payload`]/[`decode_payload`]
//! below, the same split `ant-net`'s `RequestResponse`/`ProtocolHandler`
//! pair draws between a concrete wire type and caller-side typed
//! (de)serialization.

use crate::error::ProdigyError;
use crate::packet::{ExchangeId, Packet, PacketKind};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Maximum encoded packet size accepted by [`PostcardCodec::decode_packet`].
///
/// Defense-in-depth against a peer sending an oversized datagram: the
/// transport layer may already bound datagram size, but the codec should
/// not assume it. Mirrors the bounded-collection posture used throughout
/// this codebase's reference wire types.
pub const MAX_PACKET_SIZE: usize = 64 * 1024;

/// Packet (de)serialization contract (`spec.md` §4.1).
///
/// Implementations must be safe to share across tasks: the sender and
/// dispatch loop both hold a reference to the same codec concurrently.
pub trait Codec: Send + Sync {
    fn encode_packet(&self, packet: &Packet) -> Result<Vec<u8>, ProdigyError>;
    fn decode_packet(&self, bytes: &[u8]) -> Result<Packet, ProdigyError>;
}

/// Wire representation of [`Packet`]. Kept as a separate type (rather than
/// deriving directly on `Packet`) so the wire shape can evolve independently
/// of the in-memory model.
#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    exchange_id: u64,
    kind: WireKind,
    protocol_name: String,
    message_type: String,
    payload: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
enum WireKind {
    Request,
    Response,
}

impl From<PacketKind> for WireKind {
    fn from(k: PacketKind) -> Self {
        match k {
            PacketKind::Request => WireKind::Request,
            PacketKind::Response => WireKind::Response,
        }
    }
}

impl From<WireKind> for PacketKind {
    fn from(k: WireKind) -> Self {
        match k {
            WireKind::Request => PacketKind::Request,
            WireKind::Response => PacketKind::Response,
        }
    }
}

/// Default [`Codec`]: postcard over the derived `Serialize`/`Deserialize`
/// wire envelope. Postcard's varint length prefixes mean a corrupt or
/// adversarial length field cannot force an unbounded allocation, which is
/// why the original codebase reserves postcard for anything crossing the
/// network boundary.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostcardCodec;

impl Codec for PostcardCodec {
    fn encode_packet(&self, packet: &Packet) -> Result<Vec<u8>, ProdigyError> {
        let envelope = WireEnvelope {
            exchange_id: packet.exchange_id.0,
            kind: packet.kind.into(),
            protocol_name: packet.protocol_name.clone(),
            message_type: packet.message_type.clone(),
            payload: packet.payload.clone(),
        };
        postcard::to_allocvec(&envelope)
            .map_err(|e| ProdigyError::MalformedPacket(format!("encode failed: {e}")))
    }

    fn decode_packet(&self, bytes: &[u8]) -> Result<Packet, ProdigyError> {
        if bytes.len() > MAX_PACKET_SIZE {
            return Err(ProdigyError::MalformedPacket(format!(
                "packet of {} bytes exceeds MAX_PACKET_SIZE ({MAX_PACKET_SIZE})",
                bytes.len()
            )));
        }
        let envelope: WireEnvelope = postcard::from_bytes(bytes)
            .map_err(|e| ProdigyError::MalformedPacket(format!("decode failed: {e}")))?;
        Ok(Packet {
            exchange_id: ExchangeId(envelope.exchange_id),
            kind: envelope.kind.into(),
            protocol_name: envelope.protocol_name,
            message_type: envelope.message_type,
            payload: envelope.payload,
        })
    }
}

/// Encode `value` as a payload blob, for embedding in a [`Packet`]'s
/// `payload` field. Always postcard — payload (de)serialization is generic
/// over the caller's type, so unlike packet encoding it cannot be routed
/// through whichever [`Codec`] is plugged in behind `dyn` (see module docs).
pub fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, ProdigyError> {
    postcard::to_allocvec(value).map_err(|e| ProdigyError::decode(None, PostcardError(e.to_string())))
}

/// Decode a payload blob as `T`. `exchange_id` is attached to the returned
/// error (if any) purely for diagnostics.
pub fn decode_payload<T: DeserializeOwned>(
    bytes: &[u8],
    exchange_id: Option<ExchangeId>,
) -> Result<T, ProdigyError> {
    postcard::from_bytes(bytes).map_err(|e| ProdigyError::decode(exchange_id, PostcardError(e.to_string())))
}

#[derive(Debug, thiserror::Error)]
#[error("postcard error: {0}")]
struct PostcardError(String);
