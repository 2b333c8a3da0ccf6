//! Error taxonomy surfaced to embedding applications.

use std::fmt;

/// Errors surfaced across the sender, request, and dispatch-loop boundaries.
///
/// `MalformedPacket` and `ExchangeIdCollision` are the two internal-only
/// variants: the former never escapes the dispatch loop (it is logged and
/// the datagram is dropped), the latter is only ever returned from
/// [`crate::pending::PendingResponseTable::reserve`].
#[derive(Debug, thiserror::Error)]
pub enum ProdigyError {
    /// An `exchange` did not receive a matching response before its deadline.
    #[error("exchange {exchange_id} timed out waiting for a response")]
    Timeout { exchange_id: crate::packet::ExchangeId },

    /// A [`crate::request::Request`] was responded to more than once.
    #[error("request {exchange_id} has already been responded to")]
    AlreadyResponded { exchange_id: crate::packet::ExchangeId },

    /// A payload could not be decoded as the type the caller requested.
    #[error("payload for {exchange_id:?} could not be decoded: {source}")]
    PayloadDecodeError {
        exchange_id: Option<crate::packet::ExchangeId>,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// The underlying [`crate::transport::NetworkProvider`] failed to accept
    /// or deliver a datagram.
    #[error("transport error: {0}")]
    TransportError(String),

    /// A [`crate::runner::ProtocolRunner`] method was called out of order
    /// (e.g. `run` before `bind`, or any call after `close`).
    #[error("invalid state transition: {0}")]
    InvalidState(&'static str),

    /// Internal: the dispatch loop could not decode an inbound datagram as a
    /// well-formed packet. Never surfaced to a caller — logged and dropped.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// Internal: `reserve` was asked to register an exchange id that is
    /// already pending. Per spec this is treated as an exchange-id-generator
    /// programming error (64-bit random space, collisions are negligible)
    /// and is detected rather than silently overwritten.
    #[error("exchange id {0} collided with an in-flight reservation")]
    ExchangeIdCollision(crate::packet::ExchangeId),
}

impl ProdigyError {
    pub fn transport(err: impl fmt::Display) -> Self {
        ProdigyError::TransportError(err.to_string())
    }

    pub fn decode(
        exchange_id: Option<crate::packet::ExchangeId>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ProdigyError::PayloadDecodeError { exchange_id, source: Box::new(source) }
    }
}

pub type Result<T> = std::result::Result<T, ProdigyError>;
