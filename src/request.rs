//! Request view (C7): the transient, per-invocation record handed to a
//! handler when an inbound request packet is dispatched (`spec.md` §4.6).

use crate::codec::Codec;
use crate::error::ProdigyError;
use crate::packet::{ExchangeId, Packet};
use crate::transport::NetworkProvider;
use serde::{de::DeserializeOwned, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Read-only inbound packet metadata plus a one-shot `respond` capability.
/// Created by the dispatch loop, consumed by exactly one handler
/// invocation, and discarded afterward — it is never shared across tasks.
pub struct Request {
    sender: SocketAddr,
    payload: Vec<u8>,
    exchange_id: ExchangeId,
    message_type: String,
    protocol_name: String,
    responded: AtomicBool,
    transport: Arc<dyn NetworkProvider>,
    codec: Arc<dyn Codec>,
}

impl Request {
    pub(crate) fn new(
        sender: SocketAddr,
        payload: Vec<u8>,
        exchange_id: ExchangeId,
        message_type: String,
        protocol_name: String,
        transport: Arc<dyn NetworkProvider>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        Request {
            sender,
            payload,
            exchange_id,
            message_type,
            protocol_name,
            responded: AtomicBool::new(false),
            transport,
            codec,
        }
    }

    pub fn sender(&self) -> SocketAddr {
        self.sender
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn exchange_id(&self) -> ExchangeId {
        self.exchange_id
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    pub fn protocol_name(&self) -> &str {
        &self.protocol_name
    }

    pub fn has_responded(&self) -> bool {
        self.responded.load(Ordering::SeqCst)
    }

    /// Decode the payload as `T`.
    pub fn get_payload_as<T: DeserializeOwned>(&self) -> Result<T, ProdigyError> {
        crate::codec::decode_payload(&self.payload, Some(self.exchange_id)).map_err(|e| {
            warn!(
                exchange_id = %self.exchange_id,
                protocol_name = %self.protocol_name,
                message_type = %self.message_type,
                "payload decode failed: {e}"
            );
            e
        })
    }

    /// Encode `body`, build a Response packet carrying the same
    /// `exchange_id`, and send it back to the original sender.
    ///
    /// Calling `respond` a second time on the same request fails with
    /// [`ProdigyError::AlreadyResponded`] — the first response has already
    /// gone out and cannot be un-sent.
    pub async fn respond<B: Serialize>(&self, body: Option<B>) -> Result<(), ProdigyError> {
        if self.responded.swap(true, Ordering::SeqCst) {
            warn!(exchange_id = %self.exchange_id, "respond() called twice, rejecting the second call");
            return Err(ProdigyError::AlreadyResponded { exchange_id: self.exchange_id });
        }

        let payload = match body {
            Some(value) => crate::codec::encode_payload(&value)?,
            None => Vec::new(),
        };
        let packet = Packet::new_response(
            self.exchange_id,
            self.protocol_name.clone(),
            self.message_type.clone(),
            payload,
        );
        let bytes = self.codec.encode_packet(&packet)?;
        let result = self.transport.send(&bytes, self.sender).await;
        match &result {
            Ok(()) => debug!(exchange_id = %self.exchange_id, recipient = %self.sender, "response sent"),
            Err(e) => warn!(exchange_id = %self.exchange_id, recipient = %self.sender, "respond() send failed: {e}"),
        }
        result
    }
}
