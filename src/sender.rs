//! Sender capability (C6): outbound `send` (one-way) and `exchange`
//! (request/response with timeout), described in `spec.md` §4.5.

use crate::codec::Codec;
use crate::error::ProdigyError;
use crate::packet::{ExchangeId, Packet};
use crate::pending::PendingResponseTable;
use crate::transport::NetworkProvider;
use serde::{de::DeserializeOwned, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for `exchange` when the caller does not supply one.
/// Chosen as the midpoint of the 10-30s range `spec.md` §4.5 calls
/// acceptable.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Capability handed to every handler and to callers driving a
/// [`crate::runner::ProtocolRunner`] directly: send one-way messages, or
/// start a request/response exchange and suspend until the reply arrives
/// or the timeout elapses.
///
/// Cloning is cheap — every clone shares the same transport, codec, and
/// pending-response table.
#[derive(Clone)]
pub struct Sender {
    transport: Arc<dyn NetworkProvider>,
    codec: Arc<dyn Codec>,
    pending: PendingResponseTable,
    default_timeout: Duration,
}

impl Sender {
    pub(crate) fn new(
        transport: Arc<dyn NetworkProvider>,
        codec: Arc<dyn Codec>,
        pending: PendingResponseTable,
        default_timeout: Duration,
    ) -> Self {
        Sender { transport, codec, pending, default_timeout }
    }

    /// Fire-and-forget: encode `body`, build a Request packet with a fresh
    /// exchange id, and hand it to the transport. Completes when the
    /// provider accepts the datagram — no response is awaited.
    pub async fn send<B: Serialize>(
        &self,
        protocol_name: &str,
        message_type: &str,
        recipient: SocketAddr,
        body: Option<B>,
    ) -> Result<(), ProdigyError> {
        let exchange_id = ExchangeId::generate();
        let payload = self.encode_body(body)?;
        let packet = Packet::new_request(exchange_id, protocol_name, message_type, payload);
        let bytes = self.codec.encode_packet(&packet)?;
        self.transport.send(&bytes, recipient).await.map_err(|e| {
            warn!(%exchange_id, protocol_name, message_type, "send failed: {e}");
            e
        })
    }

    /// Send a request and suspend until the matching response arrives or
    /// `timeout` elapses (default [`DEFAULT_EXCHANGE_TIMEOUT`]).
    ///
    /// The pending-response slot is reserved *before* the datagram is
    /// handed to the transport, so a response racing the send can never be
    /// dropped (`spec.md` §4.5's required ordering).
    pub async fn exchange<B: Serialize, T: DeserializeOwned>(
        &self,
        protocol_name: &str,
        message_type: &str,
        recipient: SocketAddr,
        body: Option<B>,
        timeout: Option<Duration>,
    ) -> Result<T, ProdigyError> {
        let exchange_id = ExchangeId::generate();
        let receiver = self.pending.reserve(exchange_id).await?;

        let payload = match self.encode_body(body) {
            Ok(p) => p,
            Err(e) => {
                self.pending.cancel(exchange_id).await;
                return Err(e);
            }
        };
        let packet = Packet::new_request(exchange_id, protocol_name, message_type, payload);
        let bytes = match self.codec.encode_packet(&packet) {
            Ok(b) => b,
            Err(e) => {
                self.pending.cancel(exchange_id).await;
                return Err(e);
            }
        };

        if let Err(e) = self.transport.send(&bytes, recipient).await {
            self.pending.cancel(exchange_id).await;
            warn!(%exchange_id, protocol_name, message_type, "exchange send failed: {e}");
            return Err(e);
        }

        debug!(%exchange_id, protocol_name, message_type, %recipient, "exchange sent, awaiting response");
        let response = self
            .pending
            .await_response(exchange_id, receiver, timeout.unwrap_or(self.default_timeout))
            .await?;

        crate::codec::decode_payload(&response.payload, Some(exchange_id))
    }

    fn encode_body<B: Serialize>(&self, body: Option<B>) -> Result<Vec<u8>, ProdigyError> {
        match body {
            Some(value) => crate::codec::encode_payload(&value),
            None => Ok(Vec::new()),
        }
    }
}
