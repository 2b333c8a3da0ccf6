//! Pending-response table (C5): the correlation map `exchange_id -> delivery
//! slot` described in `spec.md` §4.4.
//!
//! Every slot is removed exactly once — on successful delivery, on timeout,
//! or on cancellation — which is why [`deliver`](PendingResponseTable::deliver)
//! and [`cancel`](PendingResponseTable::cancel) both simply `remove` from the
//! underlying map rather than mutating a slot in place.

use crate::error::ProdigyError;
use crate::packet::{ExchangeId, Packet};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

/// Concurrent `exchange_id -> one-shot delivery slot` map.
///
/// Cloning shares the underlying map (cheap `Arc` clone) — every
/// [`crate::sender::Sender`] and the dispatch loop hold a clone of the same
/// table.
#[derive(Clone)]
pub struct PendingResponseTable {
    slots: Arc<Mutex<HashMap<ExchangeId, oneshot::Sender<Packet>>>>,
}

impl PendingResponseTable {
    pub fn new() -> Self {
        PendingResponseTable { slots: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Create a one-shot slot for `exchange_id`. Must be called *before* the
    /// request is transmitted, so a response racing the send is never lost
    /// (`spec.md` §4.5).
    ///
    /// Fails with [`ProdigyError::ExchangeIdCollision`] if `exchange_id` is
    /// already reserved — per spec this is treated as a programming error of
    /// the id generator, not a routine condition.
    pub async fn reserve(
        &self,
        exchange_id: ExchangeId,
    ) -> Result<oneshot::Receiver<Packet>, ProdigyError> {
        let (tx, rx) = oneshot::channel();
        let mut slots = self.slots.lock().await;
        if slots.contains_key(&exchange_id) {
            return Err(ProdigyError::ExchangeIdCollision(exchange_id));
        }
        slots.insert(exchange_id, tx);
        Ok(rx)
    }

    /// Fulfill the slot for `packet.exchange_id` if one is still reserved.
    /// A late response (reservation already cancelled or already delivered)
    /// is silently dropped and logged at debug — this is the expected shape
    /// of a response arriving after its caller timed out.
    pub async fn deliver(&self, packet: Packet) {
        let exchange_id = packet.exchange_id;
        let sender = self.slots.lock().await.remove(&exchange_id);
        match sender {
            Some(tx) => {
                // The receiver may already be gone if the caller's task was
                // cancelled between `reserve` and now; that's fine, there's
                // simply nobody left to deliver to.
                let _ = tx.send(packet);
            }
            None => {
                debug!(%exchange_id, "dropping response for unknown or already-resolved exchange");
            }
        }
    }

    /// Remove a slot without delivering to it. A no-op if the slot is
    /// already gone (already delivered, or cancelled twice).
    pub async fn cancel(&self, exchange_id: ExchangeId) {
        self.slots.lock().await.remove(&exchange_id);
    }

    /// Number of still-pending exchanges. Used by tests asserting no slot
    /// leaks (`spec.md` §8, property 3).
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Suspend until `receiver` is fulfilled or `timeout` elapses. On
    /// timeout the reservation is cancelled before the error is returned, so
    /// a caller never needs to remember to clean up after itself.
    pub async fn await_response(
        &self,
        exchange_id: ExchangeId,
        receiver: oneshot::Receiver<Packet>,
        timeout: Duration,
    ) -> Result<Packet, ProdigyError> {
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(packet)) => Ok(packet),
            Ok(Err(_canceled)) => {
                // The table dropped the sender without delivering — treat
                // the same as an explicit cancellation upstream.
                self.cancel(exchange_id).await;
                Err(ProdigyError::Timeout { exchange_id })
            }
            Err(_elapsed) => {
                self.cancel(exchange_id).await;
                Err(ProdigyError::Timeout { exchange_id })
            }
        }
    }
}

impl Default for PendingResponseTable {
    fn default() -> Self {
        PendingResponseTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketKind;
    use std::time::Duration;

    fn response(id: ExchangeId) -> Packet {
        Packet { exchange_id: id, kind: PacketKind::Response, protocol_name: "P".into(), message_type: "m".into(), payload: vec![] }
    }

    #[tokio::test]
    async fn reserve_then_deliver_resolves_await() {
        let table = PendingResponseTable::new();
        let id = ExchangeId(1);
        let rx = table.reserve(id).await.unwrap();
        table.deliver(response(id)).await;
        let packet = table.await_response(id, rx, Duration::from_secs(1)).await.unwrap();
        assert_eq!(packet.exchange_id, id);
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn reserve_twice_is_a_collision() {
        let table = PendingResponseTable::new();
        let id = ExchangeId(42);
        let _rx = table.reserve(id).await.unwrap();
        let err = table.reserve(id).await;
        assert!(matches!(err, Err(ProdigyError::ExchangeIdCollision(_))));
    }

    #[tokio::test]
    async fn timeout_cancels_and_leaves_no_slot() {
        let table = PendingResponseTable::new();
        let id = ExchangeId(7);
        let rx = table.reserve(id).await.unwrap();
        let result = table.await_response(id, rx, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(ProdigyError::Timeout { .. })));
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn late_delivery_after_cancel_is_dropped() {
        let table = PendingResponseTable::new();
        let id = ExchangeId(9);
        let _rx = table.reserve(id).await.unwrap();
        table.cancel(id).await;
        // Deliver after cancellation: no receiver left, silently dropped.
        table.deliver(response(id)).await;
        assert!(table.is_empty().await);
    }
}
