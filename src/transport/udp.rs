//! Reference `NetworkProvider` (C11): a UDP socket with a minimal ack/retransmit
//! layer, so the "reliable-but-unreliable-delivery" transport boundary
//! described in `spec.md` §4.2 has something real to bind against.
//!
//! Framing is a single tag byte ahead of the caller's bytes:
//! - `0x00 || seq:u64 || payload` — a data datagram, acked by the receiver.
//! - `0x01 || seq:u64` — an acknowledgement, consumed internally and never
//!   surfaced to [`NetworkProvider::receive`] callers.
//!
//! Congestion control is an explicit non-goal (`spec.md` §1); `window_size`
//! is carried on [`TransportConfig`] only because the knob is named in §6,
//! it is not enforced here.

use super::NetworkProvider;
use crate::error::ProdigyError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::interval;
use tracing::debug;

const TAG_DATA: u8 = 0x00;
const TAG_ACK: u8 = 0x01;

/// Tunable knobs named in `spec.md` §6. Defaults lie within the documented
/// ranges.
#[derive(Debug, Clone, Copy)]
pub struct TransportConfig {
    /// Retransmission timeout, default ≈ 15,000 ms.
    pub retransmit_timeout: Duration,
    /// Flow-control tick interval, default ≈ 100 ms.
    pub flow_control_interval: Duration,
    /// Advisory window size in bytes, default ≈ 1,400. Not enforced —
    /// congestion control is out of scope.
    pub window_size: usize,
    /// Number of retransmissions attempted before a send is abandoned and
    /// logged as dropped.
    pub max_retries: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            retransmit_timeout: Duration::from_millis(15_000),
            flow_control_interval: Duration::from_millis(100),
            window_size: 1_400,
            max_retries: 5,
        }
    }
}

struct PendingSend {
    frame: Vec<u8>,
    recipient: SocketAddr,
    sent_at: Instant,
    attempts: u32,
}

/// UDP-backed [`NetworkProvider`] with best-effort retransmission.
pub struct UdpNetworkProvider {
    config: TransportConfig,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    next_seq: AtomicU64,
    pending: Mutex<HashMap<u64, PendingSend>>,
}

impl UdpNetworkProvider {
    pub fn new(config: TransportConfig) -> Self {
        UdpNetworkProvider {
            config,
            socket: Mutex::new(None),
            next_seq: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    async fn socket(&self) -> Result<Arc<UdpSocket>, ProdigyError> {
        self.socket
            .lock()
            .await
            .clone()
            .ok_or_else(|| ProdigyError::InvalidState("bind() must be called before use"))
    }
}

impl Default for UdpNetworkProvider {
    fn default() -> Self {
        UdpNetworkProvider::new(TransportConfig::default())
    }
}

#[async_trait]
impl NetworkProvider for UdpNetworkProvider {
    async fn bind(&self, address: SocketAddr) -> Result<(), ProdigyError> {
        let mut guard = self.socket.lock().await;
        if guard.is_some() {
            return Err(ProdigyError::InvalidState("bind() called twice"));
        }
        let socket = UdpSocket::bind(address)
            .await
            .map_err(ProdigyError::transport)?;
        *guard = Some(Arc::new(socket));
        Ok(())
    }

    async fn send(&self, bytes: &[u8], recipient: SocketAddr) -> Result<(), ProdigyError> {
        let socket = self.socket().await?;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        let mut frame = Vec::with_capacity(bytes.len() + 9);
        frame.push(TAG_DATA);
        frame.extend_from_slice(&seq.to_be_bytes());
        frame.extend_from_slice(bytes);

        socket
            .send_to(&frame, recipient)
            .await
            .map_err(ProdigyError::transport)?;

        self.pending.lock().await.insert(
            seq,
            PendingSend { frame, recipient, sent_at: Instant::now(), attempts: 1 },
        );
        Ok(())
    }

    async fn receive(&self) -> Result<(Vec<u8>, SocketAddr), ProdigyError> {
        let socket = self.socket().await?;
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let (len, sender) = socket.recv_from(&mut buf).await.map_err(ProdigyError::transport)?;
            let datagram = &buf[..len];
            if datagram.is_empty() {
                continue;
            }

            match datagram[0] {
                TAG_ACK if datagram.len() >= 9 => {
                    let seq = u64::from_be_bytes(datagram[1..9].try_into().unwrap());
                    self.pending.lock().await.remove(&seq);
                }
                TAG_DATA if datagram.len() >= 9 => {
                    let seq = u64::from_be_bytes(datagram[1..9].try_into().unwrap());
                    let mut ack = Vec::with_capacity(9);
                    ack.push(TAG_ACK);
                    ack.extend_from_slice(&seq.to_be_bytes());
                    let _ = socket.send_to(&ack, sender).await;
                    return Ok((datagram[9..].to_vec(), sender));
                }
                _ => {
                    debug!(from = %sender, "dropping malformed transport frame");
                }
            }
        }
    }

    async fn run(&self) -> Result<(), ProdigyError> {
        let socket = self.socket().await?;
        let mut ticker = interval(self.config.flow_control_interval);
        loop {
            ticker.tick().await;
            let mut pending = self.pending.lock().await;
            let now = Instant::now();
            let mut drop_seqs = Vec::new();
            for (seq, entry) in pending.iter_mut() {
                if now.duration_since(entry.sent_at) < self.config.retransmit_timeout {
                    continue;
                }
                if entry.attempts >= self.config.max_retries {
                    drop_seqs.push(*seq);
                    continue;
                }
                entry.attempts += 1;
                entry.sent_at = now;
                let _ = socket.send_to(&entry.frame, entry.recipient).await;
            }
            for seq in drop_seqs {
                debug!(seq, "abandoning datagram after max retries");
                pending.remove(&seq);
            }
        }
    }

    async fn close(&self) {
        let mut guard = self.socket.lock().await;
        if guard.take().is_some() {
            self.pending.lock().await.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_and_receive_round_trip() {
        let a = UdpNetworkProvider::default();
        let b = UdpNetworkProvider::default();
        a.bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        b.bind("127.0.0.1:0".parse().unwrap()).await.unwrap();

        let a_addr = a.socket().await.unwrap().local_addr().unwrap();
        let b_addr = b.socket().await.unwrap().local_addr().unwrap();

        a.send(b"hello", b_addr).await.unwrap();
        let (bytes, from) = b.receive().await.unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(from, a_addr);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let provider = UdpNetworkProvider::default();
        provider.bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        provider.close().await;
        provider.close().await;
    }

    #[tokio::test]
    async fn use_before_bind_is_invalid_state() {
        let provider = UdpNetworkProvider::default();
        let err = provider.send(b"x", "127.0.0.1:1".parse().unwrap()).await;
        assert!(matches!(err, Err(ProdigyError::InvalidState(_))));
    }
}
