//! NetworkProvider interface (C3): the datagram-endpoint capability the
//! dispatch engine is built against (`spec.md` §4.2). The core never
//! downcasts to a concrete transport — [`crate::runner::ProtocolRunner`] is
//! generic over any `P: NetworkProvider`.

pub mod memory;
pub mod udp;

use crate::error::ProdigyError;
use async_trait::async_trait;
use std::net::SocketAddr;

pub use memory::{InMemoryHub, InMemoryNetworkProvider};
pub use udp::UdpNetworkProvider;

/// Capability set exposed to the core (`spec.md` §4.2).
///
/// `send`/`receive`/`run` are all suspension points: any task calling them
/// may yield control to the scheduler. `send` may be called concurrently
/// from any task (handler tasks, `exchange` callers, and the dispatch loop
/// itself); implementations are responsible for internal serialization.
#[async_trait]
pub trait NetworkProvider: Send + Sync {
    /// Claim a local endpoint. Fails with a transport error if the address
    /// is unusable (already bound, permission denied, ...).
    async fn bind(&self, address: SocketAddr) -> Result<(), ProdigyError>;

    /// Hand a datagram to the transport. Suspends until the transport
    /// accepts the datagram, not until the peer acknowledges it (beyond
    /// whatever the transport internally enforces).
    async fn send(&self, bytes: &[u8], recipient: SocketAddr) -> Result<(), ProdigyError>;

    /// Produce the next inbound datagram. Suspends until one arrives.
    async fn receive(&self) -> Result<(Vec<u8>, SocketAddr), ProdigyError>;

    /// Drive internal I/O progress (retransmission timers, flow control,
    /// ...). Cooperative: runs until cancelled by the caller.
    async fn run(&self) -> Result<(), ProdigyError>;

    /// Release resources. Idempotent — a second call is a no-op.
    async fn close(&self);
}
