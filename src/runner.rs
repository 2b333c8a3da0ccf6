//! Dispatch loop and `ProtocolRunner` state machine (C8), `spec.md` §4.7.

use crate::codec::Codec;
use crate::config::RunnerConfig;
use crate::error::ProdigyError;
use crate::packet::PacketKind;
use crate::pending::PendingResponseTable;
use crate::registry::{ProtocolDescriptor, ProtocolRegistry};
use crate::request::Request;
use crate::sender::Sender;
use crate::transport::NetworkProvider;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunnerState {
    New,
    Bound,
    Running,
    Closed,
}

impl RunnerState {
    fn name(self) -> &'static str {
        match self {
            RunnerState::New => "New",
            RunnerState::Bound => "Bound",
            RunnerState::Running => "Running",
            RunnerState::Closed => "Closed",
        }
    }
}

/// Drives a single bound endpoint: owns the [`NetworkProvider`] and the
/// [`PendingResponseTable`] exclusively; handler tasks and `exchange`
/// callers only ever touch these through the [`Sender`]/[`Request`]
/// capabilities the runner hands out.
///
/// State machine: `New --bind()--> Bound --run()--> Running --close()-->
/// Closed`. Transitions attempted out of order fail with
/// [`ProdigyError::InvalidState`]; `close()` is the one exception — it is
/// idempotent and safe to call from any state.
pub struct ProtocolRunner<P: NetworkProvider + 'static> {
    transport: Arc<P>,
    codec: Arc<dyn Codec>,
    registry: ProtocolRegistry,
    pending: PendingResponseTable,
    config: RunnerConfig,
    state: Mutex<RunnerState>,
    shutdown: CancellationToken,
}

impl<P: NetworkProvider + 'static> ProtocolRunner<P> {
    pub fn new(transport: P, codec: impl Codec + 'static, config: RunnerConfig) -> Arc<Self> {
        Arc::new(ProtocolRunner {
            transport: Arc::new(transport),
            codec: Arc::new(codec),
            registry: ProtocolRegistry::new(),
            pending: PendingResponseTable::new(),
            config,
            state: Mutex::new(RunnerState::New),
            shutdown: CancellationToken::new(),
        })
    }

    /// Insert `protocol` under its name. Safe to call before or after
    /// `run()` — the registry is safe for concurrent reads and writes
    /// (`spec.md` §4.3).
    pub async fn register_protocol(&self, protocol: ProtocolDescriptor) {
        self.registry.register(protocol).await;
    }

    /// A [`Sender`] sharing this runner's transport, codec, and
    /// pending-response table. Cheap to create; handlers are handed their
    /// own clone when dispatched.
    pub fn sender(&self) -> Sender {
        Sender::new(
            self.transport.clone(),
            self.codec.clone(),
            self.pending.clone(),
            self.config.default_exchange_timeout,
        )
    }

    /// Number of exchanges currently awaiting a response on this runner.
    pub async fn pending_count(&self) -> usize {
        self.pending.len().await
    }

    /// Claim `address` on the underlying transport. `New -> Bound`.
    pub async fn bind(&self, address: SocketAddr) -> Result<(), ProdigyError> {
        self.advance(RunnerState::New, RunnerState::Bound).await?;
        self.transport.bind(address).await
    }

    /// Start the dispatch loop. `Bound -> Running`. Suspends until `close()`
    /// is called (from any task holding this runner) or the transport's
    /// `receive()` fails unrecoverably.
    ///
    /// Each iteration: decode the datagram, deliver it if it's a response,
    /// otherwise look up the protocol and message-type handler and *spawn*
    /// a fresh task to run it. Spawning is mandatory (`spec.md` §9): an
    /// inline handler invocation that itself calls `exchange` on the same
    /// runner would block the one loop that could ever deliver its
    /// response, deadlocking forever.
    pub async fn run(self: &Arc<Self>) -> Result<(), ProdigyError> {
        self.advance(RunnerState::Bound, RunnerState::Running).await?;

        let transport_driver = {
            let transport = self.transport.clone();
            tokio::spawn(async move {
                if let Err(e) = transport.run().await {
                    warn!("transport run() ended: {e}");
                }
            })
        };

        // `shutdown.cancelled()` is level-triggered: once `close()` calls
        // `cancel()`, every subsequent (and any already in-flight) call to
        // `cancelled()` resolves immediately. That matters here because
        // `close()` can race with a loop iteration that's off in
        // `dispatch_datagram` rather than parked in this `select!` — a
        // `Notify`-based signal would be lost in that window since
        // `notify_waiters()` only wakes tasks already registered as
        // waiting, leaving the loop to call `receive()` again against a
        // transport `close()` has already torn down.
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                received = self.transport.receive() => {
                    match received {
                        Ok((bytes, from)) => self.dispatch_datagram(bytes, from).await,
                        Err(e) => warn!("receive() failed: {e}"),
                    }
                }
            }
        }

        transport_driver.abort();
        Ok(())
    }

    async fn dispatch_datagram(self: &Arc<Self>, bytes: Vec<u8>, from: SocketAddr) {
        let packet = match self.codec.decode_packet(&bytes) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(%from, "dropping malformed packet: {e}");
                return;
            }
        };

        match packet.kind {
            PacketKind::Response => {
                self.pending.deliver(packet).await;
            }
            PacketKind::Request => {
                let handler = match self
                    .registry
                    .lookup(&packet.protocol_name, &packet.message_type)
                    .await
                {
                    Some(handler) => handler,
                    None => {
                        debug!(
                            protocol = %packet.protocol_name,
                            message_type = %packet.message_type,
                            %from,
                            "no handler registered, dropping request"
                        );
                        return;
                    }
                };

                let request = Request::new(
                    from,
                    packet.payload,
                    packet.exchange_id,
                    packet.message_type,
                    packet.protocol_name,
                    self.transport.clone(),
                    self.codec.clone(),
                );
                let sender = self.sender();

                // Spawned so the loop is never blocked by user code; a
                // handler panic is isolated to its own task and does not
                // affect the dispatch loop or other handlers.
                tokio::spawn(async move {
                    handler.handle(request, sender).await;
                });
            }
        }
    }

    /// Stop accepting new datagrams and release the transport. Idempotent —
    /// calling `close()` a second time (from any state) is a no-op.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if *state == RunnerState::Closed {
            return;
        }
        let was_running = *state == RunnerState::Running;
        *state = RunnerState::Closed;
        drop(state);

        if was_running {
            self.shutdown.cancel();
        }
        self.transport.close().await;
    }

    async fn advance(&self, expected: RunnerState, next: RunnerState) -> Result<(), ProdigyError> {
        let mut state = self.state.lock().await;
        if *state != expected {
            return Err(ProdigyError::InvalidState(match (expected, next) {
                (RunnerState::New, RunnerState::Bound) => "bind() requires state New",
                (RunnerState::Bound, RunnerState::Running) => "run() requires state Bound",
                _ => "unexpected state transition",
            }));
        }
        debug!(from = expected.name(), to = next.name(), "runner state transition");
        *state = next;
        Ok(())
    }
}
