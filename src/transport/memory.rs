//! Loopback `NetworkProvider` (C12) used by the test suite and by doc
//! examples: routes datagrams between bound endpoints through channels
//! instead of a real socket, so dispatch-engine behavior can be exercised
//! fast and deterministically.

use super::NetworkProvider;
use crate::error::ProdigyError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

type Datagram = (Vec<u8>, SocketAddr);

/// Shared registry of bound endpoints. Every [`InMemoryNetworkProvider`]
/// created from the same hub can reach every other one bound on it, the
/// way two processes on the same host can reach each other via UDP.
#[derive(Clone, Default)]
pub struct InMemoryHub {
    endpoints: Arc<Mutex<HashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>>>,
}

impl InMemoryHub {
    pub fn new() -> Self {
        InMemoryHub::default()
    }

    pub fn provider(&self) -> InMemoryNetworkProvider {
        InMemoryNetworkProvider {
            hub: self.clone(),
            bound_addr: Mutex::new(None),
            inbox: Mutex::new(None),
        }
    }
}

/// In-memory [`NetworkProvider`]. `run` is a no-op forever-pending future:
/// there is no internal I/O progress to drive when delivery is immediate.
pub struct InMemoryNetworkProvider {
    hub: InMemoryHub,
    bound_addr: Mutex<Option<SocketAddr>>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<Datagram>>>,
}

#[async_trait]
impl NetworkProvider for InMemoryNetworkProvider {
    async fn bind(&self, address: SocketAddr) -> Result<(), ProdigyError> {
        let mut bound = self.bound_addr.lock().await;
        if bound.is_some() {
            return Err(ProdigyError::InvalidState("bind() called twice"));
        }
        let mut endpoints = self.hub.endpoints.lock().await;
        if endpoints.contains_key(&address) {
            return Err(ProdigyError::transport(format!("address {address} already bound")));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        endpoints.insert(address, tx);
        *bound = Some(address);
        *self.inbox.lock().await = Some(rx);
        Ok(())
    }

    async fn send(&self, bytes: &[u8], recipient: SocketAddr) -> Result<(), ProdigyError> {
        let sender_addr = self
            .bound_addr
            .lock()
            .await
            .ok_or(ProdigyError::InvalidState("bind() must be called before use"))?;
        let endpoints = self.hub.endpoints.lock().await;
        match endpoints.get(&recipient) {
            Some(tx) => tx
                .send((bytes.to_vec(), sender_addr))
                .map_err(|_| ProdigyError::transport(format!("peer {recipient} is gone"))),
            None => {
                // Matches real UDP: sending to an address nobody is
                // listening on is not an error at the transport level.
                Ok(())
            }
        }
    }

    async fn receive(&self) -> Result<(Vec<u8>, SocketAddr), ProdigyError> {
        let mut guard = self.inbox.lock().await;
        let rx = guard
            .as_mut()
            .ok_or(ProdigyError::InvalidState("bind() must be called before use"))?;
        rx.recv()
            .await
            .ok_or_else(|| ProdigyError::transport("endpoint closed"))
    }

    async fn run(&self) -> Result<(), ProdigyError> {
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn close(&self) {
        if let Some(addr) = self.bound_addr.lock().await.take() {
            self.hub.endpoints.lock().await.remove(&addr);
            *self.inbox.lock().await = None;
        }
    }
}
