//! Protocol registry (C4): name -> protocol -> message-type -> handler.

use crate::request::Request;
use crate::sender::Sender;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A user-defined procedure invoked with a [`Request`] view when a matching
/// packet arrives. Handlers run with cooperative-suspension permission and
/// hold the [`Sender`] capability, so they may themselves start further
/// exchanges (`spec.md` §4.8).
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: Request, sender: Sender);
}

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Adapts a plain async closure into a [`Handler`] so the builder DSL (C9)
/// doesn't force authors to write a trait impl for every message type.
struct FnHandler<F>(F);

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(Request, Sender) -> BoxFuture + Send + Sync + 'static,
{
    async fn handle(&self, request: Request, sender: Sender) {
        (self.0)(request, sender).await
    }
}

pub(crate) fn boxed_handler<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Request, Sender) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnHandler(move |req, snd| {
        Box::pin(f(req, snd)) as BoxFuture
    }))
}

/// A named, read-only-after-construction mapping from `message_type` to
/// handler (`spec.md` §3).
pub struct ProtocolDescriptor {
    pub name: String,
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl ProtocolDescriptor {
    pub fn new(name: impl Into<String>, handlers: HashMap<String, Arc<dyn Handler>>) -> Self {
        ProtocolDescriptor { name: name.into(), handlers }
    }

    pub fn handler(&self, message_type: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(message_type).cloned()
    }
}

/// `protocol_name -> protocol descriptor`. Mutations happen only via
/// [`ProtocolRegistry::register`]; reads happen concurrently from the
/// dispatch loop. Re-registering a name overwrites the previous descriptor
/// (last writer wins — re-registration is expected to be idempotent in
/// practice, per `spec.md` §4.3).
#[derive(Clone)]
pub struct ProtocolRegistry {
    protocols: Arc<RwLock<HashMap<String, Arc<ProtocolDescriptor>>>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        ProtocolRegistry { protocols: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub async fn register(&self, descriptor: ProtocolDescriptor) {
        let name = descriptor.name.clone();
        self.protocols.write().await.insert(name, Arc::new(descriptor));
    }

    pub async fn lookup(&self, protocol_name: &str, message_type: &str) -> Option<Arc<dyn Handler>> {
        let protocols = self.protocols.read().await;
        protocols.get(protocol_name)?.handler(message_type)
    }

    pub async fn has_protocol(&self, protocol_name: &str) -> bool {
        self.protocols.read().await.contains_key(protocol_name)
    }
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        ProtocolRegistry::new()
    }
}
