//! Protocol builder (C9): the declarative authoring surface for handlers
//! (`spec.md` §4.8).

use crate::registry::{boxed_handler, Handler, ProtocolDescriptor};
use crate::request::Request;
use crate::sender::Sender;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Builds a [`ProtocolDescriptor`] one `(message_type, handler)` pair at a
/// time. Each handler body is a procedure with cooperative-suspension
/// permission that receives a [`Request`] view and the [`Sender`]
/// capability, so it may itself start follow-up exchanges.
///
/// ```
/// use prodigy::ProtocolBuilder;
///
/// let protocol = ProtocolBuilder::new("chat")
///     .on("ping", |request, sender| async move {
///         let _ = request.respond(Some(())).await;
///         let _ = sender; // handlers may also use `sender` to fan out
///     })
///     .build();
/// assert_eq!(protocol.name, "chat");
/// ```
pub struct ProtocolBuilder {
    name: String,
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl ProtocolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ProtocolBuilder { name: name.into(), handlers: HashMap::new() }
    }

    /// Register the handler for `message_type`. Registering the same
    /// `message_type` twice on the same builder overwrites the previous
    /// handler, mirroring the registry's own last-writer-wins semantics.
    pub fn on<F, Fut>(mut self, message_type: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Request, Sender) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handlers.insert(message_type.into(), boxed_handler(handler));
        self
    }

    pub fn build(self) -> ProtocolDescriptor {
        ProtocolDescriptor::new(self.name, self.handlers)
    }
}
