//! Prodigy: a peer-to-peer protocol dispatch engine.
//!
//! Application authors declare *protocols* — named bundles of typed message
//! handlers — and drive them over a datagram transport. Peers exchange
//! self-describing packets: some are fire-and-forget, others follow a
//! request/response exchange. A single bound endpoint multiplexes many
//! concurrent exchanges and dispatches inbound packets to the right
//! handler.
//!
//! The transport ([`transport::NetworkProvider`]) and wire codec
//! ([`codec::Codec`]) are pluggable capabilities; [`transport::UdpNetworkProvider`]
//! and [`codec::PostcardCodec`] are the reference implementations this crate
//! ships.
//!
//! ```
//! use prodigy::{ProtocolBuilder, ProtocolRunner, RunnerConfig};
//! use prodigy::codec::PostcardCodec;
//! use prodigy::transport::InMemoryHub;
//!
//! # async fn doc() {
//! let hub = InMemoryHub::new();
//! let runner = ProtocolRunner::new(hub.provider(), PostcardCodec, RunnerConfig::default());
//!
//! let protocol = ProtocolBuilder::new("chat")
//!     .on("echo", |request, _sender| async move {
//!         let body: Vec<u8> = request.get_payload_as().unwrap_or_default();
//!         let _ = request.respond(Some(body)).await;
//!     })
//!     .build();
//! runner.register_protocol(protocol).await;
//! # }
//! ```

pub mod builder;
pub mod codec;
pub mod config;
pub mod error;
pub mod packet;
pub mod pending;
pub mod registry;
pub mod request;
pub mod runner;
pub mod sender;
pub mod transport;

pub use builder::ProtocolBuilder;
pub use codec::{Codec, PostcardCodec};
pub use config::RunnerConfig;
pub use error::{ProdigyError, Result};
pub use packet::{ExchangeId, Packet, PacketKind};
pub use pending::PendingResponseTable;
pub use registry::{Handler, ProtocolDescriptor, ProtocolRegistry};
pub use request::Request;
pub use runner::ProtocolRunner;
pub use sender::{Sender, DEFAULT_EXCHANGE_TIMEOUT};
pub use transport::{InMemoryHub, InMemoryNetworkProvider, NetworkProvider, UdpNetworkProvider};
