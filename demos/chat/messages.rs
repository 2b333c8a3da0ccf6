//! Wire payloads for the chat demo protocol (`spec.md` §8, scenario S6).
//!
//! This is an embedding application, not part of the core — it exists to
//! exercise [`prodigy::ProtocolBuilder`] against a realistic multi-party
//! exchange pattern.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskToJoin {
    pub nickname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomRoster {
    pub members: Vec<SocketAddr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announce {
    pub member: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub from: SocketAddr,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivered;
