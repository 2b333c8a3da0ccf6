//! Room membership and the handlers that back it — a small embedding
//! application built purely on [`prodigy::ProtocolBuilder`], demonstrating
//! `spec.md` §8 scenario S6 (ask-to-join / join / message / leave).

use crate::messages::{Announce, AskToJoin, ChatMessage, Delivered, RoomRoster};
use prodigy::{ProtocolBuilder, ProtocolDescriptor, Request, Sender};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Clone)]
pub struct RoomState {
    pub self_addr: SocketAddr,
    pub members: Arc<Mutex<HashSet<SocketAddr>>>,
    pub log: Arc<Mutex<Vec<ChatMessage>>>,
}

impl RoomState {
    pub fn new(self_addr: SocketAddr) -> Self {
        RoomState { self_addr, members: Arc::new(Mutex::new(HashSet::new())), log: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Snapshot of every member this peer currently believes is in the
    /// room, including itself.
    pub async fn roster(&self) -> Vec<SocketAddr> {
        let mut members: Vec<SocketAddr> = self.members.lock().await.iter().copied().collect();
        members.push(self.self_addr);
        members
    }

    pub async fn ask_to_join(&self, sender: &Sender, host: SocketAddr, nickname: String) -> prodigy::Result<()> {
        let roster: RoomRoster = sender
            .exchange("chat", "ask_to_join", host, Some(AskToJoin { nickname }), None)
            .await?;
        let mut members = self.members.lock().await;
        for member in &roster.members {
            if *member != self.self_addr {
                members.insert(*member);
            }
        }
        let announce_to: Vec<SocketAddr> = members.iter().copied().collect();
        drop(members);

        for peer in announce_to {
            let _ = sender
                .send::<Announce>("chat", "join", peer, Some(Announce { member: self.self_addr }))
                .await;
        }
        Ok(())
    }

    pub async fn leave(&self, sender: &Sender) {
        let members: Vec<SocketAddr> = self.members.lock().await.iter().copied().collect();
        for peer in members {
            let _ = sender
                .send::<Announce>("chat", "leave", peer, Some(Announce { member: self.self_addr }))
                .await;
        }
    }

    pub async fn broadcast_message(&self, sender: &Sender, body: String) {
        let members: Vec<SocketAddr> = self.members.lock().await.iter().copied().collect();
        for peer in members {
            let outcome: prodigy::Result<Delivered> = sender
                .exchange(
                    "chat",
                    "message",
                    peer,
                    Some(ChatMessage { from: self.self_addr, body: body.clone() }),
                    None,
                )
                .await;
            if let Err(e) = outcome {
                tracing::warn!(%peer, "message delivery failed: {e}");
            }
        }
    }

    pub fn protocol(&self) -> ProtocolDescriptor {
        let join_state = self.clone();
        let announce_join_state = self.clone();
        let announce_leave_state = self.clone();
        let message_state = self.clone();

        ProtocolBuilder::new("chat")
            .on("ask_to_join", move |request: Request, _sender: Sender| {
                let state = join_state.clone();
                async move {
                    let req: AskToJoin = match request.get_payload_as() {
                        Ok(req) => req,
                        Err(_) => return,
                    };
                    info!(from = %request.sender(), nickname = %req.nickname, "ask_to_join");
                    let roster = state.roster().await;
                    state.members.lock().await.insert(request.sender());
                    let _ = request.respond(Some(RoomRoster { members: roster })).await;
                }
            })
            .on("join", move |request: Request, _sender: Sender| {
                let state = announce_join_state.clone();
                async move {
                    if let Ok(announce) = request.get_payload_as::<Announce>() {
                        state.members.lock().await.insert(announce.member);
                    }
                }
            })
            .on("leave", move |request: Request, _sender: Sender| {
                let state = announce_leave_state.clone();
                async move {
                    if let Ok(announce) = request.get_payload_as::<Announce>() {
                        state.members.lock().await.remove(&announce.member);
                    }
                }
            })
            .on("message", move |request: Request, _sender: Sender| {
                let state = message_state.clone();
                async move {
                    if let Ok(message) = request.get_payload_as::<ChatMessage>() {
                        info!(from = %message.from, body = %message.body, "message received");
                        state.log.lock().await.push(message);
                    }
                    let _ = request.respond(Some(Delivered)).await;
                }
            })
            .build()
    }
}
