//! Interactive chat demo over `prodigy`, exercising the join/leave/message
//! flow described in `spec.md` §8 scenario S6.
//!
//! Start the first peer without `--host`; it becomes the room's rendezvous
//! point. Every subsequent peer joins by pointing `--host` at any existing
//! member's address.

mod messages;
mod room;

use clap::Parser;
use prodigy::codec::PostcardCodec;
use prodigy::transport::UdpNetworkProvider;
use prodigy::{ProtocolRunner, RunnerConfig};
use room::RoomState;
use std::net::SocketAddr;
use std::io::Write as _;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Prodigy chat demo")]
struct Args {
    /// Address this peer binds to.
    #[arg(long)]
    listen: SocketAddr,

    /// Address of an existing member, if joining an established room.
    #[arg(long)]
    host: Option<SocketAddr>,

    /// Nickname announced on `ask_to_join`.
    #[arg(long, default_value = "anonymous")]
    nickname: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("prodigy=info".parse().unwrap()))
        .init();

    let args = Args::parse();

    let transport = UdpNetworkProvider::default();
    let runner = ProtocolRunner::new(transport, PostcardCodec, RunnerConfig::default());
    runner.bind(args.listen).await.expect("bind failed");

    let room = RoomState::new(args.listen);
    runner.register_protocol(room.protocol()).await;

    let runner_for_loop = runner.clone();
    let dispatch_task = tokio::spawn(async move {
        let _ = runner_for_loop.run().await;
    });

    if let Some(host) = args.host {
        let sender = runner.sender();
        if let Err(e) = room.ask_to_join(&sender, host, args.nickname.clone()).await {
            tracing::error!("failed to join room via {host}: {e}");
        } else {
            tracing::info!(%host, "joined room");
        }
    } else {
        tracing::info!("starting a new room as the first member");
    }

    println!("listening on {} — type a message and press enter, or /quit to leave", args.listen);

    let sender = runner.sender();
    let stdin = tokio::io::stdin();
    let mut lines = tokio::io::BufReader::new(stdin);
    let mut line = String::new();
    use tokio::io::AsyncBufReadExt;

    loop {
        line.clear();
        tokio::select! {
            read = lines.read_line(&mut line) => {
                match read {
                    Ok(0) => break,
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        if trimmed == "/quit" {
                            break;
                        }
                        room.broadcast_message(&sender, trimmed.to_string()).await;
                    }
                    Err(e) => {
                        tracing::error!("stdin read failed: {e}");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
        let _ = std::io::stdout().flush();
    }

    room.leave(&sender).await;
    runner.close().await;
    dispatch_task.abort();
}
