//! End-to-end dispatch-engine behavior over the in-memory transport:
//! correlation, timeout isolation, fan-out without slot leaks, dropped
//! requests with no registered handler, and double-respond rejection.

use prodigy::codec::PostcardCodec;
use prodigy::transport::InMemoryHub;
use prodigy::{ProdigyError, ProtocolBuilder, ProtocolRunner, RunnerConfig};
use std::net::SocketAddr;
use std::time::Duration;

fn addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{port}").parse().unwrap()
}

async fn spawn_runner(
    hub: &InMemoryHub,
    port: u16,
) -> std::sync::Arc<ProtocolRunner<prodigy::transport::InMemoryNetworkProvider>> {
    let runner = ProtocolRunner::new(hub.provider(), PostcardCodec, RunnerConfig::default());
    runner.bind(addr(port)).await.unwrap();
    let driven = runner.clone();
    tokio::spawn(async move {
        let _ = driven.run().await;
    });
    runner
}

#[tokio::test]
async fn exchange_correlates_request_with_its_response() {
    let hub = InMemoryHub::new();
    let client = spawn_runner(&hub, 20001).await;
    let server = spawn_runner(&hub, 20002).await;

    let protocol = ProtocolBuilder::new("echo")
        .on("ping", |request, _sender| async move {
            let body: String = request.get_payload_as().unwrap_or_default();
            let _ = request.respond(Some(format!("{body}-pong"))).await;
        })
        .build();
    server.register_protocol(protocol).await;

    let reply: String = client
        .sender()
        .exchange("echo", "ping", addr(20002), Some("hello".to_string()), None)
        .await
        .unwrap();
    assert_eq!(reply, "hello-pong");
}

#[tokio::test]
async fn exchange_against_an_unreachable_peer_times_out_and_frees_its_slot() {
    let hub = InMemoryHub::new();
    let client = spawn_runner(&hub, 20011).await;

    let result: Result<String, ProdigyError> = client
        .sender()
        .exchange("echo", "ping", addr(20099), Some("hi".to_string()), Some(Duration::from_millis(50)))
        .await;

    assert!(matches!(result, Err(ProdigyError::Timeout { .. })));
    assert_eq!(client.pending_count().await, 0);
}

#[tokio::test]
async fn one_slow_exchange_does_not_block_or_corrupt_a_concurrent_one() {
    let hub = InMemoryHub::new();
    let client = spawn_runner(&hub, 20021).await;
    let server = spawn_runner(&hub, 20022).await;

    let protocol = ProtocolBuilder::new("svc")
        .on("slow", |request, _sender| async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = request.respond(Some("slow-done".to_string())).await;
        })
        .on("fast", |request, _sender| async move {
            let _ = request.respond(Some("fast-done".to_string())).await;
        })
        .build();
    server.register_protocol(protocol).await;

    let sender = client.sender();
    let slow = {
        let sender = sender.clone();
        tokio::spawn(async move {
            sender.exchange::<(), String>("svc", "slow", addr(20022), None, None).await
        })
    };
    let fast: String = sender.exchange::<(), String>("svc", "fast", addr(20022), None, None).await.unwrap();
    assert_eq!(fast, "fast-done");

    let slow_result = slow.await.unwrap().unwrap();
    assert_eq!(slow_result, "slow-done");
}

#[tokio::test]
async fn fan_out_of_concurrent_exchanges_leaves_no_pending_slots() {
    let hub = InMemoryHub::new();
    let client = spawn_runner(&hub, 20031).await;
    let server = spawn_runner(&hub, 20032).await;

    let protocol = ProtocolBuilder::new("svc")
        .on("double", |request, _sender| async move {
            let n: u32 = request.get_payload_as().unwrap_or(0);
            let _ = request.respond(Some(n * 2)).await;
        })
        .build();
    server.register_protocol(protocol).await;

    let sender = client.sender();
    let mut tasks = Vec::new();
    for n in 0..32u32 {
        let sender = sender.clone();
        tasks.push(tokio::spawn(async move {
            sender.exchange::<u32, u32>("svc", "double", addr(20032), Some(n), None).await
        }));
    }

    for (n, task) in tasks.into_iter().enumerate() {
        let result = task.await.unwrap().unwrap();
        assert_eq!(result, n as u32 * 2);
    }
    assert_eq!(client.pending_count().await, 0);
}

#[tokio::test]
async fn a_request_for_an_unregistered_message_type_is_dropped_without_crashing() {
    let hub = InMemoryHub::new();
    let client = spawn_runner(&hub, 20041).await;
    let server = spawn_runner(&hub, 20042).await;

    server.register_protocol(ProtocolBuilder::new("svc").build()).await;

    let result: Result<(), ProdigyError> = client
        .sender()
        .exchange("svc", "nonexistent", addr(20042), Some(()), Some(Duration::from_millis(50)))
        .await;
    assert!(matches!(result, Err(ProdigyError::Timeout { .. })));

    // The server is still alive and able to handle a subsequent, valid exchange.
    server
        .register_protocol(
            ProtocolBuilder::new("svc")
                .on("ping", |request, _sender| async move {
                    let _ = request.respond(Some(())).await;
                })
                .build(),
        )
        .await;
    let ok: Result<(), ProdigyError> = client.sender().exchange("svc", "ping", addr(20042), Some(()), None).await;
    assert!(ok.is_ok());
}

#[tokio::test]
async fn responding_to_the_same_request_twice_fails_the_second_time() {
    let hub = InMemoryHub::new();
    let client = spawn_runner(&hub, 20051).await;
    let server = spawn_runner(&hub, 20052).await;

    let (report_tx, mut report_rx) = tokio::sync::mpsc::unbounded_channel();
    let protocol = ProtocolBuilder::new("svc")
        .on("double-respond", move |request, _sender| {
            let report_tx = report_tx.clone();
            async move {
                let first = request.respond(Some(1u8)).await;
                let second = request.respond(Some(2u8)).await;
                let _ = report_tx.send((first.is_ok(), second));
            }
        })
        .build();
    server.register_protocol(protocol).await;

    let _: u8 = client
        .sender()
        .exchange("svc", "double-respond", addr(20052), Some(()), None)
        .await
        .unwrap();

    let (first_ok, second) = report_rx.recv().await.unwrap();
    assert!(first_ok);
    assert!(matches!(second, Err(ProdigyError::AlreadyResponded { .. })));
}

#[tokio::test]
async fn a_handler_may_itself_start_an_exchange_without_deadlocking() {
    // Exercises the mandatory spawn-per-request rule: if dispatch ran
    // handlers inline, this handler's own `exchange` call back to the same
    // runner's dispatch loop would deadlock forever.
    let hub = InMemoryHub::new();
    let a = spawn_runner(&hub, 20061).await;
    let b = spawn_runner(&hub, 20062).await;

    let protocol_b = ProtocolBuilder::new("relay")
        .on("ask-a", move |request, sender| async move {
            let reply: String = sender
                .exchange("relay", "inner", addr(20061), Some(()), None)
                .await
                .unwrap_or_default();
            let _ = request.respond(Some(reply)).await;
        })
        .build();
    b.register_protocol(protocol_b).await;

    let protocol_a = ProtocolBuilder::new("relay")
        .on("inner", |request, _sender| async move {
            let _ = request.respond(Some("from-a".to_string())).await;
        })
        .build();
    a.register_protocol(protocol_a).await;

    let reply: String = a.sender().exchange("relay", "ask-a", addr(20062), Some(()), None).await.unwrap();
    assert_eq!(reply, "from-a");
}

#[tokio::test]
async fn closing_a_runner_twice_is_a_no_op() {
    let hub = InMemoryHub::new();
    let runner = spawn_runner(&hub, 20071).await;
    runner.close().await;
    runner.close().await;
}

#[tokio::test]
async fn close_before_bind_completes_is_also_a_no_op() {
    let runner = ProtocolRunner::new(InMemoryHub::new().provider(), PostcardCodec, RunnerConfig::default());
    runner.close().await;
    runner.close().await;
}

#[tokio::test]
async fn run_returns_on_its_own_after_close_without_being_aborted() {
    // Regression test for a shutdown race: `close()` can be called at any
    // point relative to `run()`'s loop, including while the loop is busy
    // off in `dispatch_datagram` rather than parked in its `select!`.
    // `run()`'s `JoinHandle` must resolve on its own — nobody should need to
    // `.abort()` it — which only holds for a level-triggered cancellation
    // signal (`cancel()`/`cancelled()`), not an edge-triggered one
    // (`Notify::notify_waiters`, which is lost if nothing is registered as
    // waiting at the moment it fires).
    let hub = InMemoryHub::new();
    let runner = ProtocolRunner::new(hub.provider(), PostcardCodec, RunnerConfig::default());
    runner.bind(addr(20072)).await.unwrap();

    let protocol = ProtocolBuilder::new("svc")
        .on("slow", |_request, _sender| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
        })
        .build();
    runner.register_protocol(protocol).await;

    let run_handle = {
        let runner = runner.clone();
        tokio::spawn(async move { runner.run().await })
    };

    let _ = runner.sender().send::<()>("svc", "slow", addr(20072), None).await;
    runner.close().await;

    let result = tokio::time::timeout(Duration::from_secs(1), run_handle)
        .await
        .expect("run() did not return after close() — shutdown signal was lost");
    assert!(result.unwrap().is_ok());
}
