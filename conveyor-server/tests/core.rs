//! Lifecycle, registry and ordering behavior.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use conveyor_server::{
    action, ActionFn, CancellationToken, ConveyorConfig, Message, Options, PeriodicTask, Registry,
    ServerError, ServerHandler, ServerState,
};
use tokio::{sync::mpsc, time::timeout};

#[derive(Debug, Clone)]
struct Num(u64);

impl Message for Num {
    type Reply = u64;
}

/// Action that reports every processed payload on `seen` and replies with
/// the payload plus one, after an optional delay.
fn recording_action(seen: mpsc::UnboundedSender<u64>, delay: Duration) -> ActionFn<Num> {
    action(move |_token, Num(value), _slot| {
        let seen = seen.clone();
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            seen.send(value).ok();
            Ok(value + 1)
        }
    })
}

#[tokio::test]
async fn generated_name_when_omitted() {
    let registry: Registry<Num> = Registry::default();
    let server = registry
        .register(None, None, Vec::new(), Options::new())
        .unwrap();
    assert_eq!(server.name().len(), 16);
    assert!(server.name().chars().all(|c| c.is_ascii_alphanumeric()));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn duplicate_name_is_rejected() {
    let registry: Registry<Num> = Registry::default();
    registry
        .register(Some("dup".into()), None, Vec::new(), Options::new())
        .unwrap();
    let err = registry
        .register(Some("dup".into()), None, Vec::new(), Options::new())
        .unwrap_err();
    assert!(matches!(err, ServerError::DuplicateName(name) if name == "dup"));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn unknown_name_is_not_found() {
    let registry: Registry<Num> = Registry::default();
    let err = registry
        .post(CancellationToken::new(), "missing", Num(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::NotFound(name) if name == "missing"));
}

#[tokio::test]
async fn post_replies_through_the_registry() {
    // Wire the logging façade the way a host process would.
    conveyor_logger::init(&conveyor_logger::LogConfig::default()).unwrap();

    let registry = Registry::default();
    let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
    let server = registry
        .register(
            Some("adder".into()),
            Some(recording_action(seen_tx, Duration::ZERO)),
            Vec::new(),
            Options::new().workers(1),
        )
        .unwrap();
    server.start().await;

    let reply = registry
        .post(CancellationToken::new(), "adder", Num(41))
        .await
        .unwrap();
    assert_eq!(reply, 42);

    server.stop().await;
}

#[tokio::test]
async fn single_worker_preserves_enqueue_order() {
    let registry = Registry::default();
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let server = registry
        .register(
            Some("ordered".into()),
            Some(recording_action(seen_tx, Duration::ZERO)),
            Vec::new(),
            Options::new().workers(1),
        )
        .unwrap();
    server.start().await;

    for value in 0..100 {
        registry
            .push(CancellationToken::new(), "ordered", Num(value))
            .await
            .unwrap();
    }
    for expected in 0..100 {
        let seen = timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .expect("worker stalled")
            .unwrap();
        assert_eq!(seen, expected);
    }

    server.stop().await;
}

#[tokio::test]
async fn stopped_server_rejects_submissions() {
    let registry = Registry::default();
    let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
    let server = registry
        .register(
            Some("stopper".into()),
            Some(recording_action(seen_tx, Duration::ZERO)),
            Vec::new(),
            Options::new().workers(1),
        )
        .unwrap();
    server.start().await;
    registry.stop("stopper").await.unwrap();

    // The name is no longer resolvable.
    let err = registry
        .post(CancellationToken::new(), "stopper", Num(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::NotFound(_)));
    assert!(registry.is_empty());

    // A retained handle rejects submissions too.
    assert_eq!(server.state().await, ServerState::Stopped);
    let err = server.post(CancellationToken::new(), Num(1)).await.unwrap_err();
    assert!(matches!(err, ServerError::Stopped(_)));
    let err = server.push(CancellationToken::new(), Num(1)).await.unwrap_err();
    assert!(matches!(err, ServerError::Stopped(_)));
}

#[tokio::test]
async fn stop_waits_for_in_flight_work() {
    let registry = Registry::default();
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let server = registry
        .register(
            Some("draining".into()),
            Some(recording_action(seen_tx, Duration::from_millis(200))),
            Vec::new(),
            Options::new().workers(1),
        )
        .unwrap();
    server.start().await;

    server.push(CancellationToken::new(), Num(7)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let begun = Instant::now();
    server.stop().await;
    assert!(begun.elapsed() >= Duration::from_millis(100));
    assert_eq!(seen_rx.recv().await, Some(7));

    // A second stop on the same handle is a documented misuse; it must
    // return without hanging.
    server.stop().await;
}

#[tokio::test]
async fn scheduler_fires_immediately_and_periodically() {
    let registry: Registry<Num> = Registry::default();
    let (tick_tx, mut tick_rx) = mpsc::unbounded_channel();
    let task = PeriodicTask::new(Duration::from_millis(50), move |slot| {
        let tick_tx = tick_tx.clone();
        async move {
            tick_tx.send(slot).ok();
        }
    });
    let server = registry
        .register(Some("ticker".into()), None, vec![task], Options::new())
        .unwrap();
    assert_eq!(server.worker_count(), 0);
    server.start().await;

    let first = timeout(Duration::from_millis(100), tick_rx.recv())
        .await
        .expect("first invocation was not immediate")
        .unwrap();
    assert_eq!(first, 0);
    timeout(Duration::from_millis(500), tick_rx.recv())
        .await
        .expect("task did not re-fire on its interval")
        .unwrap();

    server.stop().await;
}

struct Adder;

#[async_trait]
impl ServerHandler<Num> for Adder {
    fn name(&self) -> String {
        "adder-handler".into()
    }

    fn worker_count(&self) -> usize {
        2
    }

    async fn handle(&self, _token: CancellationToken, msg: Num, _slot: usize) -> anyhow::Result<u64> {
        Ok(msg.0 + 1)
    }
}

#[tokio::test]
async fn handler_describes_a_whole_server() {
    let registry = Registry::default();
    let server = registry
        .register_handler(Arc::new(Adder), Options::new())
        .unwrap();
    assert_eq!(server.name(), "adder-handler");
    assert_eq!(server.worker_count(), 2);
    server.start().await;

    let reply = server.post(CancellationToken::new(), Num(9)).await.unwrap();
    assert_eq!(reply, 10);

    server.stop().await;
}

#[tokio::test]
async fn options_force_worker_count() {
    let registry = Registry::default();
    let (seen_tx, _seen_rx) = mpsc::unbounded_channel();

    // Latest-only coalescing caps the pool at one worker.
    let coalescing = registry
        .register(
            Some("coalescing".into()),
            Some(recording_action(seen_tx, Duration::ZERO)),
            Vec::new(),
            Options::new().workers(8).latest_only(),
        )
        .unwrap();
    assert_eq!(coalescing.worker_count(), 1);

    // No action means nothing to run workers for.
    let scheduler_only = registry
        .register(
            Some("no-action".into()),
            None,
            Vec::new(),
            Options::new().workers(8),
        )
        .unwrap();
    assert_eq!(scheduler_only.worker_count(), 0);
}

#[tokio::test]
async fn stop_all_clears_the_registry() {
    let registry = Registry::default();
    let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
    for name in ["first", "second"] {
        let server = registry
            .register(
                Some(name.into()),
                Some(recording_action(seen_tx.clone(), Duration::ZERO)),
                Vec::new(),
                Options::new().workers(1),
            )
            .unwrap();
        server.start().await;
    }
    assert_eq!(registry.len(), 2);

    registry.stop_all().await;
    assert!(registry.is_empty());
}

#[tokio::test]
async fn full_queue_applies_backpressure() {
    let config = ConveyorConfig {
        queue: conveyor_server::config::QueueConfig { capacity: 2 },
        ..ConveyorConfig::default()
    };
    let registry = Registry::new(config);
    let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
    let server = registry
        .register(
            Some("narrow".into()),
            Some(recording_action(seen_tx, Duration::from_millis(500))),
            Vec::new(),
            Options::new().workers(1),
        )
        .unwrap();
    server.start().await;

    // One in the worker, two buffered: the queue is now full.
    for value in 0..3 {
        server.push(CancellationToken::new(), Num(value)).await.unwrap();
    }
    let blocked = timeout(
        Duration::from_millis(100),
        server.push(CancellationToken::new(), Num(3)),
    )
    .await;
    assert!(blocked.is_err(), "push should block on a full queue");

    server.stop().await;
}
