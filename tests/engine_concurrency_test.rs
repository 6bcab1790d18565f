mod common;

use common::*;
use futures::future::join_all;
use futures::stream;
use orchestrate_core::engine::{handler_fn, Engine, ExecutionContext, Message, StopReason};
use orchestrate_core::types::TxError;
use orchestrate_core::EngineError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_concurrency_never_exceeds_slots() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let probe = {
        let in_flight = Arc::clone(&in_flight);
        let max_seen = Arc::clone(&max_seen);
        handler_fn(move |_txctx| {
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            Box::pin(async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            })
        })
    };

    let engine = Engine::builder()
        .config(engine_config(5, 1_000))
        .handler(probe)
        .build()
        .unwrap();

    let ctx = ExecutionContext::background();
    let mut streams = closed_streams(10, 20);
    let results = join_all(streams.iter_mut().map(|rx| engine.run(&ctx, rx))).await;

    assert!(results
        .iter()
        .all(|result| *result == Ok(StopReason::InputClosed)));
    let max = max_seen.load(Ordering::SeqCst);
    assert!(max <= 5, "observed {max} messages in flight with 5 slots");
    assert!(max > 1, "run loops never overlapped");
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_every_message_handled_without_cancellation() {
    let handled = Arc::new(AtomicUsize::new(0));
    let engine = Engine::builder()
        .config(engine_config(10, 1_000))
        .handler(counter(Arc::clone(&handled)))
        .build()
        .unwrap();

    let ctx = ExecutionContext::background();
    let mut streams = closed_streams(50, 20);
    let results = join_all(streams.iter_mut().map(|rx| engine.run(&ctx, rx))).await;

    assert_eq!(results.len(), 50);
    assert!(results
        .iter()
        .all(|result| *result == Ok(StopReason::InputClosed)));
    assert_eq!(handled.load(Ordering::SeqCst), 1000);
    assert_eq!(streams.iter_mut().map(remaining).sum::<usize>(), 0);
    assert_eq!(engine.running_loops(), 0);
    engine.clean_up();
}

#[tokio::test]
async fn test_cancellation_accounts_for_every_message() {
    let handled = Arc::new(AtomicUsize::new(0));
    let engine = Engine::builder()
        .config(engine_config(10, 1_000))
        .handler(slow_counter(Arc::clone(&handled), Duration::from_millis(2)))
        .build()
        .unwrap();

    let (ctx, cancel) = ExecutionContext::background().with_cancel();
    let mut streams = closed_streams(50, 20);

    let (results, ()) = tokio::join!(
        join_all(streams.iter_mut().map(|rx| engine.run(&ctx, rx))),
        async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel.cancel();
        }
    );

    assert!(results
        .iter()
        .all(|result| *result == Ok(StopReason::Cancelled)));
    let handled = handled.load(Ordering::SeqCst);
    let left = streams.iter_mut().map(remaining).sum::<usize>();
    assert_eq!(handled + left, 1000);
    assert!(handled < 1000, "cancellation did not interrupt the run loops");
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let flaky = {
        let attempts = Arc::clone(&attempts);
        handler_fn(move |txctx| {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                txctx.error(TxError::eth_connection("node unreachable"));
            }
            Box::pin(async {})
        })
    };

    let engine = Engine::builder()
        .config(engine_config(1, 1_000))
        .handler(flaky)
        .build()
        .unwrap();

    let result = engine
        .run(&ExecutionContext::background(), stream::iter(messages("in", 1)))
        .await;

    assert_eq!(result, Ok(StopReason::InputClosed));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_stop_loop() {
    let engine = Engine::builder()
        .config(engine_config(1, 20))
        .handler(failing(|| TxError::kafka_connection("broker down")))
        .build()
        .unwrap();

    let result = engine
        .run(&ExecutionContext::background(), stream::iter(messages("in", 3)))
        .await;

    match result {
        Err(EngineError::Retryable(err)) => assert!(err.is_connection_error()),
        other => panic!("expected retry exhaustion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fatal_error_stops_loop() {
    let handled = Arc::new(AtomicUsize::new(0));
    let stop_on_second = {
        let handled = Arc::clone(&handled);
        handler_fn(move |txctx| {
            if handled.fetch_add(1, Ordering::SeqCst) == 1 {
                txctx.error(TxError::config("chain registry url missing"));
            }
            Box::pin(async {})
        })
    };

    let engine = Engine::builder()
        .config(engine_config(2, 1_000))
        .handler(stop_on_second)
        .build()
        .unwrap();

    let mut streams = closed_streams(1, 3);
    let result = engine
        .run(&ExecutionContext::background(), &mut streams[0])
        .await;

    assert!(matches!(result, Err(EngineError::Fatal(ref err)) if err.is_config_error()));
    assert_eq!(handled.load(Ordering::SeqCst), 2);
    assert_eq!(remaining(&mut streams[0]), 1);
}

#[tokio::test]
async fn test_slot_released_after_fatal_error() {
    let engine = Engine::builder()
        .config(engine_config(1, 1_000))
        .handler(failing(|| TxError::config("invalid chain")))
        .build()
        .unwrap();
    let ctx = ExecutionContext::background();

    let first = engine.run(&ctx, stream::iter(messages("in", 1))).await;
    assert!(matches!(first, Err(EngineError::Fatal(_))));

    // Only one slot: a leaked permit would block the second loop forever
    let second = tokio::time::timeout(
        Duration::from_secs(1),
        engine.run(&ctx, stream::iter(Vec::<Message>::new())),
    )
    .await;
    assert_eq!(second.ok(), Some(Ok(StopReason::InputClosed)));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_backoff_stops_loop() {
    let mut config = engine_config(1, 0);
    config.backoff.initial_interval_ms = 60_000;
    config.backoff.max_interval_ms = 60_000;

    let engine = Engine::builder()
        .config(config)
        .handler(failing(|| TxError::http_connection("gateway timeout")))
        .build()
        .unwrap();

    let (ctx, cancel) = ExecutionContext::background().with_cancel();
    let (result, ()) = tokio::join!(
        engine.run(&ctx, stream::iter(messages("in", 1))),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        }
    );

    assert_eq!(result, Ok(StopReason::Cancelled));
}

#[tokio::test]
async fn test_wrappers_run_after_main_chain() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let step = |label: &'static str, abort: bool| {
        let order = Arc::clone(&order);
        handler_fn(move |txctx| {
            order.lock().push(label);
            if abort {
                txctx.abort();
            }
            Box::pin(async {})
        })
    };

    let engine = Engine::builder()
        .config(engine_config(1, 1_000))
        .handler(step("main-1", true))
        .handler(step("main-2", false))
        .wrapper(step("wrapper", false))
        .build()
        .unwrap();

    let result = engine
        .run(&ExecutionContext::background(), stream::iter(messages("in", 2)))
        .await;

    assert_eq!(result, Ok(StopReason::InputClosed));
    assert_eq!(
        *order.lock(),
        vec!["main-1", "wrapper", "main-1", "wrapper"]
    );
}

#[tokio::test]
async fn test_registration_through_methods() {
    let handled = Arc::new(AtomicUsize::new(0));
    let engine = Engine::new();
    engine.set_config(engine_config(3, 1_000)).unwrap();
    engine.register(counter(Arc::clone(&handled)));
    engine.register_wrapper(counter(Arc::clone(&handled)));

    let result = engine
        .run(&ExecutionContext::background(), stream::iter(messages("in", 4)))
        .await;

    assert_eq!(result, Ok(StopReason::InputClosed));
    assert_eq!(handled.load(Ordering::SeqCst), 8);
}

#[tokio::test]
#[should_panic(expected = "no configuration")]
async fn test_run_without_config_panics() {
    let engine = Engine::new();
    let _ = engine
        .run(&ExecutionContext::background(), stream::iter(messages("in", 1)))
        .await;
}

#[tokio::test]
async fn test_clean_up_is_idempotent() {
    let handled = Arc::new(AtomicUsize::new(0));
    let engine = Engine::builder()
        .config(engine_config(2, 1_000))
        .handler(counter(Arc::clone(&handled)))
        .build()
        .unwrap();
    let ctx = ExecutionContext::background();

    engine.run(&ctx, stream::iter(messages("in", 2))).await.unwrap();
    engine.clean_up();
    engine.clean_up();

    // A fresh capacity pool is created for loops started afterwards
    let result = engine.run(&ctx, stream::iter(messages("in", 2))).await;
    assert_eq!(result, Ok(StopReason::InputClosed));
    assert_eq!(handled.load(Ordering::SeqCst), 4);
}
