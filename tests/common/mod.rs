//! Shared helpers for the integration tests.

#![allow(dead_code)]

use orchestrate_core::config::{BackoffConfig, EngineConfig};
use orchestrate_core::engine::{handler_fn, HandlerFunc, Message, TxContext};
use orchestrate_core::types::TxError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const TRACE_KEY: &str = "test";

/// Append `label` to the trace stored on the context
pub fn record(txctx: &mut TxContext, label: impl Into<String>) {
    let mut trace = txctx.get::<Vec<String>>(TRACE_KEY).cloned().unwrap_or_default();
    trace.push(label.into());
    txctx.set(TRACE_KEY, trace);
}

pub fn trace(txctx: &TxContext) -> Vec<String> {
    txctx.get::<Vec<String>>(TRACE_KEY).cloned().unwrap_or_default()
}

pub fn pipeline(label: &'static str) -> HandlerFunc {
    handler_fn(move |txctx| {
        record(txctx, label);
        Box::pin(async {})
    })
}

pub fn error_handler(label: &'static str) -> HandlerFunc {
    handler_fn(move |txctx| {
        record(txctx, label);
        txctx.error("test Error");
        Box::pin(async {})
    })
}

pub fn aborter() -> HandlerFunc {
    handler_fn(|txctx| {
        record(txctx, "abort");
        txctx.abort_with_error("test Error");
        Box::pin(async {})
    })
}

pub fn middleware(label: &'static str) -> HandlerFunc {
    handler_fn(move |txctx| {
        Box::pin(async move {
            record(txctx, format!("{label}-before"));
            txctx.next().await;
            record(txctx, format!("{label}-after"));
        })
    })
}

/// Count every message reaching the chain
pub fn counter(count: Arc<AtomicUsize>) -> HandlerFunc {
    handler_fn(move |_txctx| {
        count.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {})
    })
}

/// Count every message, then hold its slot for `hold`
pub fn slow_counter(count: Arc<AtomicUsize>, hold: Duration) -> HandlerFunc {
    handler_fn(move |_txctx| {
        count.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            tokio::time::sleep(hold).await;
        })
    })
}

/// Record `make_error()` on every message
pub fn failing(make_error: fn() -> TxError) -> HandlerFunc {
    handler_fn(move |txctx| {
        txctx.error(make_error());
        Box::pin(async {})
    })
}

pub fn messages(entrypoint: &str, count: usize) -> Vec<Message> {
    (0..count)
        .map(|i| {
            Message::new(entrypoint, format!(r#"{{"payload":{{"index":{i}}}}}"#).into_bytes())
                .with_key(format!("key-{i}"))
        })
        .collect()
}

/// Engine configuration with a short, deterministic retry policy
pub fn engine_config(slots: usize, max_elapsed_ms: u64) -> EngineConfig {
    EngineConfig {
        slots,
        backoff: BackoffConfig {
            initial_interval_ms: 1,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval_ms: 5,
            max_elapsed_time_ms: max_elapsed_ms,
        },
    }
}

/// Unbounded channels pre-filled with `per_stream` messages each, senders closed
pub fn closed_streams(
    streams: usize,
    per_stream: usize,
) -> Vec<futures::channel::mpsc::UnboundedReceiver<Message>> {
    (0..streams)
        .map(|stream| {
            let (tx, rx) = futures::channel::mpsc::unbounded();
            for msg in messages(&format!("stream-{stream}"), per_stream) {
                tx.unbounded_send(msg).expect("receiver alive");
            }
            rx
        })
        .collect()
}

/// Messages left unread in `rx`
pub fn remaining(rx: &mut futures::channel::mpsc::UnboundedReceiver<Message>) -> usize {
    let mut left = 0;
    while let Ok(Some(_)) = rx.try_next() {
        left += 1;
    }
    left
}
