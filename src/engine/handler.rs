//! # Handlers
//!
//! A handler is one asynchronous processing step over a [`TxContext`]. It
//! reports failure by recording errors on the context and steers the chain
//! through [`TxContext::next`] and [`TxContext::abort`].

use crate::engine::tx_context::TxContext;
use futures::future::BoxFuture;
use std::sync::Arc;

/// One step of a handler chain
pub type HandlerFunc = Arc<dyn for<'a> Fn(&'a mut TxContext) -> BoxFuture<'a, ()> + Send + Sync>;

/// Wrap a closure into a [`HandlerFunc`]
///
/// ```
/// use orchestrate_core::engine::{handler_fn, TxContext};
///
/// let handler = handler_fn(|txctx: &mut TxContext| {
///     Box::pin(async move {
///         txctx.envelope.set_internal_label("seen", "true");
///         txctx.next().await;
///     })
/// });
/// # drop(handler);
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFunc
where
    F: for<'a> Fn(&'a mut TxContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Nest a list of handlers into a single handler running them as a new frame
pub fn combine_handlers<I>(handlers: I) -> HandlerFunc
where
    I: IntoIterator<Item = HandlerFunc>,
{
    let handlers: Arc<[HandlerFunc]> = handlers.into_iter().collect();
    handler_fn(move |txctx| txctx.apply_handlers(Arc::clone(&handlers)))
}

/// Run the branch picked by `selector`, or nothing when it returns `None`
pub fn fork<F>(selector: F) -> HandlerFunc
where
    F: Fn(&TxContext) -> Option<HandlerFunc> + Send + Sync + 'static,
{
    handler_fn(move |txctx| {
        let branch = selector(txctx);
        Box::pin(async move {
            if let Some(branch) = branch {
                branch(txctx).await;
            }
        })
    })
}
