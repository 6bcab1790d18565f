//! # Exponential Backoff
//!
//! Randomized exponential backoff and the retry loop the engine wraps around
//! every message.
//!
//! Each interval is drawn uniformly from
//! `[interval * (1 - randomization), interval * (1 + randomization)]`, the
//! base interval then grows by `multiplier` up to `max_interval`. The policy
//! gives up once the elapsed time plus the next interval would exceed
//! `max_elapsed_time`.

use crate::config::BackoffConfig;
use crate::engine::context::{ContextError, ExecutionContext};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Outcome of a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// Retry after the next backoff interval
    Transient(E),
    /// Stop retrying and return the error
    Permanent(E),
}

impl<E> RetryError<E> {
    pub fn transient(err: E) -> Self {
        RetryError::Transient(err)
    }

    pub fn permanent(err: E) -> Self {
        RetryError::Permanent(err)
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::Transient(err) | RetryError::Permanent(err) => err,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub initial_interval: Duration,
    pub randomization_factor: f64,
    pub multiplier: f64,
    pub max_interval: Duration,
    /// `None` retries forever
    pub max_elapsed_time: Option<Duration>,
    current_interval: Duration,
    start_time: Instant,
}

impl ExponentialBackoff {
    pub fn from_config(config: &BackoffConfig) -> Self {
        let max_elapsed_time = match config.max_elapsed_time_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        let initial_interval = Duration::from_millis(config.initial_interval_ms);
        Self {
            initial_interval,
            randomization_factor: config.randomization_factor,
            multiplier: config.multiplier,
            max_interval: Duration::from_millis(config.max_interval_ms),
            max_elapsed_time,
            current_interval: initial_interval,
            start_time: Instant::now(),
        }
    }

    /// Restart from the initial interval and reset the elapsed time
    pub fn reset(&mut self) {
        self.current_interval = self.initial_interval;
        self.start_time = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Next wait, or `None` once the elapsed budget is spent
    pub fn next_backoff(&mut self) -> Option<Duration> {
        let elapsed = self.elapsed();
        let next = randomized_interval(
            self.randomization_factor,
            rand::thread_rng().gen::<f64>(),
            self.current_interval,
        );
        self.increment_current_interval();

        match self.max_elapsed_time {
            Some(max) if elapsed + next > max => None,
            _ => Some(next),
        }
    }

    fn increment_current_interval(&mut self) {
        if self.current_interval.as_secs_f64() >= self.max_interval.as_secs_f64() / self.multiplier {
            self.current_interval = self.max_interval;
        } else {
            self.current_interval = self.current_interval.mul_f64(self.multiplier);
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

/// Spread `interval` by `factor` using `random` in `[0, 1)`
pub(crate) fn randomized_interval(factor: f64, random: f64, interval: Duration) -> Duration {
    if factor == 0.0 {
        return interval;
    }
    let interval = interval.as_secs_f64();
    let delta = factor * interval;
    let min = interval - delta;
    let max = interval + delta;
    Duration::from_secs_f64(min + random * (max - min))
}

/// Run `operation` until it succeeds, fails permanently or the backoff gives up
///
/// `notify` is called with the error and the wait before every retry. The
/// wait races `ctx`: when it is cancelled the context error is returned.
/// On exhaustion the last transient error is returned.
pub async fn retry_notify<T, E, Op, Fut, N>(
    backoff: &mut ExponentialBackoff,
    ctx: &ExecutionContext,
    mut operation: Op,
    mut notify: N,
) -> Result<T, E>
where
    E: From<ContextError>,
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RetryError<E>>>,
    N: FnMut(&E, Duration),
{
    backoff.reset();
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(RetryError::Permanent(err)) => return Err(err),
            Err(RetryError::Transient(err)) => err,
        };

        let Some(wait) = backoff.next_backoff() else {
            return Err(err);
        };
        notify(&err, wait);

        tokio::select! {
            biased;
            reason = ctx.done() => return Err(E::from(reason)),
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
