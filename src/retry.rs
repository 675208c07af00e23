//! Exponential backoff with jitter for polling a condition.
//!
//! Writes to the cluster are confirmed by waiting for them to appear in a
//! watch cache. The wait polls a cheap, synchronous predicate with capped
//! exponential backoff and gives up once a total time budget is spent.
//!
//! # Example
//!
//! ```ignore
//! use kube_ingress_proxy::retry::{wait_until, BackoffConfig};
//!
//! wait_until(&BackoffConfig::default(), "service/jupyter-foo-route", || {
//!     cache.contains("default", "jupyter-foo-route")
//! })
//! .await?;
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Configuration for confirmation waits.
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the second check
    pub initial_delay: Duration,
    /// Maximum delay between checks
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Total time budget; the wait fails once this much time has passed
    pub timeout: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            timeout: Duration::from_secs(10),
        }
    }
}

impl BackoffConfig {
    /// Create a config with a different total time budget
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }
}

/// Returned when the condition never held within the time budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffExhausted {
    /// Number of times the condition was checked
    pub attempts: u32,
    /// Time spent waiting
    pub elapsed: Duration,
}

/// Poll `condition` until it returns true or the time budget runs out.
///
/// The condition is checked immediately, then after each backoff sleep.
/// Sleeps grow by `backoff_multiplier`, are capped at `max_delay`, get
/// 0.5x-1.5x jitter and never overshoot the deadline, so the call returns
/// no later than roughly `timeout` after it started.
pub async fn wait_until<F>(
    config: &BackoffConfig,
    what: &str,
    mut condition: F,
) -> Result<(), BackoffExhausted>
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    let deadline = start + config.timeout;
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        if condition() {
            if attempt > 1 {
                debug!(what = %what, attempt = attempt, "condition met");
            }
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            let elapsed = now - start;
            warn!(
                what = %what,
                attempt = attempt,
                elapsed_ms = elapsed.as_millis(),
                "gave up waiting"
            );
            return Err(BackoffExhausted {
                attempts: attempt,
                elapsed,
            });
        }

        // Add jitter: 0.5x to 1.5x of the delay
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);
        let sleep_for = jittered_delay.min(deadline - now);

        debug!(
            what = %what,
            attempt = attempt,
            delay_ms = sleep_for.as_millis(),
            "not yet visible, retrying"
        );

        tokio::time::sleep(sleep_for).await;

        // Exponential backoff, capped at max_delay
        delay = Duration::from_secs_f64(
            (delay.as_secs_f64() * config.backoff_multiplier).min(config.max_delay.as_secs_f64()),
        );
    }
}
