//! Bounded exponential backoff for transient failures
//!
//! Network calls against the CA, DNS providers and the clustered store
//! are retried with a doubling delay until either a total elapsed-time
//! ceiling or an optional retry count is reached. Exhaustion surfaces
//! the last error to the caller.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(10);

/// Retry policy with a hard elapsed-time ceiling.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial_interval: Duration,
    max_interval: Duration,
    max_elapsed: Duration,
    max_retries: Option<u32>,
}

impl Backoff {
    /// Policy bounded only by total elapsed time.
    pub fn new(max_elapsed: Duration) -> Self {
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
            max_elapsed,
            max_retries: None,
        }
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Additionally cap the number of retries after the first attempt.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Run `operation` until it succeeds or the policy is exhausted.
    ///
    /// Returns the last error once no further attempt is allowed.
    pub async fn retry<T, E, Fut, F>(&self, what: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let started = Instant::now();
        let mut delay = self.initial_interval;
        let mut retries = 0u32;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let out_of_retries =
                        self.max_retries.map(|max| retries >= max).unwrap_or(false);
                    let out_of_time = started.elapsed() + delay > self.max_elapsed;

                    if out_of_retries || out_of_time {
                        warn!("{} failed after {} attempts: {}", what, retries + 1, err);
                        return Err(err);
                    }

                    debug!(
                        "{} attempt {} failed, retrying in {:?}: {}",
                        what,
                        retries + 1,
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                    delay = std::cmp::min(delay * 2, self.max_interval);
                }
            }
        }
    }
}
