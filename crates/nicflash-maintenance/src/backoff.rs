//! Exponential backoff for cordon, drain and uncordon

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

/// Bounded exponential backoff
///
/// `steps` is the total number of attempts. The first attempt runs
/// immediately; the delay before each following attempt starts at `initial`
/// and is multiplied by `factor`. No delay follows the last attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Number of attempts
    pub steps: u32,
    /// Delay before the second attempt
    pub initial: Duration,
    /// Growth factor between delays
    pub factor: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            steps: 5,
            initial: Duration::from_secs(15),
            factor: 2,
        }
    }
}

/// All attempts failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted<E> {
    /// Attempts made
    pub attempts: u32,
    /// Error of the final attempt
    pub last: E,
}

impl Backoff {
    /// Delays slept between consecutive attempts
    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        let factor = self.factor;
        let steps = self.steps.max(1);
        std::iter::successors(Some(self.initial), move |d| d.checked_mul(factor))
            .take(steps as usize - 1)
    }

    /// Run `op` until it succeeds or the attempts run out
    ///
    /// # Errors
    /// Returns [`Exhausted`] with the last error once every attempt failed.
    pub async fn retry<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, Exhausted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let steps = self.steps.max(1);
        let mut delays = self.delays();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if attempt >= steps => {
                    warn!(operation, attempt, error = %e, "giving up");
                    return Err(Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    let delay = delays.next().unwrap_or(self.initial);
                    warn!(operation, attempt, error = %e, ?delay, "failed - retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
