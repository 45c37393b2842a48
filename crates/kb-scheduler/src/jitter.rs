//! Random start delay for maintenance jobs.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Upper bound on a random delay applied before a job body runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jitter {
    pub max_secs: u64,
}

impl Jitter {
    pub fn new(max_secs: u64) -> Self {
        Self { max_secs }
    }

    /// A delay in `[0, max_secs)`, or zero when jitter is off.
    pub fn sample(&self) -> Duration {
        if self.max_secs == 0 {
            return Duration::ZERO;
        }
        let ms = rand::rng().random_range(0..self.max_secs * 1000);
        Duration::from_millis(ms)
    }

    pub fn is_enabled(&self) -> bool {
        self.max_secs > 0
    }
}

/// Sleep for a sampled jitter, then run `fut`.
pub async fn with_jitter<F, T>(jitter: Jitter, fut: F) -> T
where
    F: Future<Output = T>,
{
    let delay = jitter.sample();
    if !delay.is_zero() {
        tracing::debug!(jitter_ms = delay.as_millis() as u64, "Applying jitter delay");
        tokio::time::sleep(delay).await;
    }
    fut.await
}
