//! Bounded retry for transient HRIMS failures.

use std::time::Duration;

use hrsync_core::PipelineConfig;
use hrsync_hrims::FetchError;

/// Fixed-backoff retry. Transient failures get `max_retries` more attempts;
/// definitive failures are returned after the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.max_retries, config.retry_backoff())
    }

    /// Run `op` until it succeeds, fails definitively, or attempts run out.
    ///
    /// Returns the final result together with the number of attempts made.
    pub fn run<T>(
        &self,
        mut op: impl FnMut() -> Result<T, FetchError>,
    ) -> (Result<T, FetchError>, u32) {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match op() {
                Err(err) if err.is_transient() && attempts <= self.max_retries => {
                    tracing::warn!(
                        "attempt {attempts}/{} failed: {err}; retrying in {:?}",
                        self.max_retries + 1,
                        self.backoff
                    );
                    if !self.backoff.is_zero() {
                        std::thread::sleep(self.backoff);
                    }
                }
                result => return (result, attempts),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}
