use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Reconnection policy with exponential backoff.
///
/// Attempt `n` (zero-based retry count) waits
/// `min(base_delay * multiplier^n, max_delay)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    ///
    /// Default: 1000ms
    pub base_delay: Duration,
    /// Maximum number of retries (excluding the initial attempt)
    ///
    /// Total attempts = max_retries + 1
    /// Default: 3
    pub max_retries: u32,
    /// Upper bound on a single delay
    ///
    /// Default: 10s
    pub max_delay: Duration,
    /// Default: 2.0 (doubles each time)
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_retries: 3,
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.multiplier < 1.0 {
            return Err("multiplier must be at least 1.0".to_string());
        }
        if self.max_delay < self.base_delay {
            return Err("max_delay must not be less than base_delay".to_string());
        }
        Ok(())
    }

    /// Delay before retry number `retry` (zero-based), or `None` once the
    /// retries are exhausted.
    pub fn delay_for(&self, retry: u32) -> Option<Duration> {
        if retry >= self.max_retries {
            return None;
        }
        let factor = self.multiplier.powi(retry as i32);
        let delay = self.base_delay.as_secs_f64() * factor;
        Some(Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64())))
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// retries run out. The last error is returned.
    pub async fn retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => match self.delay_for(retry) {
                    Some(delay) => {
                        tracing::warn!(
                            "{} failed (attempt {}): {}, retrying in {}ms",
                            what,
                            retry + 1,
                            e,
                            delay.as_millis()
                        );
                        tokio::time::sleep(delay).await;
                        retry += 1;
                    }
                    None => {
                        tracing::error!("{} failed after {} attempts: {}", what, retry + 1, e);
                        return Err(e);
                    }
                },
            }
        }
    }
}
