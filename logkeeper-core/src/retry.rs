use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

use crate::audit::CancellationFlag;
use crate::config::RetrySection;
use crate::service::ServiceError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
    jitter_ms: u64,
    cancellation: Option<CancellationFlag>,
}

#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub result: T,
    pub attempts: usize,
}

impl RetryPolicy {
    pub fn new(config: &RetrySection) -> Self {
        let base_delay = Duration::from_millis(config.base_delay_ms);
        let max_delay = Duration::from_millis(config.max_delay_ms).max(base_delay);
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay,
            max_delay,
            jitter_ms: config.jitter_ms,
            cancellation: None,
        }
    }

    /// No attempt, first or retried, is sent once `flag` is set.
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = Some(flag);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationFlag::is_cancelled)
    }

    pub fn none() -> Self {
        Self::new(&RetrySection::disabled())
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Whether `error`, seen on the zero-based `attempt`, earns another try.
    pub fn should_retry(&self, attempt: usize, error: &ServiceError) -> bool {
        error.is_retryable() && attempt + 1 < self.max_attempts
    }

    /// Backoff before the zero-based `attempt`: nothing before the first call,
    /// then `base * 2^(attempt - 1)` capped at the configured maximum.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 1).min(16) as u32;
        let backoff = self
            .base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        if self.jitter_ms == 0 {
            backoff
        } else {
            let jitter = rand::thread_rng().gen_range(0..=self.jitter_ms);
            backoff + Duration::from_millis(jitter)
        }
    }

    pub async fn pause(&self, attempt: usize) {
        let delay = self.delay_for_attempt(attempt);
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }

    pub async fn run<F, Fut, T>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<RetryOutcome<T>, ServiceError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut attempt = 0usize;
        loop {
            self.pause(attempt).await;
            if self.is_cancelled() {
                return Err(ServiceError::Cancelled);
            }
            match operation(attempt).await {
                Ok(result) => {
                    return Ok(RetryOutcome {
                        result,
                        attempts: attempt + 1,
                    });
                }
                Err(error) if self.should_retry(attempt, &error) => {
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        error = %error,
                        "transient failure, retrying"
                    );
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetrySection::default())
    }
}
