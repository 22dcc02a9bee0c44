use std::cmp;
use std::fmt::Display;
use std::future::Future;
use tokio::time::Duration;

/// Exponential backoff with a ceiling. `max_retries = 0` means a single attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        RetryPolicy {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        if self.base_delay > self.max_delay {
            return Err("Retry base delay must not exceed max delay");
        }

        Ok(())
    }
}

#[derive(Clone)]
pub(crate) struct RetryExecutor {
    logger: slog::Logger,
}

impl RetryExecutor {
    pub(crate) fn new(logger: slog::Logger) -> Self {
        RetryExecutor { logger }
    }

    /// Runs `operation` until it succeeds or `policy.max_retries + 1` attempts have failed, in
    /// which case the last error is returned as-is.
    pub(crate) async fn run<T, E, F, Fut>(&self, policy: &RetryPolicy, operation_name: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt: u32 = 0;
        let mut delay = policy.base_delay;

        loop {
            attempt += 1;
            match operation().await {
                Ok(output) => {
                    if attempt > 1 {
                        slog::info!(
                            self.logger,
                            "Operation {} succeeded on attempt {} after {} retries",
                            operation_name,
                            attempt,
                            attempt - 1
                        );
                    }
                    return Ok(output);
                }
                Err(e) => {
                    if attempt > policy.max_retries {
                        slog::warn!(
                            self.logger,
                            "Operation {} failed after {} attempts: {}",
                            operation_name,
                            attempt,
                            e
                        );
                        return Err(e);
                    }

                    slog::warn!(
                        self.logger,
                        "Operation {} attempt {}/{} failed: {}. Retrying in {}ms...",
                        operation_name,
                        attempt,
                        policy.max_retries.saturating_add(1),
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    delay = cmp::min(delay.saturating_mul(2), policy.max_delay);
                }
            }
        }
    }
}
