use sentiment_core::{CoreError, FlattenConfig, RedditApiError};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Retry behaviour for placeholder batches: a first attempt plus `max_retries` more,
/// separated by a fixed pause.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryConfig {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

impl From<&FlattenConfig> for RetryConfig {
    fn from(config: &FlattenConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: config.inter_batch_delay(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry after the configured pause
    Retry,
    /// Retry, but wait at least as long as the server asked
    RetryWithDelay(Duration),
    /// Permanent failure
    NoRetry,
}

pub fn get_retry_strategy(error: &CoreError) -> RetryStrategy {
    match error {
        CoreError::RedditApi(reddit_error) => match reddit_error {
            RedditApiError::RateLimitExceeded { retry_after } => {
                RetryStrategy::RetryWithDelay(Duration::from_secs(*retry_after))
            }
            RedditApiError::ServerError { .. }
            | RedditApiError::RequestTimeout
            | RedditApiError::InvalidResponse { .. }
            | RedditApiError::InvalidToken => RetryStrategy::Retry,
            RedditApiError::AuthenticationFailed { .. }
            | RedditApiError::Forbidden { .. }
            | RedditApiError::SubredditNotFound { .. }
            | RedditApiError::PostNotFound { .. } => RetryStrategy::NoRetry,
        },
        CoreError::Network(_) | CoreError::Timeout { .. } | CoreError::RequestFailed { .. } => {
            RetryStrategy::Retry
        }
        CoreError::RateLimited { retry_after, .. } => match retry_after {
            Some(delay) => RetryStrategy::RetryWithDelay(*delay),
            None => RetryStrategy::Retry,
        },
        _ => RetryStrategy::NoRetry,
    }
}

#[derive(Debug)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { attempts: u32, last_error: CoreError },
}

/// Runs `operation` until it succeeds, hits a permanent error, or the attempts run out.
pub async fn execute_with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let max_attempts = config.max_attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        if attempt > 1 {
            debug!("Retry attempt {} for {}", attempt - 1, operation_name);
        }

        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!("{} succeeded after {} attempts", operation_name, attempt);
                }
                return RetryOutcome::Succeeded {
                    value,
                    attempts: attempt,
                };
            }
            Err(error) => error,
        };

        let delay = match get_retry_strategy(&error) {
            RetryStrategy::NoRetry => {
                debug!("Not retrying {} due to error type: {}", operation_name, error);
                return RetryOutcome::Exhausted {
                    attempts: attempt,
                    last_error: error,
                };
            }
            RetryStrategy::Retry => config.delay,
            RetryStrategy::RetryWithDelay(requested) => requested.max(config.delay),
        };

        if attempt >= max_attempts {
            warn!(
                "{} failed after {} attempts: {}",
                operation_name, attempt, error
            );
            return RetryOutcome::Exhausted {
                attempts: attempt,
                last_error: error,
            };
        }

        info!("Retrying {} in {:?} due to: {}", operation_name, delay, error);
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}
