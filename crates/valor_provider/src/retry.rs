use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::warn;
use valor_domain::RetryConfig;

use crate::Error;

/// Retries a provider request with exponential backoff and jitter. Only
/// errors the provider marks retriable (rate limiting) are attempted again;
/// everything else surfaces on the first failure.
pub async fn retry_with_config<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    let strategy = ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(config.min_delay_ms))
        .with_factor(config.backoff_factor as f32)
        .with_max_times(config.max_retry_attempts)
        .with_jitter();

    operation
        .retry(&strategy)
        .when(|error: &Error| error.is_retriable())
        .notify(|error: &Error, delay: Duration| {
            warn!(?delay, %error, "Retrying provider request");
        })
        .await
}
