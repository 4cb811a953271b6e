use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

use crate::{config::Config, models::retry::BackoffConfig};

impl BackoffConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_retry_attempts,
            initial_delay_ms: config.initial_retry_delay_ms,
            max_delay_ms: config.max_retry_delay_ms,
            backoff_multiplier: config.retry_backoff_multiplier,
        }
    }
}

pub async fn retry_with_backoff<F, Fut, T, E>(config: &BackoffConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay_ms = config.initial_delay_ms;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(
                        attempt,
                        max_attempts = config.max_attempts,
                        "Retry succeeded"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if attempt >= config.max_attempts {
                    warn!(
                        max_attempts = config.max_attempts,
                        error = %e,
                        "Retry failed after exhausting all attempts"
                    );
                    return Err(e);
                }

                debug!(
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms,
                    "Retry attempt failed, backing off"
                );

                sleep(jittered(Duration::from_millis(delay_ms), 0.1)).await;

                delay_ms = std::cmp::min(delay_ms * config.backoff_multiplier, config.max_delay_ms);
            }
        }
    }
}

/// Spreads `delay` by up to `ratio` in either direction. A zero ratio returns
/// the delay unchanged.
pub fn jittered(delay: Duration, ratio: f64) -> Duration {
    if ratio <= 0.0 {
        return delay;
    }

    let jitter = rand::random_range(-ratio..=ratio);
    let millis = (delay.as_millis() as f64 * (1.0 + jitter)).max(0.0);

    Duration::from_millis(millis as u64)
}
