//! Bounded retry with exponential backoff and jitter.
//!
//! Shared by the LLM and transport adapters. Callers classify their own
//! failures: `Fault::Transient` is retried (timeouts, 429, 5xx),
//! `Fault::Fatal` aborts immediately (auth errors, malformed requests).

use anyhow::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for each subsequent delay.
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

/// Classified failure from one attempt.
#[derive(Debug)]
pub enum Fault {
    Transient(anyhow::Error),
    Fatal(anyhow::Error),
}

/// Execute an async operation with retry logic.
///
/// The `operation` closure is called repeatedly until it succeeds, fails
/// fatally, or `max_attempts` is exhausted.
pub async fn with_backoff<T, F, Fut>(config: &RetryConfig, label: &str, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, Fault>>,
{
    let mut delay = config.initial_delay;
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!("{} succeeded on attempt {}", label, attempt);
                }
                return Ok(value);
            }
            Err(Fault::Fatal(e)) => {
                return Err(e.context(format!("{} failed fatally", label)));
            }
            Err(Fault::Transient(e)) => {
                tracing::warn!(
                    "{} transient error on attempt {}/{}: {}",
                    label,
                    attempt,
                    config.max_attempts,
                    e
                );
                last_error = Some(e);
            }
        }

        if attempt < config.max_attempts {
            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..500));
            let sleep_time = delay + jitter;
            tracing::info!(
                "{} retrying in {:.1}s (attempt {}/{})",
                label,
                sleep_time.as_secs_f64(),
                attempt + 1,
                config.max_attempts
            );
            tokio::time::sleep(sleep_time).await;
            delay = Duration::from_secs_f64(
                (delay.as_secs_f64() * config.backoff_factor).min(config.max_delay.as_secs_f64()),
            );
        }
    }

    Err(anyhow::anyhow!(
        "All {} {} attempts exhausted. Last error: {}",
        config.max_attempts,
        label,
        last_error.map_or_else(|| "unknown".to_string(), |e| e.to_string())
    ))
}
