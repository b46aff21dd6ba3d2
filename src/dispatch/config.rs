use std::time::Duration;

use super::error::{DispatchError, DispatchResult};
use crate::config::{env_duration_millis, env_u32, env_usize};

/// How a recipient list is split up and retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProcessingConfig {
    pub batch_size: usize,
    pub delay_between_batches: Duration,
    /// Retries after the first failed attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    /// Sends in flight at once within a batch.
    pub max_concurrent: usize,
}

impl BatchProcessingConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            batch_size: env_usize(&lookup, "CAMPAIGN_BATCH_SIZE", defaults.batch_size),
            delay_between_batches: env_duration_millis(
                &lookup,
                "CAMPAIGN_BATCH_DELAY_MS",
                defaults.delay_between_batches.as_millis() as u64,
            ),
            max_retries: env_u32(&lookup, "CAMPAIGN_MAX_RETRIES", defaults.max_retries),
            max_concurrent: env_usize(&lookup, "CAMPAIGN_MAX_CONCURRENT", defaults.max_concurrent),
        }
    }

    pub fn validate(&self) -> DispatchResult<()> {
        if self.batch_size == 0 {
            return Err(DispatchError::InvalidConfig("batch_size must be at least 1".into()));
        }
        if self.max_concurrent == 0 {
            return Err(DispatchError::InvalidConfig(
                "max_concurrent must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for BatchProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            delay_between_batches: Duration::from_millis(1000),
            max_retries: 3,
            max_concurrent: 5,
        }
    }
}

/// Dispatcher-wide settings shared by every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Global send cap across all batches and runs on this dispatcher.
    pub sends_per_second: u32,
    /// Fixed pause between attempts for one recipient. No backoff growth.
    pub retry_delay: Duration,
}

impl DispatcherConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            sends_per_second: env_u32(
                &lookup,
                "CAMPAIGN_SENDS_PER_SECOND",
                defaults.sends_per_second,
            )
            .max(1),
            retry_delay: env_duration_millis(
                &lookup,
                "CAMPAIGN_RETRY_DELAY_MS",
                defaults.retry_delay.as_millis() as u64,
            ),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            sends_per_second: 5,
            retry_delay: Duration::from_millis(1000),
        }
    }
}
