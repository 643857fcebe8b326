use std::time::Duration;

use columbus_core::platform::Platform;
use columbus_settings::{RetrySettings, ScanSettings};

/// Attempt counts and linear backoff for host window/tab calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub window_attempts: u32,
    pub tab_attempts: u32,
    pub focus_attempts: u32,
    pub update_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * attempt
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(s: &RetrySettings) -> Self {
        Self {
            window_attempts: s.window_attempts.max(1),
            tab_attempts: s.tab_attempts.max(1),
            focus_attempts: s.focus_attempts.max(1),
            update_attempts: s.update_attempts.max(1),
            backoff_base: Duration::from_millis(s.backoff_base_ms),
        }
    }
}

/// Runtime timings and defaults for one orchestrator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanConfig {
    pub platforms: Vec<Platform>,
    pub samples_per_prompt: u32,
    pub answer_wait: Duration,
    pub wait_poll: Duration,
    pub tab_ready_timeout: Duration,
    pub tab_ready_poll: Duration,
    pub tab_settle: Duration,
    pub collect_max_retries: u32,
    pub collect_retry_delay: Duration,
    pub messaging_retries: u32,
    pub reattach_delay: Duration,
    pub keepalive_interval: Duration,
    pub window_width: u32,
    pub window_height: u32,
    pub retry: RetryPolicy,
}

impl From<&ScanSettings> for ScanConfig {
    fn from(s: &ScanSettings) -> Self {
        Self {
            platforms: s.platforms.clone(),
            samples_per_prompt: s.samples_per_prompt,
            answer_wait: Duration::from_secs(s.answer_wait_secs),
            wait_poll: Duration::from_millis(s.wait_poll_ms.max(1)),
            tab_ready_timeout: Duration::from_millis(s.tab_ready_timeout_ms),
            tab_ready_poll: Duration::from_millis(s.tab_ready_poll_ms.max(1)),
            tab_settle: Duration::from_millis(s.tab_settle_ms),
            collect_max_retries: s.collect_max_retries,
            collect_retry_delay: Duration::from_millis(s.collect_retry_delay_ms),
            messaging_retries: s.messaging_retries.max(1),
            reattach_delay: Duration::from_millis(s.reattach_delay_ms),
            keepalive_interval: Duration::from_secs(s.keepalive_interval_secs.max(1)),
            window_width: s.window.width,
            window_height: s.window.height,
            retry: RetryPolicy::from(&s.retry),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::from(&ScanSettings::default())
    }
}
