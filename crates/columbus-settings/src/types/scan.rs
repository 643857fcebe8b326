//! Scan timing and retry settings.

use columbus_core::platform::Platform;
use serde::{Deserialize, Serialize};

/// Bounded-retry attempt counts for host window/tab calls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    pub window_attempts: u32,
    pub tab_attempts: u32,
    pub focus_attempts: u32,
    pub update_attempts: u32,
    /// Linear backoff: delay before attempt `n` is `n * backoffBaseMs`.
    pub backoff_base_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            window_attempts: 5,
            tab_attempts: 5,
            focus_attempts: 10,
            update_attempts: 5,
            backoff_base_ms: 500,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WindowSettings {
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 800,
        }
    }
}

/// Everything that shapes how a scan runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanSettings {
    /// Destinations scanned when a start request names none.
    pub platforms: Vec<Platform>,
    pub samples_per_prompt: u32,
    /// Length of the single global wait between submitting and collecting.
    pub answer_wait_secs: u64,
    pub wait_poll_ms: u64,
    pub tab_ready_timeout_ms: u64,
    pub tab_ready_poll_ms: u64,
    /// Pause after a tab reports loaded, before the executor is used.
    pub tab_settle_ms: u64,
    pub collect_max_retries: u32,
    pub collect_retry_delay_ms: u64,
    pub messaging_retries: u32,
    pub reattach_delay_ms: u64,
    pub keepalive_interval_secs: u64,
    pub retry: RetrySettings,
    pub window: WindowSettings,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            platforms: Platform::ALL.to_vec(),
            samples_per_prompt: 1,
            answer_wait_secs: 45,
            wait_poll_ms: 1000,
            tab_ready_timeout_ms: 30_000,
            tab_ready_poll_ms: 500,
            tab_settle_ms: 2500,
            collect_max_retries: 3,
            collect_retry_delay_ms: 5000,
            messaging_retries: 3,
            reattach_delay_ms: 1000,
            keepalive_interval_secs: 24,
            retry: RetrySettings::default(),
            window: WindowSettings::default(),
        }
    }
}

impl ScanSettings {
    pub const MAX_SAMPLES_PER_PROMPT: u32 = 10;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = ScanSettings::default();
        assert_eq!(s.platforms, Platform::ALL.to_vec());
        assert_eq!(s.answer_wait_secs, 45);
        assert_eq!(s.collect_max_retries, 3);
        assert_eq!(s.collect_retry_delay_ms, 5000);
        assert_eq!(s.keepalive_interval_secs, 24);
        assert_eq!(s.retry.focus_attempts, 10);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: ScanSettings = serde_json::from_str(r#"{"answerWaitSecs": 10, "retry": {"tabAttempts": 7}}"#).unwrap();
        assert_eq!(s.answer_wait_secs, 10);
        assert_eq!(s.retry.tab_attempts, 7);
        assert_eq!(s.retry.window_attempts, 5);
        assert_eq!(s.samples_per_prompt, 1);
    }

    #[test]
    fn platforms_parse_by_name() {
        let s: ScanSettings = serde_json::from_str(r#"{"platforms": ["claude", "gemini"]}"#).unwrap();
        assert_eq!(s.platforms, vec![Platform::Claude, Platform::Gemini]);
    }
}
