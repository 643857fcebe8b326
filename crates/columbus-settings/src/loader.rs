//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ColumbusSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `COLUMBUS_*` environment overrides (highest priority)
//! 4. Validate the result

use std::path::{Path, PathBuf};

use columbus_core::platform::Platform;
use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{ColumbusSettings, ScanSettings};

/// `~/.columbus`, the root for every relative path in the settings.
pub fn columbus_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".columbus")
}

/// Resolve the path to the settings file (`~/.columbus/settings.json`).
pub fn settings_path() -> PathBuf {
    columbus_home().join("settings.json")
}

/// Absolute paths pass through; relative ones are joined onto `base`.
pub fn resolve_path(base: &Path, path: &str) -> PathBuf {
    let candidate = PathBuf::from(path);
    if candidate.is_absolute() {
        candidate
    } else {
        base.join(candidate)
    }
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ColumbusSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ColumbusSettings> {
    let defaults = serde_json::to_value(ColumbusSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ColumbusSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Reject settings the engine cannot run with.
pub fn validate(settings: &ColumbusSettings) -> Result<()> {
    let scan = &settings.scan;
    if !(1..=ScanSettings::MAX_SAMPLES_PER_PROMPT).contains(&scan.samples_per_prompt) {
        return Err(SettingsError::InvalidValue(format!(
            "scan.samplesPerPrompt must be between 1 and {}, got {}",
            ScanSettings::MAX_SAMPLES_PER_PROMPT,
            scan.samples_per_prompt
        )));
    }
    if scan.platforms.is_empty() {
        return Err(SettingsError::InvalidValue(
            "scan.platforms must name at least one destination".into(),
        ));
    }
    if scan.retry.window_attempts == 0
        || scan.retry.tab_attempts == 0
        || scan.retry.focus_attempts == 0
        || scan.retry.update_attempts == 0
    {
        return Err(SettingsError::InvalidValue(
            "scan.retry attempt counts must be at least 1".into(),
        ));
    }
    Ok(())
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored (fall back to file/default).
pub fn apply_env_overrides(settings: &mut ColumbusSettings) {
    // ── Backend ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("COLUMBUS_BACKEND_URL") {
        settings.backend.base_url = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = read_env_string("COLUMBUS_ANON_KEY") {
        settings.backend.anon_key = v;
    }
    if let Some(v) = read_env_string("COLUMBUS_ACCESS_TOKEN") {
        settings.backend.access_token = Some(v);
    }

    // ── Scan ────────────────────────────────────────────────────────
    if let Some(v) = read_env_u32("COLUMBUS_SAMPLES_PER_PROMPT", 1, ScanSettings::MAX_SAMPLES_PER_PROMPT) {
        settings.scan.samples_per_prompt = v;
    }
    if let Some(v) = read_env_u64("COLUMBUS_ANSWER_WAIT_SECS", 1, 600) {
        settings.scan.answer_wait_secs = v;
    }
    if let Some(v) = read_env_string("COLUMBUS_PLATFORMS") {
        match parse_platforms(&v) {
            Some(platforms) => settings.scan.platforms = platforms,
            None => tracing::warn!(key = "COLUMBUS_PLATFORMS", value = %v, "invalid platform list env var, ignoring"),
        }
    }

    // ── Browser ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("COLUMBUS_CHROME_PATH") {
        settings.browser.chrome_path = Some(v);
    }
    if let Some(v) = read_env_u16("COLUMBUS_DEBUGGING_PORT", 1, 65535) {
        settings.browser.debugging_port = v;
    }
    if let Some(v) = read_env_u16("COLUMBUS_CONNECT_PORT", 1, 65535) {
        settings.browser.connect_port = Some(v);
    }
    if let Some(v) = read_env_bool("COLUMBUS_HEADLESS") {
        settings.browser.headless = v;
    }

    // ── Server & logging ────────────────────────────────────────────
    if let Some(v) = read_env_string("COLUMBUS_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("COLUMBUS_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_string("COLUMBUS_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Comma-separated destination names, returned in fixed destination order.
/// Any unknown name invalidates the whole list.
pub fn parse_platforms(val: &str) -> Option<Vec<Platform>> {
    let mut platforms = val
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Platform>().ok())
        .collect::<Option<Vec<_>>>()?;
    platforms.sort();
    platforms.dedup();
    (!platforms.is_empty()).then_some(platforms)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}
