//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`BizhubSettings::default()`]
//! 2. If `~/.bizhub/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `BIZHUB_*` environment variable overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::BizhubSettings;

/// Data directory (`~/.bizhub`).
pub fn data_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".bizhub")
}

/// Resolve the path to the settings file (`~/.bizhub/settings.json`).
pub fn settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<BizhubSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or invalid values are errors.
pub fn load_settings_from_path(path: &Path) -> Result<BizhubSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults deep-merged with the file at `path`, without env overrides.
pub fn read_settings_file(path: &Path) -> Result<BizhubSettings> {
    let defaults = serde_json::to_value(BizhubSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: BizhubSettings = serde_json::from_value(merged)?;
    settings.server.base_url = settings.server.origin().to_string();
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut BizhubSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Each variable has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are ignored with a warning (file/default value is kept)
pub fn apply_overrides<F>(settings: &mut BizhubSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("BIZHUB_API_URL") {
        settings.server.base_url = v.trim_end_matches('/').to_string();
    }

    // ── Wake ────────────────────────────────────────────────────────
    if let Some(v) = env.u32("BIZHUB_WAKE_MAX_ATTEMPTS", 1, 50) {
        settings.wake.max_attempts = v;
    }
    // A raised initial value lifts its cap with it
    if let Some(v) = env.u64("BIZHUB_WAKE_TIMEOUT_MS", 100, 600_000) {
        settings.wake.initial_timeout_ms = v;
        settings.wake.max_timeout_ms = settings.wake.max_timeout_ms.max(v);
    }
    if let Some(v) = env.u64("BIZHUB_WAKE_DELAY_MS", 0, 600_000) {
        settings.wake.initial_delay_ms = v;
        settings.wake.max_delay_ms = settings.wake.max_delay_ms.max(v);
    }

    // ── Keep-alive ──────────────────────────────────────────────────
    if let Some(v) = env.u64("BIZHUB_KEEP_ALIVE_INTERVAL_MS", 1000, 86_400_000) {
        settings.keep_alive.interval_ms = v;
    }
    if let Some(v) = env.u64("BIZHUB_PING_TIMEOUT_MS", 100, 600_000) {
        settings.keep_alive.ping_timeout_ms = v;
    }

    // ── Init ────────────────────────────────────────────────────────
    if let Some(v) = env.u64("BIZHUB_INIT_RETRY_BUDGET_MS", 0, 3_600_000) {
        settings.init.retry_budget_ms = v;
    }

    // ── Analytics ───────────────────────────────────────────────────
    if let Some(v) = env.bool("BIZHUB_ANALYTICS_ENABLED") {
        settings.analytics.enabled = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("BIZHUB_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("BIZHUB_LOG_FORMAT") {
        settings.logging.format = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u32` within an inclusive range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Variable readers ────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u32(&self, name: &str, min: u32, max: u32) -> Option<u32> {
        let val = (self.lookup)(name)?;
        let result = parse_u32_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u32 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
