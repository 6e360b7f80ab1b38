//! # bizhub-settings
//!
//! Configuration management with layered sources for the bizhub client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`BizhubSettings::default()`]
//! 2. **User file**: `~/.bizhub/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `BIZHUB_*` overrides (highest priority)
//!
//! Settings are plain values: callers load them once and pass them down.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, data_dir, deep_merge, load_settings,
    load_settings_from_path, settings_path,
};
pub use types::*;
