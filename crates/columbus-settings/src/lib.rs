//! # columbus-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ColumbusSettings::default()`]
//! 2. **User file**: `~/.columbus/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `COLUMBUS_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    columbus_home, deep_merge, load_settings, load_settings_from_path, resolve_path, settings_path,
};
pub use types::*;
