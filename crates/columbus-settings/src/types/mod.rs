//! Settings type definitions.
//!
//! All types are camelCase on the wire and `#[serde(default)]`, so a
//! settings file only needs the keys it changes.

mod scan;
mod service;

pub use scan::*;
pub use service::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "scan": { "answerWaitSecs": 60, "platforms": ["chatgpt", "claude"] },
///   "backend": { "baseUrl": "https://example.supabase.co" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumbusSettings {
    pub backend: BackendSettings,
    pub scan: ScanSettings,
    pub browser: BrowserSettings,
    pub server: ServerSettings,
    pub store: StoreSettings,
    pub logging: LoggingSettings,
}
