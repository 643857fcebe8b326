//! Backend, browser, server, store and logging settings.
//!
//! Grouped here because each is small and describes one outside collaborator.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSettings {
    /// Base URL of the backend project, without a trailing slash.
    pub base_url: String,
    /// Public anon key sent as the `apikey` header.
    pub anon_key: String,
    /// Bearer token for the signed-in user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            anon_key: String::new(),
            access_token: None,
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrowserSettings {
    /// Explicit browser binary; auto-detected when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<String>,
    /// Profile directory (relative to `~/.columbus`). Keeps destination logins.
    pub user_data_dir: String,
    /// Port the launched browser listens on for DevTools.
    pub debugging_port: u16,
    /// Attach to an already running browser on this port instead of launching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_port: Option<u16>,
    pub headless: bool,
    /// Directory holding one executor script per destination.
    pub scripts_dir: String,
    pub command_timeout_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chrome_path: None,
            user_data_dir: "browser-profile".to_string(),
            debugging_port: 9222,
            connect_port: None,
            headless: false,
            scripts_dir: "executors".to_string(),
            command_timeout_ms: 30_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7777,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Scan history database (relative to `~/.columbus`).
    pub db_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: "columbus.db".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` wins when set.
    pub level: String,
    pub json: bool,
    /// Warn-and-above log database (relative to `~/.columbus`).
    pub db_path: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
            db_path: "logs.db".to_string(),
        }
    }
}
