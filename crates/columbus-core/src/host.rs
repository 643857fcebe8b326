//! Seams to the browser host and to the executors running in its tabs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{BrowserError, ChannelError};
use crate::executor::ExecutorRequest;
use crate::ids::{TabId, WindowId};
use crate::platform::Platform;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabLoadStatus {
    Loading,
    Complete,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TabInfo {
    pub id: TabId,
    pub window_id: Option<WindowId>,
    pub url: String,
    pub status: TabLoadStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowState {
    Normal,
    Minimized,
    Maximized,
    Fullscreen,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowSpec {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub focused: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TabSpec {
    pub url: String,
    pub window_id: WindowId,
    pub active: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TabUpdate {
    pub active: Option<bool>,
    pub url: Option<String>,
}

impl TabUpdate {
    pub fn activate() -> Self {
        Self {
            active: Some(true),
            url: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WindowUpdate {
    pub focused: Option<bool>,
    pub state: Option<WindowState>,
}

/// A freshly created window together with the tab it opened with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedWindow {
    pub window_id: WindowId,
    pub tab_id: TabId,
}

/// Window and tab primitives of the host browser.
///
/// Implementations classify native failures into [`BrowserError`] tags.
#[async_trait]
pub trait BrowserHost: Send + Sync {
    async fn create_window(&self, spec: WindowSpec) -> Result<CreatedWindow, BrowserError>;
    async fn update_window(&self, window_id: WindowId, update: WindowUpdate) -> Result<(), BrowserError>;
    async fn remove_window(&self, window_id: WindowId) -> Result<(), BrowserError>;

    async fn create_tab(&self, spec: TabSpec) -> Result<TabInfo, BrowserError>;
    async fn get_tab(&self, tab_id: &TabId) -> Result<TabInfo, BrowserError>;
    async fn update_tab(&self, tab_id: &TabId, update: TabUpdate) -> Result<(), BrowserError>;
    async fn remove_tab(&self, tab_id: &TabId) -> Result<(), BrowserError>;

    /// No-op round trip that keeps the host connection resident.
    async fn heartbeat(&self) -> Result<(), BrowserError>;
}

/// Request/response transport to the executor inside a tab.
#[async_trait]
pub trait ExecutorChannel: Send + Sync {
    /// Deliver one request and return the executor's raw JSON reply.
    async fn send(&self, tab_id: &TabId, request: &ExecutorRequest) -> Result<serde_json::Value, ChannelError>;

    /// (Re-)load the executor for `platform` into the tab.
    async fn attach(&self, tab_id: &TabId, platform: Platform) -> Result<(), ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activate_update_only_sets_active() {
        let update = TabUpdate::activate();
        assert_eq!(update.active, Some(true));
        assert!(update.url.is_none());
    }

    #[test]
    fn window_state_serde() {
        assert_eq!(serde_json::to_string(&WindowState::Fullscreen).unwrap(), "\"fullscreen\"");
        let state: WindowState = serde_json::from_str("\"normal\"").unwrap();
        assert_eq!(state, WindowState::Normal);
    }
}
