//! Window/tab control with bounded retries over transient host failures.
//!
//! Transient failures are recognised by [`BrowserError::is_transient`]; a
//! fullscreen failure additionally restores the window before the next
//! attempt. Every other error is returned on the spot.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use columbus_core::errors::BrowserError;
use columbus_core::host::{
    BrowserHost, CreatedWindow, TabInfo, TabLoadStatus, TabSpec, TabUpdate, WindowSpec, WindowState, WindowUpdate,
};
use columbus_core::ids::{TabId, WindowId};

use crate::config::{RetryPolicy, ScanConfig};

pub struct WindowController {
    host: Arc<dyn BrowserHost>,
    retry: RetryPolicy,
    width: u32,
    height: u32,
    ready_timeout: Duration,
    ready_poll: Duration,
    settle: Duration,
}

impl WindowController {
    pub fn new(host: Arc<dyn BrowserHost>, config: &ScanConfig) -> Self {
        Self {
            host,
            retry: config.retry.clone(),
            width: config.window_width,
            height: config.window_height,
            ready_timeout: config.tab_ready_timeout,
            ready_poll: config.tab_ready_poll,
            settle: config.tab_settle,
        }
    }

    async fn with_retry<T, F, Fut>(
        &self,
        op: &'static str,
        attempts: u32,
        window_id: Option<WindowId>,
        mut call: F,
    ) -> Result<T, BrowserError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BrowserError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    debug!(op, attempt, kind = e.error_kind(), error = %e, "transient host error, retrying");
                    if e.needs_fullscreen_exit() {
                        if let Some(window_id) = window_id {
                            if let Err(exit_err) = self.exit_fullscreen(window_id).await {
                                debug!(op, error = %exit_err, "fullscreen exit failed");
                            }
                        }
                    }
                    tokio::time::sleep(self.retry.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(op, attempts, error = %e, "transient host error persisted");
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Open the scan window on `url`, returning it with its first tab.
    pub async fn create_scan_window(&self, url: &str) -> Result<CreatedWindow, BrowserError> {
        let host = &*self.host;
        let spec = WindowSpec {
            url: url.to_string(),
            width: self.width,
            height: self.height,
            focused: true,
        };
        let created = self
            .with_retry("create_window", self.retry.window_attempts, None, move || {
                host.create_window(spec.clone())
            })
            .await?;
        debug!(window_id = %created.window_id, tab_id = %created.tab_id, "scan window created");
        Ok(created)
    }

    pub async fn create_tab_with_retry(
        &self,
        url: &str,
        window_id: WindowId,
        active: bool,
    ) -> Result<TabInfo, BrowserError> {
        let host = &*self.host;
        let spec = TabSpec {
            url: url.to_string(),
            window_id,
            active,
        };
        self.with_retry("create_tab", self.retry.tab_attempts, Some(window_id), move || {
            host.create_tab(spec.clone())
        })
        .await
    }

    pub async fn bring_window_to_foreground(&self, window_id: WindowId) -> Result<(), BrowserError> {
        let host = &*self.host;
        self.with_retry("focus_window", self.retry.focus_attempts, Some(window_id), move || {
            host.update_window(
                window_id,
                WindowUpdate {
                    focused: Some(true),
                    state: None,
                },
            )
        })
        .await
    }

    pub async fn safe_tab_update(
        &self,
        tab_id: &TabId,
        window_id: Option<WindowId>,
        update: TabUpdate,
    ) -> Result<(), BrowserError> {
        let host = &*self.host;
        self.with_retry("update_tab", self.retry.update_attempts, window_id, move || {
            host.update_tab(tab_id, update.clone())
        })
        .await
    }

    /// Bring the window forward, then activate `tab_id` inside it.
    pub async fn focus_tab(&self, window_id: WindowId, tab_id: &TabId) -> Result<(), BrowserError> {
        self.bring_window_to_foreground(window_id).await?;
        self.safe_tab_update(tab_id, Some(window_id), TabUpdate::activate())
            .await
    }

    pub async fn exit_fullscreen(&self, window_id: WindowId) -> Result<(), BrowserError> {
        debug!(window_id = %window_id, "restoring window from fullscreen");
        self.host
            .update_window(
                window_id,
                WindowUpdate {
                    focused: None,
                    state: Some(WindowState::Normal),
                },
            )
            .await
    }

    /// Poll until the tab reports loaded, then let page scripts settle.
    pub async fn wait_for_tab_ready(&self, tab_id: &TabId) -> Result<(), BrowserError> {
        let deadline = Instant::now() + self.ready_timeout;
        while Instant::now() < deadline {
            let tab = self.host.get_tab(tab_id).await?;
            if tab.status == TabLoadStatus::Complete {
                tokio::time::sleep(self.settle).await;
                return Ok(());
            }
            tokio::time::sleep(self.ready_poll).await;
        }
        Err(BrowserError::Timeout {
            timeout: self.ready_timeout,
            context: format!("tab {tab_id} load"),
        })
    }

    /// Best-effort close; a tab that is already gone counts as closed.
    pub async fn close_tab(&self, tab_id: &TabId) {
        match self.host.remove_tab(tab_id).await {
            Ok(()) | Err(BrowserError::TabNotFound(_)) => {}
            Err(e) => warn!(tab_id = %tab_id, error = %e, "failed to close tab"),
        }
    }

    pub async fn close_window(&self, window_id: WindowId) {
        match self.host.remove_window(window_id).await {
            Ok(()) | Err(BrowserError::WindowNotFound(_)) => {}
            Err(e) => warn!(window_id = %window_id, error = %e, "failed to close window"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBrowser, MockOp};

    fn controller(browser: Arc<MockBrowser>) -> WindowController {
        WindowController::new(browser, &ScanConfig::default())
    }

    async fn window(controller: &WindowController) -> CreatedWindow {
        controller.create_scan_window("about:blank").await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_with_linear_backoff() {
        let browser = Arc::new(MockBrowser::new());
        let controller = controller(browser.clone());
        let created = window(&controller).await;
        browser.fail_next(MockOp::CreateTab, BrowserError::TabEditingBlocked("dragging".into()), 2);

        let start = Instant::now();
        let tab = controller
            .create_tab_with_retry("https://claude.ai/new", created.window_id, true)
            .await
            .unwrap();
        assert_eq!(tab.window_id, Some(created.window_id));
        // 500ms after attempt 1, 1000ms after attempt 2
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_propagate_immediately() {
        let browser = Arc::new(MockBrowser::new());
        let controller = controller(browser.clone());
        let created = window(&controller).await;
        browser.fail_next(MockOp::CreateTab, BrowserError::Host("renderer crashed".into()), 1);

        let err = controller
            .create_tab_with_retry("https://claude.ai/new", created.window_id, true)
            .await
            .unwrap_err();
        assert_eq!(err, BrowserError::Host("renderer crashed".into()));
        assert_eq!(browser.tabs_created(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let browser = Arc::new(MockBrowser::new());
        let controller = controller(browser.clone());
        browser.fail_next(MockOp::CreateWindow, BrowserError::TabEditingBlocked("busy".into()), 10);

        let err = controller.create_scan_window("about:blank").await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(browser.open_windows(), 0);

        // five attempts per call: the second call drains the rest
        assert!(controller.create_scan_window("about:blank").await.is_err());
        controller.create_scan_window("about:blank").await.unwrap();
        assert_eq!(browser.open_windows(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fullscreen_failure_restores_window_first() {
        let browser = Arc::new(MockBrowser::new());
        let controller = controller(browser.clone());
        let created = window(&controller).await;
        browser.fail_next(MockOp::UpdateTab, BrowserError::Fullscreen("restore first".into()), 1);

        controller
            .focus_tab(created.window_id, &created.tab_id)
            .await
            .unwrap();

        let restored = browser
            .window_updates()
            .into_iter()
            .any(|(id, update)| id == created.window_id && update.state == Some(WindowState::Normal));
        assert!(restored);
    }

    #[tokio::test(start_paused = true)]
    async fn focus_on_missing_window_fails() {
        let browser = Arc::new(MockBrowser::new());
        let controller = controller(browser);
        let err = controller
            .bring_window_to_foreground(WindowId(404))
            .await
            .unwrap_err();
        assert_eq!(err, BrowserError::WindowNotFound(WindowId(404)));
    }

    #[tokio::test(start_paused = true)]
    async fn tab_ready_waits_for_settle() {
        let browser = Arc::new(MockBrowser::new());
        let controller = controller(browser.clone());
        let created = window(&controller).await;

        let start = Instant::now();
        controller.wait_for_tab_ready(&created.tab_id).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn tab_ready_times_out() {
        let browser = Arc::new(MockBrowser::new().with_stuck_tabs());
        let controller = controller(browser.clone());
        let created = window(&controller).await;

        let err = controller.wait_for_tab_ready(&created.tab_id).await.unwrap_err();
        assert!(matches!(err, BrowserError::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn tab_ready_reports_lost_tab() {
        let browser = Arc::new(MockBrowser::new());
        let controller = controller(browser);
        let err = controller
            .wait_for_tab_ready(&TabId::from_raw("gone"))
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::TabNotFound(_)));
    }

    #[tokio::test]
    async fn closing_missing_targets_is_quiet() {
        let browser = Arc::new(MockBrowser::new());
        let controller = controller(browser.clone());
        let created = window(&controller).await;

        controller.close_tab(&created.tab_id).await;
        controller.close_tab(&created.tab_id).await;
        controller.close_window(created.window_id).await;
        controller.close_window(created.window_id).await;
        assert_eq!(browser.open_tabs(), 0);
        assert_eq!(browser.open_windows(), 0);
    }
}
