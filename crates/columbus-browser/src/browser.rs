//! [`BrowserHost`] and [`ExecutorChannel`] over one browser-level DevTools
//! connection.
//!
//! DevTools cannot open a tab inside a chosen window: `Target.createTarget`
//! places new tabs in the most recently focused window. `create_tab` therefore
//! brings the requested window forward first and reports the window the tab
//! actually landed in.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::process::{Child, Command};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use columbus_core::errors::{BrowserError, ChannelError};
use columbus_core::executor::ExecutorRequest;
use columbus_core::host::{
    BrowserHost, CreatedWindow, ExecutorChannel, TabInfo, TabLoadStatus, TabSpec, TabUpdate, WindowSpec,
    WindowState, WindowUpdate,
};
use columbus_core::ids::{TabId, WindowId};
use columbus_core::platform::Platform;

use crate::classify::{classify_host_error, Subject};
use crate::connection::{CdpConnection, CdpError};

/// Global the executor scripts install themselves under.
const EXECUTOR_GLOBAL: &str = "__columbusExecutor";
const MISSING_MARKER: &str = "__columbusMissing";

#[derive(Clone, Debug)]
pub struct LaunchOptions {
    pub chrome_path: PathBuf,
    /// Dedicated profile so destination logins persist between runs.
    pub user_data_dir: PathBuf,
    pub debugging_port: u16,
    pub headless: bool,
    pub scripts_dir: PathBuf,
    pub command_timeout: Duration,
}

pub struct CdpBrowser {
    conn: CdpConnection,
    scripts_dir: PathBuf,
    sessions: Arc<DashMap<TabId, String>>,
    tab_windows: DashMap<TabId, WindowId>,
    active_tabs: DashMap<WindowId, TabId>,
    chrome: Mutex<Option<Child>>,
    _watcher: JoinHandle<()>,
}

impl CdpBrowser {
    /// Launch a browser with remote debugging and connect to it.
    pub async fn launch(options: LaunchOptions) -> Result<Self, CdpError> {
        std::fs::create_dir_all(&options.user_data_dir)
            .map_err(|e| CdpError::Launch(format!("create profile dir: {e}")))?;

        let mut cmd = Command::new(&options.chrome_path);
        cmd.arg(format!("--remote-debugging-port={}", options.debugging_port))
            .arg(format!("--user-data-dir={}", options.user_data_dir.display()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-timer-throttling")
            .arg("--disable-renderer-backgrounding");
        if options.headless {
            cmd.arg("--headless=new");
        }
        let mut child = cmd
            .arg("about:blank")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CdpError::Launch(e.to_string()))?;

        let ws_url = discover_ws_url(options.debugging_port, Some(&mut child)).await?;
        let browser = Self::from_ws_url(&ws_url, options.scripts_dir, options.command_timeout).await?;
        *browser.chrome.lock() = Some(child);
        Ok(browser)
    }

    /// Attach to a browser already listening on `port`.
    pub async fn connect(port: u16, scripts_dir: PathBuf, command_timeout: Duration) -> Result<Self, CdpError> {
        let ws_url = discover_ws_url(port, None).await?;
        Self::from_ws_url(&ws_url, scripts_dir, command_timeout).await
    }

    pub async fn from_ws_url(ws_url: &str, scripts_dir: PathBuf, command_timeout: Duration) -> Result<Self, CdpError> {
        let conn = CdpConnection::connect(ws_url, command_timeout).await?;
        let sessions: Arc<DashMap<TabId, String>> = Arc::new(DashMap::new());
        let watcher = tokio::spawn(watch_targets(conn.subscribe(), sessions.clone()));
        if let Err(e) = conn.call("Target.setDiscoverTargets", json!({"discover": true})).await {
            debug!(error = %e, "target discovery unavailable");
        }
        debug!(%ws_url, "connected to DevTools");
        Ok(Self {
            conn,
            scripts_dir,
            sessions,
            tab_windows: DashMap::new(),
            active_tabs: DashMap::new(),
            chrome: Mutex::new(None),
            _watcher: watcher,
        })
    }

    /// Kill a browser this adapter launched. Connected browsers are left alone.
    pub fn shutdown(&self) {
        if let Some(mut child) = self.chrome.lock().take() {
            if let Err(e) = child.start_kill() {
                warn!(error = %e, "failed to stop browser process");
            }
        }
    }

    async fn window_for(&self, tab: &TabId) -> Result<WindowId, BrowserError> {
        let result = self
            .conn
            .call("Browser.getWindowForTarget", json!({"targetId": tab.as_str()}))
            .await
            .map_err(|e| host_error(e, Subject::Tab(tab)))?;
        result["windowId"]
            .as_i64()
            .map(WindowId)
            .ok_or_else(|| BrowserError::Host("getWindowForTarget returned no windowId".into()))
    }

    async fn activate(&self, tab: &TabId) -> Result<(), BrowserError> {
        self.conn
            .call("Target.activateTarget", json!({"targetId": tab.as_str()}))
            .await
            .map_err(|e| host_error(e, Subject::Tab(tab)))?;
        if let Some(window) = self.tab_windows.get(tab).map(|w| *w) {
            self.active_tabs.insert(window, tab.clone());
        }
        Ok(())
    }

    /// Flattened session for `tab`, attaching on first use.
    async fn session(&self, tab: &TabId) -> Result<String, BrowserError> {
        if let Some(session) = self.sessions.get(tab) {
            return Ok(session.clone());
        }
        let result = self
            .conn
            .call("Target.attachToTarget", json!({"targetId": tab.as_str(), "flatten": true}))
            .await
            .map_err(|e| host_error(e, Subject::Tab(tab)))?;
        let session = result["sessionId"]
            .as_str()
            .ok_or_else(|| BrowserError::Host("attachToTarget returned no sessionId".into()))?
            .to_string();
        self.sessions.insert(tab.clone(), session.clone());
        Ok(session)
    }

    async fn evaluate(&self, tab: &TabId, expression: &str) -> Result<Value, ChannelError> {
        let session = self.session(tab).await?;
        let result = self
            .conn
            .call_session(
                &session,
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await
            .map_err(|e| match host_error(e, Subject::Tab(tab)) {
                BrowserError::TabNotFound(id) => {
                    self.sessions.remove(&id);
                    ChannelError::Browser(BrowserError::TabNotFound(id))
                }
                BrowserError::Host(msg) => ChannelError::Disconnected(msg),
                other => ChannelError::Browser(other),
            })?;

        if let Some(exception) = result.get("exceptionDetails") {
            let msg = exception["exception"]["description"]
                .as_str()
                .or_else(|| exception["text"].as_str())
                .unwrap_or("evaluation error");
            return Err(ChannelError::Disconnected(format!("evaluation failed: {msg}")));
        }
        Ok(result["result"]["value"].clone())
    }

    fn forget_tab(&self, tab: &TabId) {
        self.sessions.remove(tab);
        if let Some((_, window)) = self.tab_windows.remove(tab) {
            self.active_tabs.remove_if(&window, |_, active| active == tab);
        }
    }
}

impl Drop for CdpBrowser {
    fn drop(&mut self) {
        self._watcher.abort();
    }
}

#[async_trait]
impl BrowserHost for CdpBrowser {
    async fn create_window(&self, spec: WindowSpec) -> Result<CreatedWindow, BrowserError> {
        let result = self
            .conn
            .call(
                "Target.createTarget",
                json!({
                    "url": spec.url,
                    "newWindow": true,
                    "width": spec.width,
                    "height": spec.height,
                    "background": !spec.focused,
                }),
            )
            .await
            .map_err(|e| host_error(e, Subject::None))?;
        let tab_id = target_id(&result)?;
        let window_id = self.window_for(&tab_id).await?;
        self.tab_windows.insert(tab_id.clone(), window_id);
        self.active_tabs.insert(window_id, tab_id.clone());
        debug!(window_id = %window_id, tab_id = %tab_id, "window created");
        Ok(CreatedWindow { window_id, tab_id })
    }

    async fn update_window(&self, window_id: WindowId, update: WindowUpdate) -> Result<(), BrowserError> {
        if let Some(state) = update.state {
            self.conn
                .call(
                    "Browser.setWindowBounds",
                    json!({"windowId": window_id.0, "bounds": {"windowState": window_state(state)}}),
                )
                .await
                .map_err(|e| host_error(e, Subject::Window(window_id)))?;
        }
        if update.focused == Some(true) {
            let tab = self
                .active_tabs
                .get(&window_id)
                .map(|t| t.clone())
                .or_else(|| {
                    self.tab_windows
                        .iter()
                        .find(|entry| *entry.value() == window_id)
                        .map(|entry| entry.key().clone())
                })
                .ok_or(BrowserError::WindowNotFound(window_id))?;
            self.activate(&tab).await?;
        }
        Ok(())
    }

    async fn remove_window(&self, window_id: WindowId) -> Result<(), BrowserError> {
        self.conn
            .call("Browser.getWindowBounds", json!({"windowId": window_id.0}))
            .await
            .map_err(|e| host_error(e, Subject::Window(window_id)))?;

        let tabs: Vec<TabId> = self
            .tab_windows
            .iter()
            .filter(|entry| *entry.value() == window_id)
            .map(|entry| entry.key().clone())
            .collect();
        for tab in &tabs {
            if let Err(e) = self.conn.call("Target.closeTarget", json!({"targetId": tab.as_str()})).await {
                debug!(tab_id = %tab, error = %e, "close during window removal failed");
            }
            self.forget_tab(tab);
        }
        self.active_tabs.remove(&window_id);
        Ok(())
    }

    async fn create_tab(&self, spec: TabSpec) -> Result<TabInfo, BrowserError> {
        if let Some(anchor) = self.active_tabs.get(&spec.window_id).map(|t| t.clone()) {
            self.activate(&anchor).await?;
        }
        let result = self
            .conn
            .call(
                "Target.createTarget",
                json!({"url": spec.url, "background": !spec.active}),
            )
            .await
            .map_err(|e| host_error(e, Subject::Window(spec.window_id)))?;
        let tab_id = target_id(&result)?;
        let window_id = self.window_for(&tab_id).await?;
        if window_id != spec.window_id {
            warn!(tab_id = %tab_id, requested = %spec.window_id, actual = %window_id, "tab opened outside requested window");
        }
        self.tab_windows.insert(tab_id.clone(), window_id);
        if spec.active {
            self.active_tabs.insert(window_id, tab_id.clone());
        }
        Ok(TabInfo {
            id: tab_id,
            window_id: Some(window_id),
            url: spec.url,
            status: TabLoadStatus::Loading,
        })
    }

    async fn get_tab(&self, tab_id: &TabId) -> Result<TabInfo, BrowserError> {
        let info = self
            .conn
            .call("Target.getTargetInfo", json!({"targetId": tab_id.as_str()}))
            .await
            .map_err(|e| host_error(e, Subject::Tab(tab_id)))?;
        let url = info["targetInfo"]["url"].as_str().unwrap_or_default().to_string();

        let status = match self.evaluate(tab_id, "document.readyState").await {
            Ok(Value::String(state)) if state == "complete" => TabLoadStatus::Complete,
            Ok(_) => TabLoadStatus::Loading,
            Err(ChannelError::Browser(e @ BrowserError::TabNotFound(_))) => return Err(e),
            Err(_) => TabLoadStatus::Loading,
        };

        Ok(TabInfo {
            id: tab_id.clone(),
            window_id: self.tab_windows.get(tab_id).map(|w| *w),
            url,
            status,
        })
    }

    async fn update_tab(&self, tab_id: &TabId, update: TabUpdate) -> Result<(), BrowserError> {
        if let Some(url) = update.url {
            let session = self.session(tab_id).await?;
            self.conn
                .call_session(&session, "Page.navigate", json!({"url": url}))
                .await
                .map_err(|e| host_error(e, Subject::Tab(tab_id)))?;
        }
        if update.active == Some(true) {
            self.activate(tab_id).await?;
        }
        Ok(())
    }

    async fn remove_tab(&self, tab_id: &TabId) -> Result<(), BrowserError> {
        let result = self
            .conn
            .call("Target.closeTarget", json!({"targetId": tab_id.as_str()}))
            .await
            .map_err(|e| host_error(e, Subject::Tab(tab_id)));
        self.forget_tab(tab_id);
        result.map(|_| ())
    }

    async fn heartbeat(&self) -> Result<(), BrowserError> {
        self.conn
            .call("Browser.getVersion", json!({}))
            .await
            .map(|_| ())
            .map_err(|e| host_error(e, Subject::None))
    }
}

#[async_trait]
impl ExecutorChannel for CdpBrowser {
    async fn send(&self, tab_id: &TabId, request: &ExecutorRequest) -> Result<Value, ChannelError> {
        let payload = serde_json::to_string(request).map_err(|e| ChannelError::Disconnected(e.to_string()))?;
        let expression = format!(
            "(async () => {{ const ex = window.{EXECUTOR_GLOBAL}; \
             if (!ex || typeof ex.handle !== 'function') return {{ {MISSING_MARKER}: true }}; \
             return await ex.handle({payload}); }})()"
        );
        let value = self.evaluate(tab_id, &expression).await?;
        if value.get(MISSING_MARKER).and_then(Value::as_bool) == Some(true) {
            return Err(ChannelError::ReceiverMissing(format!("no executor in tab {tab_id}")));
        }
        Ok(value)
    }

    async fn attach(&self, tab_id: &TabId, platform: Platform) -> Result<(), ChannelError> {
        let path = executor_script_path(&self.scripts_dir, platform);
        let source = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| BrowserError::Host(format!("read {}: {e}", path.display())))?;
        self.evaluate(tab_id, &source).await?;
        debug!(tab_id = %tab_id, platform = %platform, "executor attached");
        Ok(())
    }
}

fn host_error(err: CdpError, subject: Subject<'_>) -> BrowserError {
    match err {
        CdpError::Protocol(msg) => classify_host_error(&msg, subject),
        CdpError::Timeout { method, timeout } => BrowserError::Timeout {
            timeout,
            context: format!("CDP {method}"),
        },
        other => BrowserError::Host(other.to_string()),
    }
}

fn target_id(result: &Value) -> Result<TabId, BrowserError> {
    result["targetId"]
        .as_str()
        .map(TabId::from_raw)
        .ok_or_else(|| BrowserError::Host("createTarget returned no targetId".into()))
}

fn window_state(state: WindowState) -> &'static str {
    match state {
        WindowState::Normal => "normal",
        WindowState::Minimized => "minimized",
        WindowState::Maximized => "maximized",
        WindowState::Fullscreen => "fullscreen",
    }
}

/// Drop cached sessions for targets that go away.
async fn watch_targets(
    mut events: tokio::sync::broadcast::Receiver<crate::connection::CdpEvent>,
    sessions: Arc<DashMap<TabId, String>>,
) {
    loop {
        match events.recv().await {
            Ok(event) => match event.method.as_str() {
                "Target.detachedFromTarget" => {
                    if let Some(session) = event.params["sessionId"].as_str() {
                        sessions.retain(|_, s| s != session);
                    }
                }
                "Target.targetDestroyed" => {
                    if let Some(target) = event.params["targetId"].as_str() {
                        sessions.remove(&TabId::from_raw(target));
                    }
                }
                _ => {}
            },
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "target watcher lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Poll `/json/version` until the browser exposes its DevTools endpoint.
async fn discover_ws_url(port: u16, mut child: Option<&mut Child>) -> Result<String, CdpError> {
    let url = format!("http://127.0.0.1:{port}/json/version");

    for _ in 0..100 {
        if let Some(child) = child.as_deref_mut() {
            if let Some(status) = child
                .try_wait()
                .map_err(|e| CdpError::Launch(format!("wait: {e}")))?
            {
                return Err(CdpError::Launch(format!("browser exited early with {status}")));
            }
        }

        if let Ok(resp) = reqwest::get(&url).await {
            if let Ok(version) = resp.json::<Value>().await {
                if let Some(ws_url) = version["webSocketDebuggerUrl"].as_str() {
                    return Ok(ws_url.to_string());
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    Err(CdpError::Connect(format!(
        "no DevTools endpoint on port {port} after 10 seconds"
    )))
}

fn executor_script_path(scripts_dir: &Path, platform: Platform) -> PathBuf {
    scripts_dir.join(platform.executor_script())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::FakeDevTools;

    async fn browser_with(fake: &FakeDevTools, scripts_dir: PathBuf) -> CdpBrowser {
        CdpBrowser::from_ws_url(&fake.url, scripts_dir, Duration::from_secs(5))
            .await
            .unwrap()
    }

    fn standard(method: &str, params: &Value) -> Result<Value, String> {
        match method {
            "Target.createTarget" => {
                let id = if params["newWindow"] == true { "WIN-TAB" } else { "TAB-2" };
                Ok(json!({"targetId": id}))
            }
            "Browser.getWindowForTarget" => Ok(json!({"windowId": 7, "bounds": {}})),
            "Target.attachToTarget" => Ok(json!({"sessionId": format!("S-{}", params["targetId"].as_str().unwrap_or_default())})),
            "Target.getTargetInfo" => Ok(json!({"targetInfo": {"url": "https://claude.ai/new"}})),
            _ => Ok(json!({})),
        }
    }

    #[tokio::test]
    async fn create_window_resolves_window_id() {
        let fake = FakeDevTools::start(Arc::new(standard)).await;
        let browser = browser_with(&fake, PathBuf::from("/nonexistent")).await;

        let created = browser
            .create_window(WindowSpec {
                url: "https://chatgpt.com".into(),
                width: 1200,
                height: 800,
                focused: true,
            })
            .await
            .unwrap();
        assert_eq!(created.window_id, WindowId(7));
        assert_eq!(created.tab_id, TabId::from_raw("WIN-TAB"));

        let calls = fake.calls.lock();
        let create = calls.iter().find(|(m, _, _)| m == "Target.createTarget").unwrap();
        assert_eq!(create.1["newWindow"], true);
        assert_eq!(create.1["width"], 1200);
    }

    #[tokio::test]
    async fn create_tab_focuses_window_first() {
        let fake = FakeDevTools::start(Arc::new(standard)).await;
        let browser = browser_with(&fake, PathBuf::from("/nonexistent")).await;
        let created = browser
            .create_window(WindowSpec {
                url: "about:blank".into(),
                width: 800,
                height: 600,
                focused: true,
            })
            .await
            .unwrap();

        let tab = browser
            .create_tab(TabSpec {
                url: "https://claude.ai/new".into(),
                window_id: created.window_id,
                active: false,
            })
            .await
            .unwrap();
        assert_eq!(tab.id, TabId::from_raw("TAB-2"));
        assert_eq!(tab.window_id, Some(WindowId(7)));
        assert_eq!(tab.status, TabLoadStatus::Loading);

        let methods = fake.methods();
        let activate = methods.iter().rposition(|m| m == "Target.activateTarget").unwrap();
        let create = methods.iter().rposition(|m| m == "Target.createTarget").unwrap();
        assert!(activate < create);
    }

    #[tokio::test]
    async fn tab_strip_race_is_tagged_transient() {
        let fake = FakeDevTools::start(Arc::new(|method: &str, params: &Value| match method {
            "Target.createTarget" => Err("Tabs cannot be edited right now (user may be dragging a tab).".into()),
            other => standard(other, params),
        }))
        .await;
        let browser = browser_with(&fake, PathBuf::from("/nonexistent")).await;

        let err = browser
            .create_tab(TabSpec {
                url: "https://gemini.google.com/app".into(),
                window_id: WindowId(7),
                active: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::TabEditingBlocked(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn closing_unknown_tab_is_tab_not_found() {
        let fake = FakeDevTools::start(Arc::new(|method: &str, params: &Value| match method {
            "Target.closeTarget" => Err("No target with given id found".into()),
            other => standard(other, params),
        }))
        .await;
        let browser = browser_with(&fake, PathBuf::from("/nonexistent")).await;

        let tab = TabId::from_raw("GONE");
        let err = browser.remove_tab(&tab).await.unwrap_err();
        assert_eq!(err, BrowserError::TabNotFound(tab));
    }

    #[tokio::test]
    async fn get_tab_reads_ready_state() {
        let fake = FakeDevTools::start(Arc::new(|method: &str, params: &Value| match method {
            "Runtime.evaluate" => Ok(json!({"result": {"type": "string", "value": "complete"}})),
            other => standard(other, params),
        }))
        .await;
        let browser = browser_with(&fake, PathBuf::from("/nonexistent")).await;

        let info = browser.get_tab(&TabId::from_raw("T9")).await.unwrap();
        assert_eq!(info.status, TabLoadStatus::Complete);
        assert_eq!(info.url, "https://claude.ai/new");

        let calls = fake.calls.lock();
        let eval = calls.iter().find(|(m, _, _)| m == "Runtime.evaluate").unwrap();
        assert_eq!(eval.2.as_deref(), Some("S-T9"));
    }

    #[tokio::test]
    async fn exit_fullscreen_sets_normal_state() {
        let fake = FakeDevTools::start(Arc::new(standard)).await;
        let browser = browser_with(&fake, PathBuf::from("/nonexistent")).await;

        browser
            .update_window(
                WindowId(7),
                WindowUpdate {
                    focused: None,
                    state: Some(WindowState::Normal),
                },
            )
            .await
            .unwrap();

        let calls = fake.calls.lock();
        let bounds = calls.iter().find(|(m, _, _)| m == "Browser.setWindowBounds").unwrap();
        assert_eq!(bounds.1["windowId"], 7);
        assert_eq!(bounds.1["bounds"]["windowState"], "normal");
    }

    #[tokio::test]
    async fn focusing_unknown_window_fails() {
        let fake = FakeDevTools::start(Arc::new(standard)).await;
        let browser = browser_with(&fake, PathBuf::from("/nonexistent")).await;
        let err = browser
            .update_window(
                WindowId(99),
                WindowUpdate {
                    focused: Some(true),
                    state: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, BrowserError::WindowNotFound(WindowId(99)));
    }

    #[tokio::test]
    async fn send_reports_missing_executor() {
        let fake = FakeDevTools::start(Arc::new(|method: &str, params: &Value| match method {
            "Runtime.evaluate" => Ok(json!({"result": {"type": "object", "value": {"__columbusMissing": true}}})),
            other => standard(other, params),
        }))
        .await;
        let browser = browser_with(&fake, PathBuf::from("/nonexistent")).await;

        let err = browser
            .send(&TabId::from_raw("T1"), &ExecutorRequest::CheckLogin)
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::ReceiverMissing(_)));
    }

    #[tokio::test]
    async fn send_returns_executor_reply() {
        let fake = FakeDevTools::start(Arc::new(|method: &str, params: &Value| match method {
            "Runtime.evaluate" => Ok(json!({"result": {"type": "object", "value": {"loggedIn": true}}})),
            other => standard(other, params),
        }))
        .await;
        let browser = browser_with(&fake, PathBuf::from("/nonexistent")).await;

        let reply = browser
            .send(&TabId::from_raw("T1"), &ExecutorRequest::CheckLogin)
            .await
            .unwrap();
        assert_eq!(reply["loggedIn"], true);

        let calls = fake.calls.lock();
        let eval = calls.iter().find(|(m, _, _)| m == "Runtime.evaluate").unwrap();
        let expression = eval.1["expression"].as_str().unwrap();
        assert!(expression.contains("\"type\":\"CHECK_LOGIN\""));
        assert_eq!(eval.1["awaitPromise"], true);
    }

    #[tokio::test]
    async fn thrown_exception_is_disconnect() {
        let fake = FakeDevTools::start(Arc::new(|method: &str, params: &Value| match method {
            "Runtime.evaluate" => Ok(json!({
                "result": {"type": "object"},
                "exceptionDetails": {"text": "Uncaught", "exception": {"description": "TypeError: x is undefined"}}
            })),
            other => standard(other, params),
        }))
        .await;
        let browser = browser_with(&fake, PathBuf::from("/nonexistent")).await;
        let err = browser
            .send(&TabId::from_raw("T1"), &ExecutorRequest::CheckLogin)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("TypeError"));
    }

    #[tokio::test]
    async fn attach_evaluates_platform_script() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("perplexity.js"), "window.__columbusExecutor = {};").unwrap();
        let fake = FakeDevTools::start(Arc::new(standard)).await;
        let browser = browser_with(&fake, dir.path().to_path_buf()).await;

        browser
            .attach(&TabId::from_raw("P1"), Platform::Perplexity)
            .await
            .unwrap();

        let calls = fake.calls.lock();
        let eval = calls.iter().find(|(m, _, _)| m == "Runtime.evaluate").unwrap();
        assert_eq!(eval.1["expression"], "window.__columbusExecutor = {};");
    }

    #[tokio::test]
    async fn attach_without_script_fails() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeDevTools::start(Arc::new(standard)).await;
        let browser = browser_with(&fake, dir.path().to_path_buf()).await;
        let err = browser
            .attach(&TabId::from_raw("P1"), Platform::Gemini)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("gemini.js"));
    }

    #[tokio::test]
    async fn heartbeat_round_trips() {
        let fake = FakeDevTools::start(Arc::new(standard)).await;
        let browser = browser_with(&fake, PathBuf::from("/nonexistent")).await;
        browser.heartbeat().await.unwrap();
        assert!(fake.methods().contains(&"Browser.getVersion".to_string()));
    }

    #[test]
    fn script_path_uses_platform_file_name() {
        assert_eq!(
            executor_script_path(Path::new("/opt/columbus/executors"), Platform::ChatGpt),
            PathBuf::from("/opt/columbus/executors/chatgpt.js")
        );
    }
}
