//! Deterministic doubles for the host browser and the backend.
//!
//! [`MockBrowser`] implements both [`BrowserHost`] and [`ExecutorChannel`]:
//! tabs know their destination from their URL and answer executor requests
//! according to a per-destination [`MockPlatform`] script. Every call is
//! recorded for assertions.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use columbus_core::backend::{Product, Prompt, PromptBundle, PromptSource, ResultSink, ScanResultPayload};
use columbus_core::errors::{BackendError, BrowserError, ChannelError};
use columbus_core::executor::{CollectedResponse, ExecutorRequest};
use columbus_core::host::{
    BrowserHost, CreatedWindow, ExecutorChannel, TabInfo, TabLoadStatus, TabSpec, TabUpdate, WindowSpec,
    WindowUpdate,
};
use columbus_core::ids::{ProductId, PromptId, ScanSessionId, TabId, WindowId};
use columbus_core::platform::Platform;

/// How one destination's executor behaves.
#[derive(Clone, Debug)]
pub struct MockPlatform {
    pub logged_in: bool,
    pub submit_ok: bool,
    /// Replies to `COLLECT_RESPONSE` in order; the last one repeats.
    pub collect: Vec<CollectedResponse>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self {
            logged_in: true,
            submit_ok: true,
            collect: vec![CollectedResponse {
                success: true,
                response_text: "Acme is a solid choice.".into(),
                brand_mentioned: true,
                ..Default::default()
            }],
        }
    }
}

impl MockPlatform {
    pub fn logged_out() -> Self {
        Self {
            logged_in: false,
            ..Self::default()
        }
    }

    pub fn rejecting_submissions() -> Self {
        Self {
            submit_ok: false,
            ..Self::default()
        }
    }

    pub fn collecting(responses: Vec<CollectedResponse>) -> Self {
        Self {
            collect: responses,
            ..Self::default()
        }
    }

    /// Every collection attempt reports failure.
    pub fn never_answers() -> Self {
        Self::collecting(vec![CollectedResponse {
            success: false,
            error: Some("response not ready".into()),
            ..Default::default()
        }])
    }
}

/// Host operation that can be scripted to fail.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum MockOp {
    CreateWindow,
    UpdateWindow,
    CreateTab,
    GetTab,
    UpdateTab,
    RemoveTab,
}

#[derive(Clone, Debug)]
struct MockTab {
    window_id: WindowId,
    url: String,
    platform: Option<Platform>,
}

#[derive(Default)]
struct MockState {
    next_id: i64,
    windows: HashSet<WindowId>,
    tabs: HashMap<TabId, MockTab>,
    attached: HashSet<TabId>,
    collect_calls: HashMap<Platform, usize>,
    failures: HashMap<MockOp, VecDeque<BrowserError>>,
    requests: Vec<(Platform, &'static str)>,
    window_updates: Vec<(WindowId, WindowUpdate)>,
    attach_calls: Vec<(TabId, Platform)>,
    heartbeats: usize,
    tabs_created: usize,
}

pub struct MockBrowser {
    state: Mutex<MockState>,
    platforms: Mutex<HashMap<Platform, MockPlatform>>,
    require_attach: bool,
    tabs_load: bool,
}

impl Default for MockBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBrowser {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            platforms: Mutex::new(HashMap::new()),
            require_attach: false,
            tabs_load: true,
        }
    }

    pub fn with_platform(self, platform: Platform, behaviour: MockPlatform) -> Self {
        self.platforms.lock().insert(platform, behaviour);
        self
    }

    /// New tabs have no executor until [`ExecutorChannel::attach`] runs.
    pub fn requiring_attach(mut self) -> Self {
        self.require_attach = true;
        self
    }

    /// Tabs never finish loading.
    pub fn with_stuck_tabs(mut self) -> Self {
        self.tabs_load = false;
        self
    }

    /// Fail the next `times` calls of `op` with `error`.
    pub fn fail_next(&self, op: MockOp, error: BrowserError, times: usize) {
        let mut state = self.state.lock();
        let queue = state.failures.entry(op).or_default();
        queue.extend(std::iter::repeat(error).take(times));
    }

    /// Open a tab directly, bypassing failure scripting.
    pub fn open_tab(&self, window_id: WindowId, url: &str) -> TabId {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = TabId::from_raw(format!("tab-{}", state.next_id));
        state.tabs.insert(
            id.clone(),
            MockTab {
                window_id,
                url: url.to_string(),
                platform: Platform::from_url(url),
            },
        );
        id
    }

    pub fn open_tabs(&self) -> usize {
        self.state.lock().tabs.len()
    }

    pub fn open_windows(&self) -> usize {
        self.state.lock().windows.len()
    }

    pub fn tabs_created(&self) -> usize {
        self.state.lock().tabs_created
    }

    pub fn heartbeats(&self) -> usize {
        self.state.lock().heartbeats
    }

    /// Executor requests delivered, as (destination, request type).
    pub fn requests(&self) -> Vec<(Platform, &'static str)> {
        self.state.lock().requests.clone()
    }

    pub fn request_count(&self, platform: Platform, kind: &str) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|(p, k)| *p == platform && *k == kind)
            .count()
    }

    pub fn window_updates(&self) -> Vec<(WindowId, WindowUpdate)> {
        self.state.lock().window_updates.clone()
    }

    pub fn attach_calls(&self) -> Vec<(TabId, Platform)> {
        self.state.lock().attach_calls.clone()
    }

    fn behaviour(&self, platform: Platform) -> MockPlatform {
        self.platforms.lock().get(&platform).cloned().unwrap_or_default()
    }

    fn scripted_failure(state: &mut MockState, op: MockOp) -> Result<(), BrowserError> {
        match state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BrowserHost for MockBrowser {
    async fn create_window(&self, spec: WindowSpec) -> Result<CreatedWindow, BrowserError> {
        let mut state = self.state.lock();
        Self::scripted_failure(&mut state, MockOp::CreateWindow)?;
        state.next_id += 1;
        let window_id = WindowId(state.next_id);
        state.windows.insert(window_id);
        state.next_id += 1;
        let tab_id = TabId::from_raw(format!("tab-{}", state.next_id));
        state.tabs.insert(
            tab_id.clone(),
            MockTab {
                window_id,
                platform: Platform::from_url(&spec.url),
                url: spec.url,
            },
        );
        state.tabs_created += 1;
        Ok(CreatedWindow { window_id, tab_id })
    }

    async fn update_window(&self, window_id: WindowId, update: WindowUpdate) -> Result<(), BrowserError> {
        let mut state = self.state.lock();
        state.window_updates.push((window_id, update));
        Self::scripted_failure(&mut state, MockOp::UpdateWindow)?;
        if !state.windows.contains(&window_id) {
            return Err(BrowserError::WindowNotFound(window_id));
        }
        Ok(())
    }

    async fn remove_window(&self, window_id: WindowId) -> Result<(), BrowserError> {
        let mut state = self.state.lock();
        if !state.windows.remove(&window_id) {
            return Err(BrowserError::WindowNotFound(window_id));
        }
        state.tabs.retain(|_, tab| tab.window_id != window_id);
        Ok(())
    }

    async fn create_tab(&self, spec: TabSpec) -> Result<TabInfo, BrowserError> {
        let mut state = self.state.lock();
        Self::scripted_failure(&mut state, MockOp::CreateTab)?;
        if !state.windows.contains(&spec.window_id) {
            return Err(BrowserError::WindowNotFound(spec.window_id));
        }
        state.next_id += 1;
        let id = TabId::from_raw(format!("tab-{}", state.next_id));
        state.tabs.insert(
            id.clone(),
            MockTab {
                window_id: spec.window_id,
                url: spec.url.clone(),
                platform: Platform::from_url(&spec.url),
            },
        );
        state.tabs_created += 1;
        Ok(TabInfo {
            id,
            window_id: Some(spec.window_id),
            url: spec.url,
            status: TabLoadStatus::Loading,
        })
    }

    async fn get_tab(&self, tab_id: &TabId) -> Result<TabInfo, BrowserError> {
        let mut state = self.state.lock();
        Self::scripted_failure(&mut state, MockOp::GetTab)?;
        let tab = state
            .tabs
            .get(tab_id)
            .ok_or_else(|| BrowserError::TabNotFound(tab_id.clone()))?;
        Ok(TabInfo {
            id: tab_id.clone(),
            window_id: Some(tab.window_id),
            url: tab.url.clone(),
            status: if self.tabs_load {
                TabLoadStatus::Complete
            } else {
                TabLoadStatus::Loading
            },
        })
    }

    async fn update_tab(&self, tab_id: &TabId, update: TabUpdate) -> Result<(), BrowserError> {
        let mut state = self.state.lock();
        Self::scripted_failure(&mut state, MockOp::UpdateTab)?;
        let tab = state
            .tabs
            .get_mut(tab_id)
            .ok_or_else(|| BrowserError::TabNotFound(tab_id.clone()))?;
        if let Some(url) = update.url {
            tab.platform = Platform::from_url(&url);
            tab.url = url;
        }
        Ok(())
    }

    async fn remove_tab(&self, tab_id: &TabId) -> Result<(), BrowserError> {
        let mut state = self.state.lock();
        Self::scripted_failure(&mut state, MockOp::RemoveTab)?;
        state.attached.remove(tab_id);
        state
            .tabs
            .remove(tab_id)
            .map(|_| ())
            .ok_or_else(|| BrowserError::TabNotFound(tab_id.clone()))
    }

    async fn heartbeat(&self) -> Result<(), BrowserError> {
        self.state.lock().heartbeats += 1;
        Ok(())
    }
}

#[async_trait]
impl ExecutorChannel for MockBrowser {
    async fn send(&self, tab_id: &TabId, request: &ExecutorRequest) -> Result<Value, ChannelError> {
        let platform = {
            let mut state = self.state.lock();
            let tab = state
                .tabs
                .get(tab_id)
                .ok_or_else(|| BrowserError::TabNotFound(tab_id.clone()))?;
            let platform = tab
                .platform
                .ok_or_else(|| ChannelError::ReceiverMissing(format!("no executor for {}", tab.url)))?;
            if self.require_attach && !state.attached.contains(tab_id) {
                return Err(ChannelError::ReceiverMissing(format!("tab {tab_id}")));
            }
            state.requests.push((platform, request.kind()));
            platform
        };

        let behaviour = self.behaviour(platform);
        let reply = match request {
            ExecutorRequest::CheckLogin => json!({"loggedIn": behaviour.logged_in}),
            ExecutorRequest::SubmitPrompt { .. } if behaviour.submit_ok => json!({"success": true}),
            ExecutorRequest::SubmitPrompt { .. } => json!({"success": false, "error": "input not found"}),
            ExecutorRequest::CollectResponse { .. } => {
                let mut state = self.state.lock();
                let calls = state.collect_calls.entry(platform).or_default();
                let index = (*calls).min(behaviour.collect.len().saturating_sub(1));
                *calls += 1;
                match behaviour.collect.get(index) {
                    Some(response) => serde_json::to_value(response)
                        .map_err(|e| ChannelError::Disconnected(e.to_string()))?,
                    None => Value::Null,
                }
            }
        };
        Ok(reply)
    }

    async fn attach(&self, tab_id: &TabId, platform: Platform) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        if !state.tabs.contains_key(tab_id) {
            return Err(BrowserError::TabNotFound(tab_id.clone()).into());
        }
        state.attached.insert(tab_id.clone());
        state.attach_calls.push((tab_id.clone(), platform));
        Ok(())
    }
}

/// Prompt source and result sink that records every call.
pub struct MockBackend {
    bundle: Result<PromptBundle, BackendError>,
    fail_results: bool,
    submitted: Mutex<Vec<ScanResultPayload>>,
    finalized: Mutex<Vec<(ScanSessionId, ProductId)>>,
}

impl MockBackend {
    pub fn new(bundle: PromptBundle) -> Self {
        Self {
            bundle: Ok(bundle),
            fail_results: false,
            submitted: Mutex::new(Vec::new()),
            finalized: Mutex::new(Vec::new()),
        }
    }

    /// A product with `prompt_count` prompts and one competitor.
    pub fn with_prompts(prompt_count: usize) -> Self {
        Self::new(sample_bundle(prompt_count))
    }

    pub fn failing(error: BackendError) -> Self {
        Self {
            bundle: Err(error),
            ..Self::with_prompts(0)
        }
    }

    /// Result and finalize calls fail; prompts still load.
    pub fn rejecting_results(mut self) -> Self {
        self.fail_results = true;
        self
    }

    pub fn submitted(&self) -> Vec<ScanResultPayload> {
        self.submitted.lock().clone()
    }

    pub fn finalized(&self) -> Vec<(ScanSessionId, ProductId)> {
        self.finalized.lock().clone()
    }
}

pub fn sample_bundle(prompt_count: usize) -> PromptBundle {
    PromptBundle {
        product: Product {
            id: ProductId::from_raw("prod-1"),
            name: "Acme CRM".into(),
            brand: "Acme".into(),
            domain: Some("acme.test".into()),
        },
        prompts: (1..=prompt_count)
            .map(|i| Prompt {
                id: PromptId::from_raw(format!("p{i}")),
                text: format!("What is the best CRM, take {i}?"),
                category: None,
            })
            .collect(),
        competitors: vec!["Globex".into()],
    }
}

#[async_trait]
impl PromptSource for MockBackend {
    async fn fetch_prompts(&self, _product_id: &ProductId) -> Result<PromptBundle, BackendError> {
        self.bundle.clone()
    }
}

#[async_trait]
impl ResultSink for MockBackend {
    async fn submit_result(&self, payload: &ScanResultPayload) -> Result<(), BackendError> {
        self.submitted.lock().push(payload.clone());
        if self.fail_results {
            return Err(BackendError::Network("connection reset".into()));
        }
        Ok(())
    }

    async fn finalize(&self, scan_session_id: &ScanSessionId, product_id: &ProductId) -> Result<(), BackendError> {
        self.finalized
            .lock()
            .push((scan_session_id.clone(), product_id.clone()));
        if self.fail_results {
            return Err(BackendError::Api {
                status: 500,
                message: "finalize failed".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tabs_answer_per_destination() {
        let browser = MockBrowser::new().with_platform(Platform::Claude, MockPlatform::logged_out());
        let window = browser
            .create_window(WindowSpec {
                url: "about:blank".into(),
                width: 800,
                height: 600,
                focused: true,
            })
            .await
            .unwrap();
        let claude = browser.open_tab(window.window_id, Platform::Claude.home_url());
        let gemini = browser.open_tab(window.window_id, Platform::Gemini.home_url());

        let reply = browser.send(&claude, &ExecutorRequest::CheckLogin).await.unwrap();
        assert_eq!(reply["loggedIn"], false);
        let reply = browser.send(&gemini, &ExecutorRequest::CheckLogin).await.unwrap();
        assert_eq!(reply["loggedIn"], true);

        let err = browser
            .send(&window.tab_id, &ExecutorRequest::CheckLogin)
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::ReceiverMissing(_)));
    }

    #[tokio::test]
    async fn removing_window_closes_its_tabs() {
        let browser = MockBrowser::new();
        let window = browser
            .create_window(WindowSpec {
                url: "about:blank".into(),
                width: 800,
                height: 600,
                focused: true,
            })
            .await
            .unwrap();
        browser.open_tab(window.window_id, "https://claude.ai/new");
        assert_eq!(browser.open_tabs(), 2);
        browser.remove_window(window.window_id).await.unwrap();
        assert_eq!(browser.open_tabs(), 0);
        assert_eq!(browser.open_windows(), 0);
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let browser = MockBrowser::new();
        browser.fail_next(MockOp::GetTab, BrowserError::Host("boom".into()), 1);
        let err = browser.get_tab(&TabId::from_raw("x")).await.unwrap_err();
        assert_eq!(err, BrowserError::Host("boom".into()));
        let err = browser.get_tab(&TabId::from_raw("x")).await.unwrap_err();
        assert!(matches!(err, BrowserError::TabNotFound(_)));
    }

    #[tokio::test]
    async fn collect_replies_repeat_last() {
        let browser = MockBrowser::new().with_platform(
            Platform::Gemini,
            MockPlatform::collecting(vec![
                CollectedResponse::default(),
                CollectedResponse {
                    success: true,
                    ..Default::default()
                },
            ]),
        );
        let tab = browser.open_tab(WindowId(1), "https://gemini.google.com/app");
        let request = ExecutorRequest::CollectResponse {
            brand: "Acme".into(),
            competitors: vec![],
        };
        let first = browser.send(&tab, &request).await.unwrap();
        let second = browser.send(&tab, &request).await.unwrap();
        let third = browser.send(&tab, &request).await.unwrap();
        assert_eq!(first["success"], false);
        assert_eq!(second["success"], true);
        assert_eq!(third["success"], true);
        assert_eq!(browser.request_count(Platform::Gemini, "COLLECT_RESPONSE"), 3);
    }

    #[tokio::test]
    async fn backend_records_calls() {
        let backend = MockBackend::with_prompts(2).rejecting_results();
        let bundle = backend.fetch_prompts(&ProductId::from_raw("prod-1")).await.unwrap();
        assert_eq!(bundle.prompts.len(), 2);
        assert!(backend
            .finalize(&ScanSessionId::from_raw("s"), &ProductId::from_raw("prod-1"))
            .await
            .is_err());
        assert_eq!(backend.finalized().len(), 1);
    }
}
