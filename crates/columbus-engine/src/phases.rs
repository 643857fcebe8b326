//! Phase driver: runs one session through initializing, submitting,
//! waiting, collecting and complete.
//!
//! Every session mutation goes through the slot keyed by this driver's
//! session id. Once a cancel has emptied the slot (or a newer session has
//! replaced it) those calls return `None` and the driver stops without
//! touching the browser again.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use columbus_core::backend::ScanResultPayload;
use columbus_core::events::ScanEvent;
use columbus_core::executor::{CollectedResponse, ExecutorRequest, LoginStatus, SubmitAck};
use columbus_core::host::TabUpdate;
use columbus_core::ids::{PromptId, ScanSessionId, TabId, WindowId};
use columbus_core::platform::Platform;
use columbus_core::scan::{ItemStatus, PlatformStatus, ScanPhase, ScanStatus};

use crate::error::ScanError;
use crate::orchestrator::ScanContext;
use crate::stats::compute_stats;

const PLACEHOLDER_URL: &str = "about:blank";

enum Flow {
    Continue,
    Stop,
}

pub(crate) struct ScanDriver {
    ctx: Arc<ScanContext>,
    id: ScanSessionId,
}

impl ScanDriver {
    pub(crate) fn new(ctx: Arc<ScanContext>, id: ScanSessionId) -> Self {
        Self { ctx, id }
    }

    pub(crate) async fn run(self) {
        let mut phase = ScanPhase::Initializing;
        loop {
            let flow = match phase {
                ScanPhase::Initializing => self.initialize().await,
                ScanPhase::Submitting => self.submit().await,
                ScanPhase::Waiting => self.wait().await,
                ScanPhase::Collecting => self.collect().await,
                ScanPhase::Complete => self.complete().await,
            };
            match flow {
                Ok(Flow::Continue) => match phase.next() {
                    Some(next) if self.enter(next) => phase = next,
                    Some(_) => return self.stopped(phase),
                    None => return,
                },
                Ok(Flow::Stop) => return self.stopped(phase),
                Err(e) => return self.fail(phase, e),
            }
        }
    }

    fn enter(&self, phase: ScanPhase) -> bool {
        if self.ctx.slot.update(&self.id, |s| s.phase = phase).is_none() {
            return false;
        }
        debug!(phase = phase.as_str(), "entering phase");
        self.ctx.report(&self.id, None);
        true
    }

    fn stopped(&self, phase: ScanPhase) {
        info!(phase = phase.as_str(), "scan no longer active, driver exiting");
    }

    fn fail(&self, phase: ScanPhase, e: ScanError) {
        error!(phase = phase.as_str(), error = %e, "scan failed");
        if self.ctx.slot.update(&self.id, |s| s.status = ScanStatus::Error).is_none() {
            return;
        }
        self.ctx.stop_keepalive();
        self.ctx.report(&self.id, None);
        self.ctx.reporter.emit(ScanEvent::ScanError {
            scan_session_id: self.id.clone(),
            message: e.to_string(),
        });
    }

    fn running(&self) -> bool {
        self.ctx.slot.is_running(&self.id)
    }

    fn window_id(&self) -> Result<Option<WindowId>, ScanError> {
        match self.ctx.slot.read_session(&self.id, |s| s.window_id) {
            Some(Some(window_id)) => Ok(Some(window_id)),
            Some(None) => Err(ScanError::Internal("scan window missing".into())),
            None => Ok(None),
        }
    }

    fn set_platform_status(&self, platform: Platform, status: PlatformStatus) {
        self.ctx
            .slot
            .update(&self.id, |s| s.set_platform_status(platform, status));
        self.ctx.report(&self.id, None);
    }

    // ── initializing ────────────────────────────────────────────────────

    async fn initialize(&self) -> Result<Flow, ScanError> {
        let Some(platforms) = self.ctx.slot.read_session(&self.id, |s| s.active_platforms()) else {
            return Ok(Flow::Stop);
        };
        let Some(first) = platforms.first().copied() else {
            return Err(ScanError::NoPlatforms);
        };

        let created = self.ctx.windows.create_scan_window(first.home_url()).await?;
        let window_id = created.window_id;
        if self
            .ctx
            .slot
            .update(&self.id, |s| s.window_id = Some(window_id))
            .is_none()
        {
            self.ctx.windows.close_window(window_id).await;
            return Ok(Flow::Stop);
        }
        info!(window_id = %window_id, "scan window open");

        let placeholder = self
            .ctx
            .windows
            .create_tab_with_retry(PLACEHOLDER_URL, window_id, false)
            .await?;
        if self
            .ctx
            .slot
            .update(&self.id, |s| s.placeholder_tab_id = Some(placeholder.id.clone()))
            .is_none()
        {
            self.ctx.windows.close_tab(&placeholder.id).await;
            return Ok(Flow::Stop);
        }

        let mut first_tab = Some(created.tab_id);
        for platform in platforms {
            if !self.running() {
                return Ok(Flow::Stop);
            }
            let tab_id = match first_tab.take() {
                Some(tab_id) => tab_id,
                None => {
                    self.ctx
                        .windows
                        .create_tab_with_retry(platform.home_url(), window_id, true)
                        .await?
                        .id
                }
            };

            let logged_in = self.check_login(platform, &tab_id).await;
            self.ctx.windows.close_tab(&tab_id).await;
            if logged_in {
                info!(platform = %platform, "logged in");
                self.ctx.report(&self.id, None);
            } else {
                warn!(platform = %platform, "not logged in, skipping destination");
                self.set_platform_status(platform, PlatformStatus::Skipped);
            }
        }
        Ok(Flow::Continue)
    }

    async fn check_login(&self, platform: Platform, tab_id: &TabId) -> bool {
        if let Err(e) = self.ctx.windows.wait_for_tab_ready(tab_id).await {
            warn!(platform = %platform, error = %e, "login check tab never loaded");
            return false;
        }
        match self
            .ctx
            .gateway
            .request::<LoginStatus>(tab_id, &ExecutorRequest::CheckLogin)
            .await
        {
            Ok(status) => status.logged_in,
            Err(e) => {
                warn!(platform = %platform, error = %e, "login check failed");
                false
            }
        }
    }

    // ── submitting ──────────────────────────────────────────────────────

    async fn submit(&self) -> Result<Flow, ScanError> {
        let Some(plan) = self.ctx.slot.read_session(&self.id, |s| {
            s.active_platforms()
                .into_iter()
                .map(|p| (p, s.platforms[&p].queue.len()))
                .collect::<Vec<_>>()
        }) else {
            return Ok(Flow::Stop);
        };
        let Some(window_id) = self.window_id()? else {
            return Ok(Flow::Stop);
        };

        for (platform, len) in plan {
            self.set_platform_status(platform, PlatformStatus::Submitting);
            for index in 0..len {
                if !self.running() {
                    return Ok(Flow::Stop);
                }
                if let Flow::Stop = self.submit_item(window_id, platform, index).await? {
                    return Ok(Flow::Stop);
                }
            }
            self.set_platform_status(platform, PlatformStatus::Waiting);
        }
        Ok(Flow::Continue)
    }

    #[instrument(skip_all, fields(platform = %platform, item = index))]
    async fn submit_item(&self, window_id: WindowId, platform: Platform, index: usize) -> Result<Flow, ScanError> {
        let Some(prompt) = self
            .ctx
            .slot
            .read_session(&self.id, |s| s.item(platform, index).map(|item| item.prompt_text.clone()))
        else {
            return Ok(Flow::Stop);
        };
        let Some(prompt) = prompt else {
            return Err(ScanError::Internal(format!("no work item {platform}#{index}")));
        };

        let tab = self
            .ctx
            .windows
            .create_tab_with_retry(platform.new_chat_url(), window_id, true)
            .await?;
        let tab_id = tab.id;

        let recorded = self.ctx.slot.update(&self.id, |s| {
            if let Some(item) = s.item_mut(platform, index) {
                item.tab_id = Some(tab_id.clone());
            }
        });
        if recorded.is_none() {
            self.ctx.windows.close_tab(&tab_id).await;
            return Ok(Flow::Stop);
        }

        match self.deliver_prompt(window_id, &tab_id, prompt).await {
            Ok(()) => {
                let marked = self.ctx.slot.update(&self.id, |s| {
                    s.item_mut(platform, index)
                        .map(|item| item.mark_submitted(tab_id.clone()))
                });
                match marked {
                    None => {
                        self.ctx.windows.close_tab(&tab_id).await;
                        return Ok(Flow::Stop);
                    }
                    Some(Some(Err(e))) => warn!(error = %e, "could not record submission"),
                    Some(_) => debug!("prompt submitted"),
                }
            }
            Err(e) => {
                warn!(error = %e, "submission failed");
                self.ctx.slot.update(&self.id, |s| {
                    if let Some(item) = s.item_mut(platform, index) {
                        let _ = item.mark_failed(e.to_string());
                        item.take_tab();
                    }
                });
                self.ctx.windows.close_tab(&tab_id).await;
            }
        }
        self.ctx.report(&self.id, None);
        Ok(Flow::Continue)
    }

    async fn deliver_prompt(&self, window_id: WindowId, tab_id: &TabId, prompt: String) -> Result<(), ScanError> {
        self.ctx.windows.wait_for_tab_ready(tab_id).await?;
        self.ctx.windows.focus_tab(window_id, tab_id).await?;
        let ack: SubmitAck = self
            .ctx
            .gateway
            .request(tab_id, &ExecutorRequest::SubmitPrompt { prompt })
            .await?;
        if !ack.success {
            return Err(ScanError::Executor(
                ack.error.unwrap_or_else(|| "prompt was not accepted".into()),
            ));
        }
        Ok(())
    }

    // ── waiting ─────────────────────────────────────────────────────────

    async fn wait(&self) -> Result<Flow, ScanError> {
        let Some(submitted) = self.ctx.slot.read_session(&self.id, |s| {
            s.platforms
                .values()
                .map(|state| state.count(|status| status == ItemStatus::Submitted))
                .sum::<usize>()
        }) else {
            return Ok(Flow::Stop);
        };
        if submitted == 0 {
            info!("nothing submitted, skipping wait");
            return Ok(Flow::Continue);
        }

        let wait = self.ctx.config.answer_wait;
        let deadline = Instant::now() + wait;
        info!(submitted, wait_secs = wait.as_secs(), "waiting for answers");

        let mut last_countdown = None;
        loop {
            let Some(skip) = self.ctx.slot.read_session(&self.id, |s| s.skip_wait) else {
                return Ok(Flow::Stop);
            };
            if skip {
                info!("wait cut short");
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let remaining = deadline - now;
            let countdown = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
            if last_countdown != Some(countdown) {
                self.ctx.report(&self.id, Some(countdown));
                last_countdown = Some(countdown);
            }
            tokio::time::sleep(self.ctx.config.wait_poll.min(remaining)).await;
        }
        Ok(Flow::Continue)
    }

    // ── collecting ──────────────────────────────────────────────────────

    async fn collect(&self) -> Result<Flow, ScanError> {
        let Some(plan) = self.ctx.slot.read_session(&self.id, |s| {
            s.active_platforms()
                .into_iter()
                .map(|p| {
                    let submitted: Vec<usize> = s.platforms[&p]
                        .queue
                        .iter()
                        .enumerate()
                        .filter(|(_, item)| item.status == ItemStatus::Submitted)
                        .map(|(index, _)| index)
                        .collect();
                    (p, submitted)
                })
                .collect::<Vec<_>>()
        }) else {
            return Ok(Flow::Stop);
        };
        let Some(window_id) = self.window_id()? else {
            return Ok(Flow::Stop);
        };

        if let Err(e) = self.ctx.windows.bring_window_to_foreground(window_id).await {
            warn!(window_id = %window_id, error = %e, "could not focus scan window");
        }

        for (platform, indices) in plan {
            self.set_platform_status(platform, PlatformStatus::Collecting);
            for index in indices {
                if !self.running() {
                    return Ok(Flow::Stop);
                }
                self.collect_item(window_id, platform, index).await;
            }
            self.set_platform_status(platform, PlatformStatus::Complete);
        }
        Ok(Flow::Continue)
    }

    #[instrument(skip_all, fields(platform = %platform, item = index))]
    async fn collect_item(&self, window_id: WindowId, platform: Platform, index: usize) {
        let Some(target) = self.ctx.slot.read_session(&self.id, |s| {
            let tab_id = s.item(platform, index)?.tab_id.clone()?;
            let request = ExecutorRequest::CollectResponse {
                brand: s.product.brand_or_name().to_string(),
                competitors: s.competitors.clone(),
            };
            Some((tab_id, request))
        }) else {
            return;
        };

        let outcome = match &target {
            Some((tab_id, request)) => {
                match self
                    .ctx
                    .windows
                    .safe_tab_update(tab_id, Some(window_id), TabUpdate::activate())
                    .await
                {
                    Ok(()) => self.collect_with_retries(platform, index, tab_id, request).await,
                    Err(e) => Err(e.into()),
                }
            }
            None => Err(ScanError::Internal("work item has no tab".into())),
        };

        match outcome {
            Ok(response) => {
                let payload = self.ctx.slot.update(&self.id, |s| {
                    let (product_id, session_id) = (s.product_id.clone(), s.scan_session_id.clone());
                    let item = s.item_mut(platform, index)?;
                    if let Err(e) = item.mark_collected(response.clone()) {
                        warn!(error = %e, "could not record collection");
                        return None;
                    }
                    item.take_tab();
                    Some(ScanResultPayload::new(&product_id, &session_id, item, &response))
                });
                if let Some(Some(payload)) = payload {
                    if let Err(e) = self.ctx.sink.submit_result(&payload).await {
                        warn!(error = %e, "failed to submit result");
                    }
                    self.emit_result(platform, &payload.prompt_id, true, response.brand_mentioned);
                }
            }
            Err(e) => {
                warn!(error = %e, "collection failed");
                let prompt_id = self.ctx.slot.update(&self.id, |s| {
                    let item = s.item_mut(platform, index)?;
                    let _ = item.mark_failed(e.to_string());
                    item.take_tab();
                    Some(item.prompt_id.clone())
                });
                if let Some(Some(prompt_id)) = prompt_id {
                    self.emit_result(platform, &prompt_id, false, false);
                }
            }
        }

        if let Some((tab_id, _)) = &target {
            self.ctx.windows.close_tab(tab_id).await;
        }
        self.ctx.report(&self.id, None);
    }

    /// One initial try plus `collect_max_retries` more, spaced by the retry delay.
    async fn collect_with_retries(
        &self,
        platform: Platform,
        index: usize,
        tab_id: &TabId,
        request: &ExecutorRequest,
    ) -> Result<CollectedResponse, ScanError> {
        let max_retries = self.ctx.config.collect_max_retries;
        let mut last_error = String::from("no response collected");
        for attempt in 0..=max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.ctx.config.collect_retry_delay).await;
                let still_ours = self
                    .ctx
                    .slot
                    .update(&self.id, |s| {
                        if let Some(item) = s.item_mut(platform, index) {
                            item.retry_count = attempt;
                        }
                    })
                    .is_some();
                if !still_ours {
                    return Err(ScanError::Internal("scan cancelled".into()));
                }
            }

            match self.ctx.gateway.request::<CollectedResponse>(tab_id, request).await {
                Ok(response) if response.success => return Ok(response),
                Ok(response) => {
                    last_error = response.error.unwrap_or_else(|| "no response collected".into());
                }
                Err(e) => last_error = e.to_string(),
            }
            debug!(attempt, error = %last_error, "collection attempt failed");
        }
        Err(ScanError::Executor(last_error))
    }

    fn emit_result(
        &self,
        platform: Platform,
        prompt_id: &PromptId,
        success: bool,
        brand_mentioned: bool,
    ) {
        self.ctx.reporter.emit(ScanEvent::ScanResult {
            scan_session_id: self.id.clone(),
            platform,
            prompt_id: prompt_id.clone(),
            success,
            brand_mentioned,
        });
    }

    // ── complete ────────────────────────────────────────────────────────

    async fn complete(&self) -> Result<Flow, ScanError> {
        let Some((product_id, started_at, placeholder, window_id)) = self.ctx.slot.read_session(&self.id, |s| {
            (
                s.product_id.clone(),
                s.started_at,
                s.placeholder_tab_id.clone(),
                s.window_id,
            )
        }) else {
            return Ok(Flow::Stop);
        };
        self.ctx.stop_keepalive();

        if let Err(e) = self.ctx.sink.finalize(&self.id, &product_id).await {
            warn!(error = %e, "failed to finalize scan");
        }

        let Some(stats) = self.ctx.slot.read_session(&self.id, compute_stats) else {
            return Ok(Flow::Stop);
        };
        if let Some(history) = &self.ctx.history {
            if let Err(e) = history.record_completed(&self.id, &product_id, started_at, Utc::now(), &stats) {
                warn!(error = %e, "failed to record scan history");
            }
        }

        if let Some(tab_id) = placeholder {
            self.ctx.windows.close_tab(&tab_id).await;
        }
        if let Some(window_id) = window_id {
            self.ctx.windows.close_window(window_id).await;
        }

        if self.ctx.slot.take(&self.id).is_none() {
            return Ok(Flow::Stop);
        }
        info!(
            total = stats.total_prompts,
            successful = stats.successful_prompts,
            mention_rate = stats.mention_rate,
            citation_rate = stats.citation_rate,
            "scan complete"
        );
        self.ctx.reporter.emit(ScanEvent::ScanComplete {
            scan_session_id: self.id.clone(),
            stats,
        });
        Ok(Flow::Continue)
    }
}
