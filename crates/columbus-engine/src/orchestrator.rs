//! Scan orchestrator: owns the session slot and the phase driver task.
//!
//! Control calls (`start_scan`, `status`, `cancel_scan`, `collect_now`) are
//! short and never wait on the driver. Cancellation is cooperative: the
//! driver notices at its next check point that the slot no longer holds its
//! session.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, info_span, instrument, warn, Instrument};

use columbus_core::backend::{PromptSource, ResultSink};
use columbus_core::events::{ScanEvent, StatusReport};
use columbus_core::host::{BrowserHost, ExecutorChannel};
use columbus_core::ids::{ProductId, ScanSessionId};
use columbus_core::platform::Platform;
use columbus_core::scan::{ScanSession, ScanStatus};
use columbus_settings::ScanSettings;
use columbus_store::ScanHistoryRepo;

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::keepalive::Keepalive;
use crate::messaging::MessagingGateway;
use crate::phases::ScanDriver;
use crate::progress::{progress_event, status_report, ProgressReporter};
use crate::queue::build_work_queues;
use crate::session::SessionSlot;
use crate::window::WindowController;

const EVENT_CAPACITY: usize = 256;

/// Collaborators the orchestrator drives.
#[derive(Clone)]
pub struct ScanServices {
    pub host: Arc<dyn BrowserHost>,
    pub channel: Arc<dyn ExecutorChannel>,
    pub prompts: Arc<dyn PromptSource>,
    pub sink: Arc<dyn ResultSink>,
    pub history: Option<ScanHistoryRepo>,
}

/// Per-scan overrides of the configured defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOptions {
    #[serde(default)]
    pub platforms: Option<Vec<Platform>>,
    #[serde(default)]
    pub samples_per_prompt: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedScan {
    pub scan_session_id: ScanSessionId,
    pub total_prompts: usize,
}

/// State shared between the orchestrator handle and its driver task.
pub(crate) struct ScanContext {
    pub(crate) slot: SessionSlot,
    pub(crate) windows: WindowController,
    pub(crate) gateway: MessagingGateway,
    pub(crate) sink: Arc<dyn ResultSink>,
    pub(crate) history: Option<ScanHistoryRepo>,
    pub(crate) reporter: ProgressReporter,
    pub(crate) config: ScanConfig,
    prompts: Arc<dyn PromptSource>,
    host: Arc<dyn BrowserHost>,
    keepalive: Mutex<Option<Keepalive>>,
}

impl ScanContext {
    /// Broadcast progress for `id` if it still occupies the slot.
    pub(crate) fn report(&self, id: &ScanSessionId, countdown_seconds: Option<u64>) {
        if let Some(event) = self.slot.read_session(id, |s| progress_event(s, countdown_seconds)) {
            self.reporter.emit(event);
        }
    }

    pub(crate) fn stop_keepalive(&self) {
        if let Some(keepalive) = self.keepalive.lock().take() {
            keepalive.stop();
        }
    }
}

pub struct ScanOrchestrator {
    ctx: Arc<ScanContext>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ScanOrchestrator {
    pub fn new(services: ScanServices, config: ScanConfig) -> Self {
        let windows = WindowController::new(services.host.clone(), &config);
        let gateway = MessagingGateway::new(
            services.host.clone(),
            services.channel,
            config.messaging_retries,
            config.reattach_delay,
        );
        Self {
            ctx: Arc::new(ScanContext {
                slot: SessionSlot::new(),
                windows,
                gateway,
                sink: services.sink,
                history: services.history,
                reporter: ProgressReporter::new(EVENT_CAPACITY),
                config,
                prompts: services.prompts,
                host: services.host,
                keepalive: Mutex::new(None),
            }),
            driver: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.ctx.reporter.subscribe()
    }

    /// Create the session and launch the phase driver.
    ///
    /// Returns as soon as the session exists; the scan itself runs on a
    /// spawned task.
    #[instrument(skip_all, fields(product_id = %product_id))]
    pub async fn start_scan(&self, product_id: ProductId, options: StartOptions) -> Result<StartedScan, ScanError> {
        if self.ctx.slot.is_occupied() {
            return Err(ScanError::AlreadyRunning);
        }

        let config = &self.ctx.config;
        let platforms = resolve_platforms(options.platforms.as_deref().unwrap_or(&config.platforms))?;
        let samples = options.samples_per_prompt.unwrap_or(config.samples_per_prompt);
        if !(1..=ScanSettings::MAX_SAMPLES_PER_PROMPT).contains(&samples) {
            return Err(ScanError::InvalidSamples {
                got: samples,
                max: ScanSettings::MAX_SAMPLES_PER_PROMPT,
            });
        }

        let bundle = self.ctx.prompts.fetch_prompts(&product_id).await?;
        if bundle.prompts.is_empty() {
            return Err(ScanError::NoPrompts);
        }

        let queues = build_work_queues(&bundle.prompts, &platforms, samples);
        let session = ScanSession::new(product_id, bundle.product, bundle.competitors, queues, samples);
        let total_prompts = session.total_items();
        let scan_session_id = self.ctx.slot.try_create(session)?;
        info!(
            scan_session_id = %scan_session_id,
            total_prompts,
            platforms = platforms.len(),
            samples,
            "scan started"
        );

        *self.ctx.keepalive.lock() = Some(Keepalive::start(self.ctx.host.clone(), config.keepalive_interval));
        self.ctx.report(&scan_session_id, None);

        let driver = ScanDriver::new(self.ctx.clone(), scan_session_id.clone());
        let span = info_span!("scan", scan_session_id = %scan_session_id);
        let handle = tokio::spawn(driver.run().instrument(span));
        *self.driver.lock() = Some(handle);

        Ok(StartedScan {
            scan_session_id,
            total_prompts,
        })
    }

    pub fn status(&self) -> StatusReport {
        self.ctx
            .slot
            .read(|s| status_report(Some(s)))
            .unwrap_or_else(StatusReport::idle)
    }

    /// Cancel the active scan: close its tabs and window and clear the slot.
    /// No finalize call is made. Returns whether a session existed.
    pub async fn cancel_scan(&self) -> bool {
        let Some(mut session) = self.ctx.slot.take_any() else {
            return false;
        };
        session.status = ScanStatus::Cancelled;
        self.ctx.stop_keepalive();
        info!(scan_session_id = %session.scan_session_id, phase = session.phase.as_str(), "scan cancelled");

        for tab in session.open_tabs() {
            self.ctx.windows.close_tab(&tab).await;
        }
        if let Some(window_id) = session.window_id {
            self.ctx.windows.close_window(window_id).await;
        }
        true
    }

    /// Cut the global answer wait short. Returns whether a session existed.
    pub fn collect_now(&self) -> bool {
        let found = self.ctx.slot.update_any(|s| s.skip_wait = true).is_some();
        if found {
            info!("collect requested");
        }
        found
    }

    /// Wait for the current driver task, if any, to exit.
    pub async fn join(&self) {
        let handle = self.driver.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "scan driver task failed");
            }
        }
    }

    /// Completion time of the most recent finished scan.
    pub fn last_scan_at(&self) -> Result<Option<DateTime<Utc>>, ScanError> {
        match &self.ctx.history {
            Some(history) => Ok(history.last_scan_at()?),
            None => Ok(None),
        }
    }
}

/// Requested destinations in fixed order, without duplicates.
fn resolve_platforms(requested: &[Platform]) -> Result<Vec<Platform>, ScanError> {
    let mut platforms = requested.to_vec();
    platforms.sort();
    platforms.dedup();
    if platforms.is_empty() {
        return Err(ScanError::NoPlatforms);
    }
    Ok(platforms)
}
