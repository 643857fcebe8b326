//! In-memory model of one scan: session, per-destination queues, work items.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::Product;
use crate::executor::CollectedResponse;
use crate::ids::{ProductId, PromptId, ScanSessionId, TabId, WindowId, WorkItemId};
use crate::platform::Platform;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Running,
    Cancelled,
    Error,
}

impl ScanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        }
    }
}

/// Top-level phase of the orchestrator state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    Initializing,
    Submitting,
    Waiting,
    Collecting,
    Complete,
}

impl ScanPhase {
    /// The phase that follows this one, `None` once complete.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Initializing => Some(Self::Submitting),
            Self::Submitting => Some(Self::Waiting),
            Self::Waiting => Some(Self::Collecting),
            Self::Collecting => Some(Self::Complete),
            Self::Complete => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Submitting => "submitting",
            Self::Waiting => "waiting",
            Self::Collecting => "collecting",
            Self::Complete => "complete",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformStatus {
    Pending,
    Submitting,
    Waiting,
    Collecting,
    Complete,
    Skipped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Submitted,
    Collected,
    Failed,
}

impl ItemStatus {
    /// pending -> submitted -> collected, or pending/submitted -> failed.
    pub fn can_transition_to(self, next: ItemStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Submitted)
                | (Self::Submitted, Self::Collected)
                | (Self::Pending, Self::Failed)
                | (Self::Submitted, Self::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Collected | Self::Failed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid work item transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: ItemStatus,
    pub to: ItemStatus,
}

/// A single prompt sent once to one destination.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: WorkItemId,
    pub prompt_id: PromptId,
    pub prompt_text: String,
    pub platform: Platform,
    pub sample_number: u32,
    pub tab_id: Option<TabId>,
    pub status: ItemStatus,
    pub retry_count: u32,
    pub result: Option<CollectedResponse>,
    pub error: Option<String>,
}

impl WorkItem {
    pub fn new(platform: Platform, prompt_id: PromptId, prompt_text: impl Into<String>, sample_number: u32) -> Self {
        Self {
            id: WorkItemId::for_item(platform, &prompt_id, sample_number),
            prompt_id,
            prompt_text: prompt_text.into(),
            platform,
            sample_number,
            tab_id: None,
            status: ItemStatus::Pending,
            retry_count: 0,
            result: None,
            error: None,
        }
    }

    fn transition(&mut self, to: ItemStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(to) {
            return Err(InvalidTransition { from: self.status, to });
        }
        self.status = to;
        Ok(())
    }

    /// Record a successful submission; the tab stays open until collection.
    pub fn mark_submitted(&mut self, tab_id: TabId) -> Result<(), InvalidTransition> {
        self.transition(ItemStatus::Submitted)?;
        self.tab_id = Some(tab_id);
        Ok(())
    }

    pub fn mark_collected(&mut self, result: CollectedResponse) -> Result<(), InvalidTransition> {
        self.transition(ItemStatus::Collected)?;
        self.result = Some(result);
        self.error = None;
        Ok(())
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(ItemStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Detach the item from its tab, returning the id so the caller can close it.
    pub fn take_tab(&mut self) -> Option<TabId> {
        self.tab_id.take()
    }
}

/// Queue and status for one destination.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlatformState {
    pub queue: Vec<WorkItem>,
    pub status: PlatformStatus,
}

impl PlatformState {
    pub fn new(queue: Vec<WorkItem>) -> Self {
        Self {
            queue,
            status: PlatformStatus::Pending,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.status == PlatformStatus::Skipped
    }

    pub fn count(&self, pred: impl Fn(ItemStatus) -> bool) -> usize {
        self.queue.iter().filter(|item| pred(item.status)).count()
    }
}

/// The single active scan.
#[derive(Clone, Debug)]
pub struct ScanSession {
    pub scan_session_id: ScanSessionId,
    pub product_id: ProductId,
    pub product: Product,
    pub competitors: Vec<String>,
    pub platforms: BTreeMap<Platform, PlatformState>,
    pub status: ScanStatus,
    pub phase: ScanPhase,
    pub started_at: DateTime<Utc>,
    pub samples_per_prompt: u32,
    pub window_id: Option<WindowId>,
    /// Keeps the scan window alive while work tabs come and go.
    pub placeholder_tab_id: Option<TabId>,
    /// Set by "collect now" to cut the global wait short.
    pub skip_wait: bool,
}

impl ScanSession {
    pub fn new(
        product_id: ProductId,
        product: Product,
        competitors: Vec<String>,
        platforms: BTreeMap<Platform, PlatformState>,
        samples_per_prompt: u32,
    ) -> Self {
        Self {
            scan_session_id: ScanSessionId::new(),
            product_id,
            product,
            competitors,
            platforms,
            status: ScanStatus::Running,
            phase: ScanPhase::Initializing,
            started_at: Utc::now(),
            samples_per_prompt,
            window_id: None,
            placeholder_tab_id: None,
            skip_wait: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ScanStatus::Running
    }

    /// Total item count, skipped destinations included.
    pub fn total_items(&self) -> usize {
        self.platforms.values().map(|state| state.queue.len()).sum()
    }

    pub fn item(&self, platform: Platform, index: usize) -> Option<&WorkItem> {
        self.platforms.get(&platform)?.queue.get(index)
    }

    pub fn item_mut(&mut self, platform: Platform, index: usize) -> Option<&mut WorkItem> {
        self.platforms.get_mut(&platform)?.queue.get_mut(index)
    }

    pub fn set_platform_status(&mut self, platform: Platform, status: PlatformStatus) {
        if let Some(state) = self.platforms.get_mut(&platform) {
            // Skipped is terminal.
            if !state.is_skipped() {
                state.status = status;
            }
        }
    }

    /// Destinations still taking part in the scan, in fixed order.
    pub fn active_platforms(&self) -> Vec<Platform> {
        self.platforms
            .iter()
            .filter(|(_, state)| !state.is_skipped())
            .map(|(platform, _)| *platform)
            .collect()
    }

    /// Every tab the session currently holds open, placeholder last.
    pub fn open_tabs(&self) -> Vec<TabId> {
        let mut tabs: Vec<TabId> = self
            .platforms
            .values()
            .flat_map(|state| state.queue.iter())
            .filter_map(|item| item.tab_id.clone())
            .collect();
        tabs.extend(self.placeholder_tab_id.clone());
        tabs
    }
}
