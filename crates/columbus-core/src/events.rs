use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{PromptId, ScanSessionId};
use crate::platform::Platform;
use crate::scan::{PlatformStatus, ScanPhase, ScanStatus};

/// Per-destination slice of a progress snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformProgress {
    pub current: usize,
    pub total: usize,
    pub status: PlatformStatus,
    pub submitted: usize,
    pub collected: usize,
    pub failed: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub total: usize,
    pub successful: usize,
    pub mentioned: usize,
    pub cited: usize,
    pub mention_rate: u32,
    pub citation_rate: u32,
}

/// Aggregates reported when a scan completes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub total_prompts: usize,
    pub successful_prompts: usize,
    pub mention_rate: u32,
    pub citation_rate: u32,
    pub by_platform: BTreeMap<Platform, PlatformStats>,
}

/// Events broadcast to every listener while a scan runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanEvent {
    #[serde(rename_all = "camelCase")]
    ScanProgress {
        scan_session_id: ScanSessionId,
        current: usize,
        total: usize,
        phase: ScanPhase,
        platforms: BTreeMap<Platform, PlatformProgress>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        countdown_seconds: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    ScanResult {
        scan_session_id: ScanSessionId,
        platform: Platform,
        prompt_id: PromptId,
        success: bool,
        brand_mentioned: bool,
    },
    #[serde(rename_all = "camelCase")]
    ScanComplete {
        scan_session_id: ScanSessionId,
        stats: ScanStats,
    },
    #[serde(rename_all = "camelCase")]
    ScanError {
        scan_session_id: ScanSessionId,
        message: String,
    },
}

impl ScanEvent {
    pub fn scan_session_id(&self) -> &ScanSessionId {
        match self {
            Self::ScanProgress { scan_session_id, .. }
            | Self::ScanResult { scan_session_id, .. }
            | Self::ScanComplete { scan_session_id, .. }
            | Self::ScanError { scan_session_id, .. } => scan_session_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ScanProgress { .. } => "SCAN_PROGRESS",
            Self::ScanResult { .. } => "SCAN_RESULT",
            Self::ScanComplete { .. } => "SCAN_COMPLETE",
            Self::ScanError { .. } => "SCAN_ERROR",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounts {
    pub current: usize,
    pub total: usize,
    pub percentage: u32,
}

impl ProgressCounts {
    pub fn new(current: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            ((current as f64 / total as f64) * 100.0).round() as u32
        };
        Self {
            current,
            total,
            percentage,
        }
    }
}

/// `status` field of a status reply; `idle` when no session exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportedStatus {
    Idle,
    Running,
    Cancelled,
    Error,
}

impl From<ScanStatus> for ReportedStatus {
    fn from(status: ScanStatus) -> Self {
        match status {
            ScanStatus::Running => Self::Running,
            ScanStatus::Cancelled => Self::Cancelled,
            ScanStatus::Error => Self::Error,
        }
    }
}

/// Reply to a status query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: ReportedStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_session_id: Option<ScanSessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ScanPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressCounts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platforms: Option<BTreeMap<Platform, PlatformProgress>>,
}

impl StatusReport {
    pub fn idle() -> Self {
        Self {
            status: ReportedStatus::Idle,
            scan_session_id: None,
            phase: None,
            progress: None,
            platforms: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == ReportedStatus::Idle
    }
}
