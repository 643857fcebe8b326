//! Progress snapshots derived from session state.
//!
//! Everything here reads the session; nothing mutates it.

use std::collections::BTreeMap;

use tokio::sync::broadcast;
use tracing::trace;

use columbus_core::events::{PlatformProgress, ProgressCounts, ScanEvent, StatusReport};
use columbus_core::platform::Platform;
use columbus_core::scan::{ItemStatus, ScanPhase, ScanSession};

/// Whether "current" counts submissions or collections in `phase`.
fn counts_collected(phase: ScanPhase) -> bool {
    matches!(phase, ScanPhase::Collecting | ScanPhase::Complete)
}

pub fn platform_progress(session: &ScanSession) -> BTreeMap<Platform, PlatformProgress> {
    let collecting = counts_collected(session.phase);
    session
        .platforms
        .iter()
        .map(|(platform, state)| {
            let submitted = state.count(|s| matches!(s, ItemStatus::Submitted | ItemStatus::Collected));
            let collected = state.count(|s| s == ItemStatus::Collected);
            let failed = state.count(|s| s == ItemStatus::Failed);
            let progress = PlatformProgress {
                current: if collecting { collected } else { submitted },
                total: state.queue.len(),
                status: state.status,
                submitted,
                collected,
                failed,
            };
            (*platform, progress)
        })
        .collect()
}

/// Overall (current, total) for the session's phase.
pub fn overall_counts(session: &ScanSession) -> (usize, usize) {
    let platforms = platform_progress(session);
    let current = platforms.values().map(|p| p.current).sum();
    (current, session.total_items())
}

pub fn progress_event(session: &ScanSession, countdown_seconds: Option<u64>) -> ScanEvent {
    let (current, total) = overall_counts(session);
    ScanEvent::ScanProgress {
        scan_session_id: session.scan_session_id.clone(),
        current,
        total,
        phase: session.phase,
        platforms: platform_progress(session),
        countdown_seconds,
    }
}

/// Reply to a status query; `idle` when no session exists.
pub fn status_report(session: Option<&ScanSession>) -> StatusReport {
    let Some(session) = session else {
        return StatusReport::idle();
    };
    let (current, total) = overall_counts(session);
    StatusReport {
        status: session.status.into(),
        scan_session_id: Some(session.scan_session_id.clone()),
        phase: Some(session.phase),
        progress: Some(ProgressCounts::new(current, total)),
        platforms: Some(platform_progress(session)),
    }
}

/// Fans scan events out to every subscriber.
#[derive(Clone)]
pub struct ProgressReporter {
    events: broadcast::Sender<ScanEvent>,
}

impl ProgressReporter {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self { events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: ScanEvent) {
        let kind = event.event_type();
        if self.events.send(event).is_err() {
            trace!(event = kind, "no listeners");
        }
    }
}
