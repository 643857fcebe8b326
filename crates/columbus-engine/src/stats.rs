use std::collections::BTreeMap;

use columbus_core::events::{PlatformStats, ScanStats};
use columbus_core::scan::{ItemStatus, ScanSession};

/// Integer percentage of `count` over `successful`; 0 when nothing succeeded.
pub fn rate(count: usize, successful: usize) -> u32 {
    if successful == 0 {
        return 0;
    }
    ((count as f64 / successful as f64) * 100.0).round() as u32
}

/// Aggregate completion stats over non-skipped destinations.
///
/// `total` counts items that reached a terminal state; rates are relative to
/// collected items.
pub fn compute_stats(session: &ScanSession) -> ScanStats {
    let mut by_platform = BTreeMap::new();
    let mut total = 0;
    let mut successful = 0;
    let mut mentioned = 0;
    let mut cited = 0;

    for (platform, state) in session.platforms.iter().filter(|(_, s)| !s.is_skipped()) {
        let mut stats = PlatformStats::default();
        for item in &state.queue {
            if !item.status.is_terminal() {
                continue;
            }
            stats.total += 1;
            if item.status != ItemStatus::Collected {
                continue;
            }
            stats.successful += 1;
            if let Some(result) = &item.result {
                if result.brand_mentioned {
                    stats.mentioned += 1;
                }
                if result.citation_present() {
                    stats.cited += 1;
                }
            }
        }
        stats.mention_rate = rate(stats.mentioned, stats.successful);
        stats.citation_rate = rate(stats.cited, stats.successful);

        total += stats.total;
        successful += stats.successful;
        mentioned += stats.mentioned;
        cited += stats.cited;
        by_platform.insert(*platform, stats);
    }

    ScanStats {
        total_prompts: total,
        successful_prompts: successful,
        mention_rate: rate(mentioned, successful),
        citation_rate: rate(cited, successful),
        by_platform,
    }
}
