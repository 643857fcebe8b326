use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use columbus_core::events::ScanStats;
use columbus_core::ids::{ProductId, ScanSessionId};

use crate::database::Database;
use crate::error::StoreError;

/// One completed scan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanHistoryRow {
    pub scan_session_id: ScanSessionId,
    pub product_id: ProductId,
    pub started_at: String,
    pub completed_at: String,
    pub stats: ScanStats,
}

/// Completed scans, newest last written. Cancelled and failed scans are
/// never recorded.
#[derive(Clone)]
pub struct ScanHistoryRepo {
    db: Database,
}

impl ScanHistoryRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, stats), fields(scan_session_id = %scan_session_id, product_id = %product_id))]
    pub fn record_completed(
        &self,
        scan_session_id: &ScanSessionId,
        product_id: &ProductId,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        stats: &ScanStats,
    ) -> Result<(), StoreError> {
        let stats_json = serde_json::to_string(stats)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO scan_history
                 (scan_session_id, product_id, started_at, completed_at, total_prompts,
                  successful_prompts, mention_rate, citation_rate, stats)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    scan_session_id.as_str(),
                    product_id.as_str(),
                    started_at.to_rfc3339(),
                    completed_at.to_rfc3339(),
                    stats.total_prompts as i64,
                    stats.successful_prompts as i64,
                    stats.mention_rate,
                    stats.citation_rate,
                    stats_json,
                ],
            )?;
            Ok(())
        })
    }

    /// Completion time of the most recent scan, if any.
    pub fn last_scan_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let raw: Option<String> = self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT MAX(completed_at) FROM scan_history", [], |row| row.get(0))?)
        })?;
        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StoreError::Serialization(format!("completed_at: {e}")))
        })
        .transpose()
    }

    /// Most recent scans first, optionally for one product.
    pub fn recent(&self, product_id: Option<&ProductId>, limit: u32) -> Result<Vec<ScanHistoryRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT scan_session_id, product_id, started_at, completed_at, stats
                 FROM scan_history
                 WHERE ?1 IS NULL OR product_id = ?1
                 ORDER BY completed_at DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(
                rusqlite::params![product_id.map(ProductId::as_str), limit],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )?;

            let mut out = Vec::new();
            for row in rows {
                let (id, product, started_at, completed_at, stats) = row?;
                out.push(ScanHistoryRow {
                    scan_session_id: ScanSessionId::from_raw(id),
                    product_id: ProductId::from_raw(product),
                    started_at,
                    completed_at,
                    stats: serde_json::from_str(&stats)?,
                });
            }
            Ok(out)
        })
    }
}
