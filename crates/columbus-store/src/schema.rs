/// SQL DDL for the scan history database.
pub const SCHEMA_VERSION: u32 = 1;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
"#;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS scan_history (
    scan_session_id TEXT PRIMARY KEY,
    product_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    total_prompts INTEGER NOT NULL,
    successful_prompts INTEGER NOT NULL,
    mention_rate INTEGER NOT NULL,
    citation_rate INTEGER NOT NULL,
    stats TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scan_history_completed ON scan_history(completed_at);
CREATE INDEX IF NOT EXISTS idx_scan_history_product ON scan_history(product_id, completed_at);
"#;
