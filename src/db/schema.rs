//! Database schema definitions

pub const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    timestamp_ms INTEGER NOT NULL,
    source_ip TEXT,
    source_port INTEGER,
    dest_ip TEXT,
    dest_port INTEGER,
    protocol TEXT,
    domain TEXT,
    http_method TEXT,
    http_path TEXT,
    http_status INTEGER,
    user_agent TEXT,
    raw_json TEXT
)
"#;

// Ordering and range filters (ORDER BY timestamp_ms DESC, id DESC)
pub const CREATE_INDEX_TIMESTAMP: &str =
    "CREATE INDEX IF NOT EXISTS idx_events_ts ON events(timestamp_ms DESC, id DESC)";

// Top-domain aggregation
pub const CREATE_INDEX_DOMAIN: &str =
    "CREATE INDEX IF NOT EXISTS idx_events_domain ON events(domain)";
