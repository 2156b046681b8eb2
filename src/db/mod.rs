//! Database module

mod event;
mod schema;

pub use event::{format_timestamp, parse_timestamp, parse_upper_bound, NewEvent};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{FromRow, Pool, QueryBuilder, Sqlite};
use std::path::Path;
use std::str::FromStr;

use crate::config::{DatabaseConfig, QueryConfig};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("event body must be a JSON object")]
    NotAnObject,
    #[error("invalid timestamp '{0}': expected an ISO-8601 date or date-time")]
    InvalidTimestamp(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// True when the caller supplied bad input, as opposed to a storage failure
    pub fn is_validation(&self) -> bool {
        !matches!(self, StoreError::Database(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A stored event as returned by queries
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EventRow {
    pub id: i64,
    pub timestamp: String,
    pub source_ip: Option<String>,
    pub source_port: Option<i64>,
    pub dest_ip: Option<String>,
    pub dest_port: Option<i64>,
    pub protocol: Option<String>,
    pub domain: Option<String>,
    pub http_method: Option<String>,
    pub http_path: Option<String>,
    pub http_status: Option<i64>,
    pub user_agent: Option<String>,
    pub raw_json: Option<String>,
}

/// Filter for [`Database::query_events`]. All conditions are ANDed.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Substring matched against domain, source_ip and dest_ip
    pub q: Option<String>,
    /// Inclusive lower bound
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
}

impl EventFilter {
    /// Build a filter from raw query-string values.
    ///
    /// `limit` falls back to the configured default when missing, non-numeric
    /// or not positive, and is capped at the configured maximum. A date-only
    /// `to` includes the whole day.
    pub fn from_params(
        q: Option<String>,
        limit: Option<&str>,
        from: Option<&str>,
        to: Option<&str>,
        config: &QueryConfig,
    ) -> StoreResult<Self> {
        fn parse_bound(
            raw: Option<&str>,
            parse: fn(&str) -> StoreResult<DateTime<Utc>>,
        ) -> StoreResult<Option<DateTime<Utc>>> {
            match raw.map(str::trim).filter(|s| !s.is_empty()) {
                Some(s) => parse(s).map(Some),
                None => Ok(None),
            }
        }

        Ok(Self {
            q: q.filter(|q| !q.is_empty()),
            from: parse_bound(from, parse_timestamp)?,
            to: parse_bound(to, parse_upper_bound)?,
            limit: parse_limit(limit, config),
        })
    }
}

pub fn parse_limit(raw: Option<&str>, config: &QueryConfig) -> i64 {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|n| n.is_finite() && *n >= 1.0)
        .map(|n| (n.trunc() as i64).min(config.max_limit))
        .unwrap_or(config.default_limit)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total: i64,
    pub top_domains: Vec<DomainStat>,
    pub recent: Vec<RecentEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainStat {
    pub domain: String,
    pub cnt: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentEvent {
    pub timestamp: String,
    pub domain: Option<String>,
    pub source_ip: Option<String>,
}

const OVERVIEW_TOP_DOMAINS: i64 = 10;
const OVERVIEW_RECENT: i64 = 10;

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = if config.is_memory() {
            // Every connection to :memory: is a separate database, so keep exactly one alive
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
                .await?
        } else {
            if let Some(parent) = Path::new(&config.path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| StoreError::Database(sqlx::Error::Io(e)))?;
                }
            }

            let options = SqliteConnectOptions::new()
                .filename(&config.path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);

            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .connect_with(options)
                .await?
        };

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(schema::CREATE_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_TIMESTAMP)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_DOMAIN)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_event(&self, event: &NewEvent) -> StoreResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO events (timestamp, timestamp_ms, source_ip, source_port, dest_ip, dest_port, protocol, domain, http_method, http_path, http_status, user_agent, raw_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.timestamp)
        .bind(event.timestamp_ms)
        .bind(&event.source_ip)
        .bind(event.source_port)
        .bind(&event.dest_ip)
        .bind(event.dest_port)
        .bind(&event.protocol)
        .bind(&event.domain)
        .bind(&event.http_method)
        .bind(&event.http_path)
        .bind(event.http_status)
        .bind(&event.user_agent)
        .bind(event.raw_json())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn query_events(&self, filter: &EventFilter) -> StoreResult<Vec<EventRow>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, timestamp, source_ip, source_port, dest_ip, dest_port, protocol, domain, \
             http_method, http_path, http_status, user_agent, raw_json FROM events WHERE 1 = 1",
        );
        if let Some(q) = filter.q.as_deref().filter(|q| !q.is_empty()) {
            let pattern = format!("%{}%", escape_like(q));
            builder
                .push(" AND (domain LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR source_ip LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR dest_ip LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
        if let Some(from) = filter.from {
            builder.push(" AND timestamp_ms >= ").push_bind(from.timestamp_millis());
        }
        if let Some(to) = filter.to {
            builder.push(" AND timestamp_ms <= ").push_bind(to.timestamp_millis());
        }

        builder
            .push(" ORDER BY timestamp_ms DESC, id DESC LIMIT ")
            .push_bind(filter.limit);

        let rows = builder
            .build_query_as::<EventRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get_total_count(&self) -> StoreResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn get_top_domains(&self, limit: i64) -> StoreResult<Vec<DomainStat>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT domain, COUNT(*) as cnt
            FROM events
            WHERE domain IS NOT NULL
            GROUP BY domain
            ORDER BY cnt DESC, domain ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(domain, cnt)| DomainStat { domain, cnt }).collect())
    }

    pub async fn get_recent_events(&self, limit: i64) -> StoreResult<Vec<RecentEvent>> {
        let rows: Vec<(String, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT timestamp, domain, source_ip FROM events ORDER BY timestamp_ms DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(timestamp, domain, source_ip)| RecentEvent { timestamp, domain, source_ip })
            .collect())
    }

    /// Aggregates computed fresh on every call
    pub async fn overview(&self) -> StoreResult<Overview> {
        let (total, top_domains, recent) = tokio::join!(
            self.get_total_count(),
            self.get_top_domains(OVERVIEW_TOP_DOMAINS),
            self.get_recent_events(OVERVIEW_RECENT)
        );

        Ok(Overview {
            total: total?,
            top_domains: top_domains?,
            recent: recent?,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Escape LIKE wildcards so `q` matches as a literal substring
fn escape_like(q: &str) -> String {
    let mut escaped = String::with_capacity(q.len());
    for c in q.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
