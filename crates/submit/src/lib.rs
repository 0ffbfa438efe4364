//! Idempotent write path to the relational store: hostnames, URLs, robots,
//! sitemaps, request histories, and selenium snapshots, plus the append-only
//! `link.csv` index. Shares its `sqlx::PgPool` with [`darc_store::SqlStore`]
//! when `DB_URL` selects the relational Work Store backend; otherwise opens
//! its own pool against `DB_URL` while Redis handles the queues.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use darc_core::WorkError;
use darc_link::Link;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Retries `op` forever with capped exponential backoff, warning on every
/// failed attempt. Used for every archival write against the relational
/// store: a transient DB hiccup must never drop a history or blob row.
async fn retry_forever<F, Fut>(operation: &str, mut op: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), sqlx::Error>>,
{
    let mut backoff = Duration::from_millis(200);
    loop {
        match op().await {
            Ok(()) => return,
            Err(e) => {
                warn!(
                    error = %e,
                    operation,
                    backoff_ms = backoff.as_millis(),
                    "database write failed, retrying",
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

/// One completed HTTP exchange, the shape the Request Fetcher hands to the
/// Submit Sink after [`darc_store::WorkStore::append_history`] records the
/// lightweight outcome row. Carries the full exchange for the relational
/// history table.
#[derive(Debug, Clone, Default)]
pub struct RequestsHistoryRow {
    pub url_hash: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub method: String,
    pub status_code: Option<i32>,
    pub request_headers: Vec<u8>,
    pub request_body: Vec<u8>,
    pub response_headers: Vec<u8>,
    pub response_body: Vec<u8>,
    pub content_type: Option<String>,
    pub response_mime: Option<String>,
    pub session_cookies: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SeleniumSnapshotRow {
    pub url_hash: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub html_path: String,
    pub screenshot_path: String,
}

/// Idempotent writer against the relational store, plus the append-only
/// `link.csv` index that lives alongside the file tree under `PATH_DATA`.
pub struct SubmitSink {
    pool: PgPool,
    csv_path: PathBuf,
    csv_lock: Mutex<()>,
}

impl SubmitSink {
    pub async fn connect(database_url: &str, data_root: &Path) -> Result<Self, WorkError> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await
            .map_err(|e| WorkError::WorkStoreUnavailable(e.to_string()))?;
        Ok(Self::with_pool(pool, data_root))
    }

    /// Shares an already-connected pool — used when `DB_URL` also backs the
    /// relational Work Store, so both components reuse one connection pool.
    pub fn with_pool(pool: PgPool, data_root: &Path) -> Self {
        Self {
            pool,
            csv_path: data_root.join("link.csv"),
            csv_lock: Mutex::new(()),
        }
    }

    pub async fn run_migrations(&self) -> Result<(), WorkError> {
        sqlx::raw_sql(include_str!("../migrations/001_submit.sql"))
            .execute(&self.pool)
            .await
            .map_err(|e| WorkError::DatabaseOperationFailed(e.to_string()))?;
        Ok(())
    }

    /// Upserts the hostname record (unique by host+proxy), the URL record
    /// (unique by url_hash), a `link_through` backref edge when `link` has a
    /// referrer, and appends a `link.csv` row. Called once per discovered
    /// link, whether or not it is ultimately fetched.
    pub async fn submit_link(&self, link: &Link, base_path: &str) -> Result<(), WorkError> {
        let now = chrono::Utc::now();

        retry_forever("upsert hostname", || async {
            sqlx::query(
                "INSERT INTO hostnames (host, proxy, first_seen, last_seen, alive)
                 VALUES ($1, $2, $3, $3, true)
                 ON CONFLICT (host, proxy) DO UPDATE SET last_seen = EXCLUDED.last_seen, alive = true",
            )
            .bind(&link.host)
            .bind(link.proxy.as_str())
            .bind(now)
            .execute(&self.pool)
            .await
            .map(|_| ())
        })
        .await;

        retry_forever("upsert url", || async {
            sqlx::query(
                "INSERT INTO urls (url_hash, host, url, base_path, first_seen, last_seen, alive)
                 VALUES ($1, $2, $3, $4, $5, $5, true)
                 ON CONFLICT (url_hash) DO UPDATE SET last_seen = EXCLUDED.last_seen, alive = true",
            )
            .bind(&link.url_hash)
            .bind(&link.host)
            .bind(&link.original)
            .bind(base_path)
            .bind(now)
            .execute(&self.pool)
            .await
            .map(|_| ())
        })
        .await;

        if let Some(src) = &link.backref {
            retry_forever("insert link_through edge", || async {
                sqlx::query(
                    "INSERT INTO link_through (src_url_hash, dst_url_hash) VALUES ($1, $2)
                     ON CONFLICT DO NOTHING",
                )
                .bind(src)
                .bind(&link.url_hash)
                .execute(&self.pool)
                .await
                .map(|_| ())
            })
            .await;
        }

        self.append_csv_row(link).await?;
        Ok(())
    }

    async fn append_csv_row(&self, link: &Link) -> Result<(), WorkError> {
        let _guard = self.csv_lock.lock().await;
        let row = format!(
            "{},{},{},{},{}\n",
            link.proxy.as_str(),
            link.scheme,
            link.host,
            link.url_hash,
            link.original
        );
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.csv_path)
            .await
            .map_err(|e| WorkError::Other(e.into()))?;
        file.write_all(row.as_bytes())
            .await
            .map_err(|e| WorkError::Other(e.into()))?;
        Ok(())
    }

    pub async fn submit_robots(&self, host: &str, fetched_at: chrono::DateTime<chrono::Utc>, body: &str) {
        self.submit_blob("robots_blobs", host, fetched_at, body).await
    }

    pub async fn submit_sitemap(&self, host: &str, fetched_at: chrono::DateTime<chrono::Utc>, body: &str) {
        self.submit_blob("sitemap_blobs", host, fetched_at, body).await
    }

    pub async fn submit_hosts(&self, host: &str, fetched_at: chrono::DateTime<chrono::Utc>, body: &str) {
        self.submit_blob("hosts_blobs", host, fetched_at, body).await
    }

    /// Archival write against one of the `*_blobs` tables. Retried forever
    /// per the store's `DatabaseOperationFailed` policy — the caller has
    /// nothing meaningful to do with a failure here but keep serving traffic
    /// while the write catches up in the background.
    async fn submit_blob(&self, table: &str, host: &str, fetched_at: chrono::DateTime<chrono::Utc>, body: &str) {
        let query = format!(
            "INSERT INTO {table} (host, fetched_at, body) VALUES ($1, $2, $3)
             ON CONFLICT (host, fetched_at) DO UPDATE SET body = EXCLUDED.body"
        );
        retry_forever(table, || async {
            sqlx::query(&query)
                .bind(host)
                .bind(fetched_at)
                .bind(body)
                .execute(&self.pool)
                .await
                .map(|_| ())
        })
        .await;
    }

    /// Appends one requests-history row. Unlike [`darc_store::WorkStore::append_history`]
    /// (which records the outcome for scheduling purposes), this carries the
    /// full exchange for archival/analysis. Retried forever on failure.
    pub async fn submit_requests_history(&self, row: &RequestsHistoryRow) {
        retry_forever("insert requests_history row", || async {
            sqlx::query(
                "INSERT INTO requests_history
                 (url_hash, ts, method, status_code, request_headers, request_body,
                  response_headers, response_body, content_type, response_mime, session_cookies)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(&row.url_hash)
            .bind(row.timestamp)
            .bind(&row.method)
            .bind(row.status_code)
            .bind(&row.request_headers)
            .bind(&row.request_body)
            .bind(&row.response_headers)
            .bind(&row.response_body)
            .bind(&row.content_type)
            .bind(&row.response_mime)
            .bind(&row.session_cookies)
            .execute(&self.pool)
            .await
            .map(|_| ())
        })
        .await;
    }

    pub async fn submit_selenium_snapshot(&self, row: &SeleniumSnapshotRow) {
        retry_forever("insert selenium_snapshots row", || async {
            sqlx::query(
                "INSERT INTO selenium_snapshots (url_hash, ts, html_path, screenshot_path)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(&row.url_hash)
            .bind(row.timestamp)
            .bind(&row.html_path)
            .bind(&row.screenshot_path)
            .execute(&self.pool)
            .await
            .map(|_| ())
        })
        .await;
    }
}

/// A no-op sink used when no relational store is configured (Redis-only
/// deployments still get queue semantics; archival rows are simply skipped).
pub type SharedSubmitSink = Option<Arc<SubmitSink>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_row_format_is_stable() {
        let link = darc_link::parse("http://example.onion/x", None).unwrap();
        let row = format!(
            "{},{},{},{},{}\n",
            link.proxy.as_str(),
            link.scheme,
            link.host,
            link.url_hash,
            link.original
        );
        assert!(row.starts_with("tor,http,example.onion,"));
    }
}
