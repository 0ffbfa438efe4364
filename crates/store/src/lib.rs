//! Abstraction over the two physical Work Store backends (Redis sorted
//! sets, or a relational database): three ordered queues (hostname,
//! requests, selenium), atomic claim/save, and a history table of per-URL
//! attempts. The contract is identical across backends; callers never know
//! which one is live.

mod filters;
mod redis_backend;
mod sql_backend;

pub use filters::FilterLists;
pub use redis_backend::RedisStore;
pub use sql_backend::SqlStore;

use async_trait::async_trait;
use darc_core::{FetchOutcome, QueueKind, WorkError};
use darc_link::Link;

/// A single enqueued (or claimed) entry: the URL text plus the score it
/// carries in its queue.
#[derive(Debug, Clone)]
pub struct Entry {
    pub url_hash: String,
    pub url: String,
    pub score: f64,
}

/// One row appended to the requests-history table for a single attempt.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub url_hash: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub method: String,
    pub outcome: FetchOutcome,
    pub content_type: Option<String>,
}

/// The Work Store contract. Implemented by [`RedisStore`] (backend A) and
/// [`SqlStore`] (backend B).
#[async_trait]
pub trait WorkStore: Send + Sync {
    /// Enqueues `links` onto the requests queue and their hosts onto the
    /// hostname queue, atomically per batch. `nx=true`: first-seen wins: an
    /// existing score is left unchanged. `nx=false`: the score is updated
    /// unconditionally.
    async fn save_requests(&self, links: &[Link], score: f64, nx: bool) -> Result<(), WorkError>;

    /// Enqueues `link` onto the selenium queue under the same `nx` rule.
    async fn save_selenium(&self, link: &Link, score: f64, nx: bool) -> Result<(), WorkError>;

    /// Claims up to `count` ready entries (score <= now) from the requests
    /// queue, score ascending, ties by insertion order. A claimed entry is
    /// hidden (its score pushed past the grace interval) rather than
    /// removed; it reappears as claimable once the grace interval elapses
    /// unless [`WorkStore::ack`] removes it first.
    async fn load_requests(&self, count: usize) -> Result<Vec<Entry>, WorkError>;

    /// Same contract as [`WorkStore::load_requests`] for the hostname queue.
    async fn load_hostname(&self, count: usize) -> Result<Vec<Entry>, WorkError>;

    /// Same contract as [`WorkStore::load_requests`] for the selenium queue.
    async fn load_selenium(&self, count: usize) -> Result<Vec<Entry>, WorkError>;

    /// Permanently removes a claimed entry from `kind`'s queue after it has
    /// been successfully processed. A claim that is never acked becomes
    /// claimable again once the grace interval from its claim elapses.
    async fn ack(&self, kind: QueueKind, url_hash: &str) -> Result<(), WorkError>;

    /// Removes a hostname-queue entry by key, regardless of claim state.
    async fn drop_hostname(&self, host_hash: &str) -> Result<(), WorkError>;

    /// Appends one immutable history row. Never fails the caller: on
    /// persistent store error this retries forever per the
    /// `DatabaseOperationFailed` policy, logging a warning each attempt.
    async fn append_history(&self, entry: HistoryEntry) -> Result<(), WorkError>;

    /// Drops every queue's contents. Invoked once at startup when
    /// `DARC_REBOOT=true`.
    async fn reboot(&self) -> Result<(), WorkError>;
}

pub(crate) fn queue_name(kind: QueueKind) -> &'static str {
    match kind {
        QueueKind::Hostname => "darc:queue:hostname",
        QueueKind::Requests => "darc:queue:requests",
        QueueKind::Selenium => "darc:queue:selenium",
    }
}
