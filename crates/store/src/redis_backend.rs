use std::time::Duration;

use async_trait::async_trait;
use darc_core::{QueueKind, WorkError};
use darc_link::Link;
use redis::AsyncCommands;
use tracing::warn;

use crate::{queue_name, Entry, FilterLists, HistoryEntry, WorkStore};

/// Sorted-set backend. Each queue is a sorted set keyed by score with the
/// URL (or host) hash as member; the URL text lives in a side hash keyed by
/// the same hash. Claiming pushes a ready member's score past `now + grace`
/// instead of removing it, so it naturally falls back into the ready range
/// (score <= now) once the grace interval elapses if nobody acks it. A
/// `darc:claimed:<queue>` key, set with the same TTL, gates the claim itself
/// so two workers racing the same ready snapshot can't both claim it.
pub struct RedisStore {
    client: redis::Client,
    grace: Option<Duration>,
    filters: FilterLists,
}

const MAX_BACKOFF: Duration = Duration::from_secs(60);

impl RedisStore {
    pub fn new(url: &str, grace: Option<Duration>, filters: FilterLists) -> Result<Self, WorkError> {
        let client = redis::Client::open(url)
            .map_err(|e| WorkError::WorkStoreUnavailable(e.to_string()))?;
        Ok(Self { client, grace, filters })
    }

    /// Reconnects with infinite retry and capped exponential backoff on
    /// connection errors, never surfacing `WorkStoreUnavailable` to callers.
    async fn connection(&self) -> redis::aio::MultiplexedConnection {
        let mut backoff = Duration::from_millis(100);
        loop {
            match self.client.get_multiplexed_async_connection().await {
                Ok(conn) => return conn,
                Err(e) => {
                    warn!(error = %e, backoff_ms = backoff.as_millis(), "work store unreachable, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    fn side_map(kind: QueueKind) -> String {
        format!("{}:urltext", queue_name(kind))
    }

    fn claimed_key(kind: QueueKind, member: &str) -> String {
        format!("darc:claimed:{}:{member}", kind.as_str())
    }

    async fn save(&self, kind: QueueKind, member: &str, url: &str, score: f64, nx: bool) -> Result<(), WorkError> {
        let mut conn = self.connection().await;
        let queue = queue_name(kind);
        let side = Self::side_map(kind);

        let result: redis::RedisResult<()> = async {
            if nx {
                let _: i64 = redis::cmd("ZADD")
                    .arg(queue)
                    .arg("NX")
                    .arg(score)
                    .arg(member)
                    .query_async(&mut conn)
                    .await?;
            } else {
                let _: () = conn.zadd(queue, member, score).await?;
            }
            let _: bool = conn.hset_nx(&side, member, url).await?;
            // An explicit (re)save always returns the entry to a fully
            // unclaimed state, even if it was mid-grace from an earlier claim.
            let _: i64 = conn.del(Self::claimed_key(kind, member)).await?;
            Ok(())
        }
        .await;

        result.map_err(|e| WorkError::WorkStoreUnavailable(e.to_string()))
    }

    async fn load(&self, kind: QueueKind, count: usize) -> Result<Vec<Entry>, WorkError> {
        let mut conn = self.connection().await;
        let queue = queue_name(kind);
        let side = Self::side_map(kind);
        let now = chrono::Utc::now().timestamp() as f64;

        let ready: Vec<(String, f64)> = conn
            .zrangebyscore_withscores(queue, f64::NEG_INFINITY, now)
            .await
            .map_err(|e| WorkError::WorkStoreUnavailable(e.to_string()))?;

        let mut claimed = Vec::with_capacity(count.min(ready.len()));
        for (member, score) in ready.into_iter().take(count) {
            let claim_key = Self::claimed_key(kind, &member);
            let acquired: bool = conn
                .set_nx(&claim_key, 1)
                .await
                .map_err(|e| WorkError::WorkStoreUnavailable(e.to_string()))?;
            if !acquired {
                continue;
            }

            let hide_until = match self.grace {
                Some(grace) => now + grace.as_secs_f64(),
                None => f64::INFINITY,
            };
            let _: () = conn
                .zadd(queue, &member, hide_until)
                .await
                .map_err(|e| WorkError::WorkStoreUnavailable(e.to_string()))?;
            if let Some(grace) = self.grace {
                let _: () = conn
                    .expire(&claim_key, grace.as_secs().max(1) as i64)
                    .await
                    .unwrap_or_default();
            }

            let url: Option<String> = conn.hget(&side, &member).await.unwrap_or_default();
            let Some(url) = url else { continue };

            if kind != QueueKind::Hostname && !self.filters.allows_link(&url) {
                continue;
            }
            claimed.push(Entry { url_hash: member, url, score });
        }
        Ok(claimed)
    }
}

#[async_trait]
impl WorkStore for RedisStore {
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
        let mut conn = self.connection().await;
        let _: i64 = conn
            .zrem(queue_name(kind), url_hash)
            .await
            .map_err(|e| WorkError::WorkStoreUnavailable(e.to_string()))?;
        let _: i64 = conn
            .del(Self::claimed_key(kind, url_hash))
            .await
            .unwrap_or_default();
        Ok(())
    }

    async fn drop_hostname(&self, host_hash: &str) -> Result<(), WorkError> {
        let mut conn = self.connection().await;
        let _: i64 = conn
            .zrem(queue_name(QueueKind::Hostname), host_hash)
            .await
            .map_err(|e| WorkError::WorkStoreUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn append_history(&self, entry: HistoryEntry) -> Result<(), WorkError> {
        let key = format!("darc:history:{}", entry.url_hash);
        let payload = format!(
            "{}|{}|{}|{}",
            entry.timestamp.to_rfc3339(),
            entry.method,
            entry.outcome.label(),
            entry.content_type.unwrap_or_default(),
        );
        let mut backoff = Duration::from_millis(200);
        loop {
            let mut conn = self.connection().await;
            match conn.rpush::<_, _, ()>(&key, &payload).await {
                Ok(()) => return Ok(()),
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
        let mut conn = self.connection().await;
        for kind in [QueueKind::Hostname, QueueKind::Requests, QueueKind::Selenium] {
            let _: () = conn
                .del(queue_name(kind))
                .await
                .map_err(|e| WorkError::WorkStoreUnavailable(e.to_string()))?;
            let _: () = conn.del(Self::side_map(kind)).await.unwrap_or_default();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claimed_key_is_scoped_per_queue() {
        let a = RedisStore::claimed_key(QueueKind::Requests, "abc");
        let b = RedisStore::claimed_key(QueueKind::Selenium, "abc");
        assert_ne!(a, b);
    }
}
