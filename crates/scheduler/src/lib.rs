//! Worker-pool driver: pulls batches from the Work Store, dispatches to
//! stage workers, applies per-host pacing, and drives orderly shutdown.
//! Uses a `tokio::spawn` pool plus a `tokio::select!` shutdown-broadcast
//! pattern, generalized across the supported concurrency disciplines and
//! either of the two stages.

mod mode;
mod rate;
mod stage;

pub use mode::ConcurrencyMode;
pub use rate::HostRateLimiter;
pub use stage::Stage;

use std::sync::Arc;
use std::time::Duration;

use darc_core::{QueueKind, WorkError};
use darc_fetch::{RequestFetcher, SeleniumFetcher};
use darc_proxy::ProxyRegistry;
use darc_store::WorkStore;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Idle-sleep cap: even with nothing ready, the main loop wakes at least
/// this often so shutdown is prompt.
const MAX_IDLE_SLEEP: Duration = Duration::from_secs(60);

/// Hard timeout given to in-flight workers to finish once shutdown begins.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Drives one stage (`crawler`: hostname + requests queues; `loader`:
/// selenium queue) at the configured concurrency discipline until signaled
/// to stop.
pub struct Scheduler {
    stage: Stage,
    mode: ConcurrencyMode,
    cpu: usize,
    store: Arc<dyn WorkStore>,
    registry: Arc<ProxyRegistry>,
    request_fetcher: Option<Arc<RequestFetcher>>,
    selenium_fetcher: Option<Arc<SeleniumFetcher>>,
    rate_limiter: Arc<HostRateLimiter>,
    shutdown: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new(
        stage: Stage,
        mode: ConcurrencyMode,
        cpu: usize,
        store: Arc<dyn WorkStore>,
        registry: Arc<ProxyRegistry>,
        request_fetcher: Option<Arc<RequestFetcher>>,
        selenium_fetcher: Option<Arc<SeleniumFetcher>>,
        rate_limiter: Arc<HostRateLimiter>,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            stage,
            mode,
            cpu,
            store,
            registry,
            request_fetcher,
            selenium_fetcher,
            rate_limiter,
            shutdown,
        }
    }

    /// A sender the caller can use to trigger shutdown from elsewhere (e.g.
    /// a second `ctrl_c()` listener shared across multiple schedulers).
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Runs until `ctrl_c()` or an external trip of the shutdown handle,
    /// then tears down every proxy supervisor via `_exit()` semantics.
    /// Returns once teardown completes; never returns an error from normal
    /// shutdown (per-attempt errors are logged and turned into history rows
    /// by the fetchers themselves).
    pub async fn run(&self) -> Result<(), WorkError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        let ctrl_c = async {
            let _ = tokio::signal::ctrl_c().await;
        };

        tokio::select! {
            _ = ctrl_c => {
                info!(stage = self.stage.as_str(), "shutdown signal received");
            }
            _ = shutdown_rx.recv() => {
                info!(stage = self.stage.as_str(), "shutdown requested");
            }
            _ = self.main_loop() => {
                info!(stage = self.stage.as_str(), "main loop returned");
            }
        }

        self.exit().await;
        Ok(())
    }

    /// Claim -> dispatch -> await batch -> idle-sleep, repeated forever.
    /// Runs as a plain future so [`Scheduler::run`]'s `select!` can race it
    /// against the shutdown signal.
    async fn main_loop(&self) {
        loop {
            let batch_size = self.mode.batch_size(self.cpu);
            match self.stage {
                Stage::Crawler => self.tick_crawler(batch_size).await,
                Stage::Loader => self.tick_loader(batch_size).await,
            }
        }
    }

    async fn tick_crawler(&self, batch_size: usize) {
        let hostnames = match self.store.load_hostname(batch_size).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "hostname claim failed");
                tokio::time::sleep(MAX_IDLE_SLEEP).await;
                return;
            }
        };
        if !hostnames.is_empty() {
            let mut set = JoinSet::new();
            for entry in hostnames {
                let Some(fetcher) = self.request_fetcher.clone() else { break };
                let store = self.store.clone();
                set.spawn(async move {
                    fetcher.preflight_host(&entry.url).await;
                    if let Err(e) = store.ack(QueueKind::Hostname, &entry.url_hash).await {
                        warn!(host = %entry.url, error = %e, "hostname ack failed");
                    }
                });
            }
            while set.join_next().await.is_some() {}
        }

        let requests = match self.store.load_requests(batch_size).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "requests claim failed");
                tokio::time::sleep(MAX_IDLE_SLEEP).await;
                return;
            }
        };

        if requests.is_empty() {
            tokio::time::sleep(Duration::from_secs(1).min(MAX_IDLE_SLEEP)).await;
            return;
        }

        let mut set = JoinSet::new();
        for entry in requests {
            let Some(fetcher) = self.request_fetcher.clone() else { continue };
            let rate_limiter = self.rate_limiter.clone();
            let store = self.store.clone();
            set.spawn(async move {
                let Ok(link) = darc_link::parse(&entry.url, None) else { return };
                if let Some(wait) = rate_limiter.try_acquire(&link.host) {
                    let _ = store
                        .save_requests(
                            std::slice::from_ref(&link),
                            (chrono::Utc::now().timestamp() as f64) + wait.as_secs_f64(),
                            false,
                        )
                        .await;
                    return;
                }
                match fetcher.process(&link).await {
                    Ok(()) => {
                        if let Err(e) = store.ack(QueueKind::Requests, &link.url_hash).await {
                            warn!(url = %link.original, error = %e, "ack failed");
                        }
                    }
                    Err(e) => warn!(url = %link.original, error = %e, "stage one attempt failed"),
                }
            });
        }
        while set.join_next().await.is_some() {}
    }

    async fn tick_loader(&self, batch_size: usize) {
        let entries = match self.store.load_selenium(batch_size).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "selenium claim failed");
                tokio::time::sleep(MAX_IDLE_SLEEP).await;
                return;
            }
        };
        if entries.is_empty() {
            tokio::time::sleep(Duration::from_secs(1).min(MAX_IDLE_SLEEP)).await;
            return;
        }

        let mut set = JoinSet::new();
        for entry in entries {
            let Some(fetcher) = self.selenium_fetcher.clone() else { continue };
            let store = self.store.clone();
            set.spawn(async move {
                let Ok(link) = darc_link::parse(&entry.url, None) else { return };
                match fetcher.process(&link).await {
                    Ok(()) => {
                        if let Err(e) = store.ack(QueueKind::Selenium, &link.url_hash).await {
                            warn!(url = %link.original, error = %e, "ack failed");
                        }
                    }
                    Err(e) => warn!(url = %link.original, error = %e, "stage two attempt failed"),
                }
            });
        }

        // Bound how long we wait for in-flight renders before the next
        // claim, matching the hard shutdown grace this scheduler also uses.
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while set.join_next().await.is_some() {}
        })
        .await;
    }

    /// `_exit()` equivalent: stop claiming (the caller already exited
    /// `main_loop`), await nothing further (workers are best-effort
    /// abandoned past the grace window), then tear down every supervisor.
    /// Idempotent and infallible — matches the teardown contract every
    /// supervisor already honors.
    async fn exit(&self) {
        info!(stage = self.stage.as_str(), "tearing down proxy supervisors");
        self.registry.stop_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_is_one_for_cooperative_mode() {
        assert_eq!(ConcurrencyMode::Cooperative.batch_size(8), 1);
        assert_eq!(ConcurrencyMode::MultiThread.batch_size(8), 8);
    }

    #[test]
    fn stage_round_trips_through_str() {
        use std::str::FromStr;
        assert_eq!(Stage::from_str("crawler").unwrap(), Stage::Crawler);
        assert_eq!(Stage::from_str("loader").unwrap(), Stage::Loader);
        assert!(Stage::from_str("bogus").is_err());
    }
}
