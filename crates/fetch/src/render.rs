//! Stage two: headless-browser render, screenshot + DOM capture, link
//! extraction from the rendered page, persistence.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use darc_core::constants::SE_EMPTY;
use darc_core::{FetchOutcome, WorkError};
use darc_link::Link;
use darc_proxy::ProxyRegistry;
use darc_store::{FilterLists, HistoryEntry, WorkStore};
use darc_submit::{SeleniumSnapshotRow, SubmitSink};
use headless_chrome::Browser;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::extract::{self, ContentFamily};
use crate::request::proxy_daemon_kind;

/// A pooled browser per proxy kind, recycled after `recycle_after`
/// navigations to bound memory growth. At most one concurrent navigation
/// per driver — callers hold the pool's lock for the duration of a render.
struct BrowserSlot {
    browser: Option<Browser>,
    navigations: u32,
}

pub struct SeleniumFetcher {
    store: Arc<dyn WorkStore>,
    registry: Arc<ProxyRegistry>,
    filters: Arc<FilterLists>,
    submit: Option<Arc<SubmitSink>>,
    data_root: PathBuf,
    se_wait: Option<Duration>,
    darc_wait: Option<Duration>,
    recycle_after: u32,
    pools: dashmap::DashMap<&'static str, Arc<Mutex<BrowserSlot>>>,
}

impl SeleniumFetcher {
    pub fn new(
        store: Arc<dyn WorkStore>,
        registry: Arc<ProxyRegistry>,
        filters: Arc<FilterLists>,
        submit: Option<Arc<SubmitSink>>,
        data_root: PathBuf,
        se_wait: Option<Duration>,
        darc_wait: Option<Duration>,
        recycle_after: u32,
    ) -> Self {
        Self {
            store,
            registry,
            filters,
            submit,
            data_root,
            se_wait,
            darc_wait,
            recycle_after,
            pools: dashmap::DashMap::new(),
        }
    }

    pub async fn process(&self, link: &Link) -> Result<(), WorkError> {
        let pool = self.pool_for(link).await?;
        let mut slot = pool.lock().await;

        if slot.browser.is_none() || slot.navigations >= self.recycle_after {
            slot.browser = Some(self.new_browser(link).await?);
            slot.navigations = 0;
        }
        let browser = slot.browser.as_ref().expect("just populated");

        let tab = browser.new_tab().map_err(|e| WorkError::Other(e.into()))?;
        let navigated = match self.se_wait {
            Some(timeout) => {
                tokio::time::timeout(timeout, async {
                    tab.navigate_to(link.original.as_str())
                        .and_then(|t| t.wait_until_navigated())
                        .map(|_| ())
                })
                .await
            }
            None => Ok(tab
                .navigate_to(link.original.as_str())
                .and_then(|t| t.wait_until_navigated())
                .map(|_| ())),
        };

        let navigated = match navigated {
            Ok(Ok(())) => true,
            Ok(Err(_)) | Err(_) => false,
        };
        slot.navigations += 1;

        if !navigated {
            drop(slot);
            self.record(link, FetchOutcome::RenderTimeout).await;
            return Ok(());
        }

        if let Some(settle) = self.darc_wait {
            tokio::time::sleep(settle).await;
        }

        let dom = tab.get_content().unwrap_or_default();
        if dom.trim() == SE_EMPTY {
            drop(slot);
            self.record(link, FetchOutcome::RenderEmpty).await;
            return Ok(());
        }

        let base = darc_link::base_path(&self.data_root, link);
        let dir = base.join(&link.url_hash);
        let _ = tokio::fs::create_dir_all(&dir).await;
        let now = chrono::Utc::now();
        let ts = now.timestamp();
        let html_path = dir.join(format!("{ts}.html"));
        let _ = tokio::fs::write(&html_path, &dom).await;

        let mut screenshot_path = None;
        if let Ok(png) = tab.capture_screenshot(
            headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption::Png,
            None,
            None,
            true,
        ) {
            let path = dir.join(format!("{ts}.png"));
            let _ = tokio::fs::write(&path, &png).await;
            screenshot_path = Some(path);
        }

        drop(slot);
        self.record(link, FetchOutcome::Fetched { status: 200 }).await;
        if let (Some(submit), Some(screenshot_path)) = (&self.submit, &screenshot_path) {
            let row = SeleniumSnapshotRow {
                url_hash: link.url_hash.clone(),
                timestamp: now,
                html_path: html_path.to_string_lossy().into_owned(),
                screenshot_path: screenshot_path.to_string_lossy().into_owned(),
            };
            submit.submit_selenium_snapshot(&row).await;
        }

        let base_url = url::Url::parse(&link.original)
            .unwrap_or_else(|_| url::Url::parse("http://invalid/").unwrap());
        let links = extract::extract_links(ContentFamily::Html, &dom, &base_url);
        self.enqueue_links(link, links).await;

        Ok(())
    }

    async fn pool_for(&self, link: &Link) -> Result<Arc<Mutex<BrowserSlot>>, WorkError> {
        if !self.filters.allows_proxy(link.proxy.as_str()) {
            return Err(WorkError::ProxyDenied);
        }
        let key = link.proxy.as_str();
        if let Some(pool) = self.pools.get(key) {
            return Ok(pool.clone());
        }
        let pool = Arc::new(Mutex::new(BrowserSlot { browser: None, navigations: 0 }));
        self.pools.insert(key, pool.clone());
        Ok(pool)
    }

    async fn new_browser(&self, link: &Link) -> Result<Browser, WorkError> {
        match proxy_daemon_kind(link.proxy) {
            Some(kind) => {
                let sup = self.registry.supervisor(kind);
                sup.browser(self.se_wait).await.map_err(WorkError::from)
            }
            None => headless_chrome::Browser::new(headless_chrome::LaunchOptions {
                headless: true,
                ..Default::default()
            })
            .map_err(|e| WorkError::Other(e.into())),
        }
    }

    async fn enqueue_links(&self, referrer: &Link, urls: Vec<String>) {
        let mut parsed = Vec::with_capacity(urls.len());
        for u in urls {
            if !self.filters.allows_link(&u) {
                continue;
            }
            if let Ok(link) = darc_link::parse(&u, Some(referrer.url_hash.clone())) {
                parsed.push(link);
            }
        }
        if parsed.is_empty() {
            return;
        }
        if let Some(submit) = &self.submit {
            for link in &parsed {
                let base = darc_link::base_path(&self.data_root, link);
                if let Err(e) = submit.submit_link(link, &base.to_string_lossy()).await {
                    warn!(url = %link.original, error = %e, "link archival failed");
                }
            }
        }
        if let Err(e) = self.store.save_requests(&parsed, 0.0, true).await {
            warn!(error = %e, "failed to enqueue links discovered during render");
        }
    }

    async fn record(&self, link: &Link, outcome: FetchOutcome) {
        info!(url = %link.original, outcome = outcome.label(), "stage two outcome");
        let entry = HistoryEntry {
            url_hash: link.url_hash.clone(),
            timestamp: chrono::Utc::now(),
            method: "RENDER".to_string(),
            outcome,
            content_type: Some("text/html".to_string()),
        };
        if let Err(e) = self.store.append_history(entry).await {
            warn!(error = %e, "history append failed");
        }
    }
}
