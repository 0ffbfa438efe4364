//! Stage one: protocol-level HTTP fetch. Robots/sitemap/hosts.txt preflight,
//! the GET itself, link extraction, and enqueueing of next-stage work.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use darc_core::{FetchOutcome, WorkError};
use darc_link::{Link, ProxyKind};
use darc_proxy::{ProxyDaemonKind, ProxyRegistry};
use darc_store::{FilterLists, HistoryEntry, WorkStore};
use darc_submit::{RequestsHistoryRow, SubmitSink};
use tracing::{info, warn};

use crate::extract::{self, family_for};
use crate::robots::Robots;

const MAX_REDIRECTS: usize = darc_core::constants::DEFAULT_MAX_REDIRECTS;
const RETRY_BACKOFFS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(4),
    Duration::from_secs(16),
];

pub(crate) fn proxy_daemon_kind(proxy: ProxyKind) -> Option<ProxyDaemonKind> {
    match proxy {
        ProxyKind::Tor => Some(ProxyDaemonKind::Tor),
        ProxyKind::I2p => Some(ProxyDaemonKind::I2p),
        ProxyKind::Zeronet => Some(ProxyDaemonKind::Zeronet),
        ProxyKind::Freenet => Some(ProxyDaemonKind::Freenet),
        _ => None,
    }
}

pub struct RequestFetcher {
    store: Arc<dyn WorkStore>,
    registry: Arc<ProxyRegistry>,
    filters: Arc<FilterLists>,
    submit: Option<Arc<SubmitSink>>,
    data_root: PathBuf,
    force: bool,
    mime_fallback: bool,
    preflighted: DashMap<String, Robots>,
}

impl RequestFetcher {
    pub fn new(
        store: Arc<dyn WorkStore>,
        registry: Arc<ProxyRegistry>,
        filters: Arc<FilterLists>,
        submit: Option<Arc<SubmitSink>>,
        data_root: PathBuf,
        force: bool,
        mime_fallback: bool,
    ) -> Self {
        Self {
            store,
            registry,
            filters,
            submit,
            data_root,
            force,
            mime_fallback,
            preflighted: DashMap::new(),
        }
    }

    /// Runs just the one-time robots/sitemap preflight for a bare host
    /// claimed off the hostname queue, independent of any particular
    /// request. Best-effort: parse failures and unreachable hosts are
    /// swallowed since there is no specific URL attempt to record history
    /// against.
    pub async fn preflight_host(&self, host: &str) {
        let Ok(root) = darc_link::parse(&format!("https://{host}/"), None) else {
            return;
        };
        let Ok(client) = self.client_for(&root).await else {
            return;
        };
        let base = darc_link::base_path(&self.data_root, &root);
        self.preflight(&root, &client, &base).await;
    }

    /// Runs the full stage-one sequence for one claimed link.
    pub async fn process(&self, link: &Link) -> Result<(), WorkError> {
        let client = self.client_for(link).await?;
        let base = darc_link::base_path(&self.data_root, link);

        self.preflight(link, &client, &base).await;

        let robots = self
            .preflighted
            .get(&link.host_hash)
            .map(|r| r.value().is_allowed(&link.path))
            .unwrap_or(true);
        if !robots && !self.force {
            self.record(link, FetchOutcome::RobotsDenied).await;
            return Ok(());
        }

        if !self.mime_allowed(&client, link).await {
            self.record(link, FetchOutcome::MimeDenied).await;
            return Ok(());
        }

        self.fetch_and_enqueue(link, &client, &base).await
    }

    async fn client_for(&self, link: &Link) -> Result<rquest::Client, WorkError> {
        if !self.filters.allows_proxy(link.proxy.as_str()) {
            return Err(WorkError::ProxyDenied);
        }
        match proxy_daemon_kind(link.proxy) {
            Some(kind) => {
                let sup = self.registry.supervisor(kind);
                sup.http_session(MAX_REDIRECTS)
                    .await
                    .map_err(WorkError::from)
            }
            None => rquest::Client::builder()
                .redirect(rquest::redirect::Policy::limited(MAX_REDIRECTS))
                .build()
                .map_err(|e| WorkError::Other(e.into())),
        }
    }

    async fn preflight(&self, link: &Link, client: &rquest::Client, base: &Path) {
        if self.preflighted.contains_key(&link.host_hash) {
            return;
        }

        let root = format!("{}://{}", link.scheme, link.host);
        let robots_url = format!("{root}/robots.txt");
        let robots_text = match client.get(&robots_url).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
            _ => String::new(),
        };
        let _ = tokio::fs::create_dir_all(base).await;
        let ts = chrono::Utc::now().timestamp();
        let _ = tokio::fs::write(base.join(format!("robots.txt.{ts}")), &robots_text).await;
        if let Some(submit) = &self.submit {
            submit.submit_robots(&link.host, chrono::Utc::now(), &robots_text).await;
        }

        let robots = Robots::parse(&robots_text);

        let sitemap_url = format!("{root}/sitemap.xml");
        if let Ok(resp) = client.get(&sitemap_url).send().await {
            if resp.status().is_success() {
                if let Ok(text) = resp.text().await {
                    if let Some(submit) = &self.submit {
                        submit.submit_sitemap(&link.host, chrono::Utc::now(), &text).await;
                    }
                    let links = extract::extract_links(
                        crate::extract::ContentFamily::Xml,
                        &text,
                        &url::Url::parse(&root).unwrap_or_else(|_| url::Url::parse("http://invalid/").unwrap()),
                    );
                    self.enqueue_links(link, links).await;
                }
            }
        }

        if link.proxy == ProxyKind::I2p {
            self.preflight_i2p_hosts(link, client, base).await;
        }

        self.preflighted.insert(link.host_hash.clone(), robots);
    }

    async fn preflight_i2p_hosts(&self, link: &Link, client: &rquest::Client, base: &Path) {
        let hosts_path = base.join("hosts.txt");
        let text = if let Ok(cached) = tokio::fs::read_to_string(&hosts_path).await {
            cached
        } else {
            let url = format!("{}://{}/hosts.txt", link.scheme, link.host);
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let text = resp.text().await.unwrap_or_default();
                    let _ = tokio::fs::write(&hosts_path, &text).await;
                    if let Some(submit) = &self.submit {
                        submit.submit_hosts(&link.host, chrono::Utc::now(), &text).await;
                    }
                    text
                }
                _ => return,
            }
        };

        let hosts: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .filter_map(|l| l.split('=').next())
            .map(|h| format!("http://{h}/"))
            .collect();
        self.enqueue_links(link, hosts).await;
    }

    async fn mime_allowed(&self, client: &rquest::Client, link: &Link) -> bool {
        let head = client
            .head(link.original.as_str())
            .send()
            .await
            .ok()
            .and_then(|r| r.headers().get("content-type").cloned())
            .and_then(|v| v.to_str().map(str::to_string).ok());

        match head {
            Some(ct) => self.filters.allows_mime(&ct) || self.mime_fallback,
            None => true, // no content-type advertised by HEAD; defer to the GET
        }
    }

    async fn fetch_and_enqueue(
        &self,
        link: &Link,
        client: &rquest::Client,
        base: &Path,
    ) -> Result<(), WorkError> {
        for (attempt, backoff) in std::iter::once(Duration::ZERO).chain(RETRY_BACKOFFS).enumerate() {
            if attempt > 0 {
                tokio::time::sleep(backoff).await;
            }
            match client.get(link.original.as_str()).send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if (500..600).contains(&status) && attempt < RETRY_BACKOFFS.len() {
                        warn!(url = %link.original, status, attempt, "server error, retrying");
                        continue;
                    }
                    return self.persist_response(link, base, resp, status).await;
                }
                Err(e) => {
                    warn!(url = %link.original, error = %e, attempt, "fetch failed");
                    if attempt >= RETRY_BACKOFFS.len() {
                        break;
                    }
                }
            }
        }
        self.record(link, FetchOutcome::Timeout).await;
        Err(WorkError::NetworkTimeout(Duration::from_secs(60)))
    }

    async fn persist_response(
        &self,
        link: &Link,
        base: &Path,
        resp: rquest::Response,
        status: u16,
    ) -> Result<(), WorkError> {
        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let headers_blob = format!("{:?}", resp.headers()).into_bytes();
        let body = resp.bytes().await.map_err(|e| WorkError::Other(e.into()))?;

        let dir = base.join(&link.url_hash);
        let _ = tokio::fs::create_dir_all(&dir).await;
        let now = chrono::Utc::now();
        let ts = now.timestamp();
        let _ = tokio::fs::write(dir.join(format!("{ts}_{status}.dat")), &body).await;

        self.record(link, FetchOutcome::Fetched { status }).await;
        if let Some(submit) = &self.submit {
            let row = RequestsHistoryRow {
                url_hash: link.url_hash.clone(),
                timestamp: now,
                method: "GET".to_string(),
                status_code: Some(status as i32),
                response_headers: headers_blob,
                response_body: body.to_vec(),
                content_type: content_type.clone(),
                response_mime: content_type.clone(),
                ..Default::default()
            };
            submit.submit_requests_history(&row).await;
        }

        if (200..300).contains(&status) {
            let body_str = String::from_utf8_lossy(&body);
            let base_url = url::Url::parse(&link.original)
                .unwrap_or_else(|_| url::Url::parse("http://invalid/").unwrap());
            let family = family_for(content_type.as_deref());
            let links = extract::extract_links(family, &body_str, &base_url);
            self.enqueue_links(link, links).await;

            if family == crate::extract::ContentFamily::Html {
                self.store.save_selenium(link, 0.0, true).await?;
            }
        }
        Ok(())
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
            warn!(error = %e, "failed to enqueue discovered links");
        }
    }

    async fn record(&self, link: &Link, outcome: FetchOutcome) {
        info!(url = %link.original, outcome = outcome.label(), "stage one outcome");
        let entry = HistoryEntry {
            url_hash: link.url_hash.clone(),
            timestamp: chrono::Utc::now(),
            method: "GET".to_string(),
            outcome,
            content_type: None,
        };
        if let Err(e) = self.store.append_history(entry).await {
            warn!(error = %e, "history append failed");
        }
    }
}
