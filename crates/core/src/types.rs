use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Configuration shared by both fetch stages: timeouts, body caps, UA string.
/// Populated per-proxy by a [`darc_proxy`] supervisor before handing a client
/// to the Request or Selenium Fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_body_size: usize,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_body_size: 10 * 1024 * 1024,
            follow_redirects: true,
            max_redirects: crate::constants::DEFAULT_MAX_REDIRECTS,
            user_agent: String::new(),
        }
    }
}

/// One completed protocol-level HTTP exchange, the shape both the Request
/// Fetcher and the Submit Sink operate on.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: Url,
    pub final_url: Url,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    pub response_time_ms: u64,
}

/// The three work queues named in the data model. `Hostname` gates
/// per-host preflight; `Requests` and `Selenium` feed the two fetch stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    Hostname,
    Requests,
    Selenium,
}

impl QueueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueKind::Hostname => "hostname",
            QueueKind::Requests => "requests",
            QueueKind::Selenium => "selenium",
        }
    }
}

/// A claimed queue entry: the stored URL text plus the score it was claimed
/// at. Returned by `load_*` on a [`darc_store::WorkStore`].
#[derive(Debug, Clone)]
pub struct ClaimedEntry {
    pub url_hash: String,
    pub url: String,
    pub score: f64,
}

/// Outcome recorded in the requests-history table for a single attempt.
/// `Fetched` is the only variant carrying a status code; the rest are the
/// drop reasons named in spec §4.4/§7.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FetchOutcome {
    Fetched { status: u16 },
    RobotsDenied,
    MimeDenied,
    ProxyDenied,
    Timeout,
    RenderTimeout,
    RenderEmpty,
}

impl FetchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Fetched { .. } => "fetched",
            FetchOutcome::RobotsDenied => "robots-denied",
            FetchOutcome::MimeDenied => "mime-denied",
            FetchOutcome::ProxyDenied => "proxy-denied",
            FetchOutcome::Timeout => "timeout",
            FetchOutcome::RenderTimeout => "render-timeout",
            FetchOutcome::RenderEmpty => "render-empty",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_kind_labels_are_stable() {
        assert_eq!(QueueKind::Hostname.as_str(), "hostname");
        assert_eq!(QueueKind::Requests.as_str(), "requests");
        assert_eq!(QueueKind::Selenium.as_str(), "selenium");
    }

    #[test]
    fn fetch_outcome_label_matches_history_reason() {
        assert_eq!(FetchOutcome::RobotsDenied.label(), "robots-denied");
        assert_eq!(FetchOutcome::Fetched { status: 200 }.label(), "fetched");
    }
}
