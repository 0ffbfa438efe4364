//! Defaults mirrored from the environment-variable override contract. Each
//! constant here is the fallback a [`crate::config::AppConfig`] field takes
//! when the corresponding environment variable is unset.

use std::time::Duration;

/// `TIME_CACHE` default: grace interval before a claimed queue entry becomes
/// claimable again.
pub const DEFAULT_TIME_CACHE_SECS: f64 = 60.0;

/// `SE_WAIT` default: headless browser page-load timeout.
pub const DEFAULT_SE_WAIT_SECS: f64 = 60.0;

/// `DARC_WAIT` default: protocol-level fetch timeout / post-render settle wait.
pub const DEFAULT_DARC_WAIT_SECS: f64 = 60.0;

/// Sentinel DOM returned by a browser that rendered nothing at all.
pub const SE_EMPTY: &str = "<html><head></head><body></body></html>";

/// Per-host token bucket: one request every this many seconds, by default.
pub const DEFAULT_HOST_RATE_SECS: f64 = 2.0;

/// Default number of renders before a headless browser instance is recycled.
pub const DEFAULT_BROWSER_RECYCLE_AFTER: u32 = 50;

/// Default HTTP redirect hop limit.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Default in-worker retry budget for transient network/5xx failures.
pub const DEFAULT_FETCH_RETRIES: u32 = 3;

/// Bootstrap retry budget for proxy daemons, absent an explicit `*_RETRY`.
pub const DEFAULT_PROXY_RETRY: u32 = 3;

pub fn duration_from_secs_f64(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}
