use serde::Deserialize;
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_DARC_WAIT_SECS, DEFAULT_PROXY_RETRY, DEFAULT_SE_WAIT_SECS, DEFAULT_TIME_CACHE_SECS,
};

/// Top-level configuration, loaded from `config/default.toml` (or an
/// embedded fallback) and then overridden field-by-field from the `DARC_*`
/// / `REDIS_URL` / `DB_URL` / `*_LIST` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub store: StoreConfig,
    pub filters: FilterConfig,
    pub tor: ProxyConfig,
    pub i2p: ProxyConfig,
    pub zeronet: ProxyConfig,
    pub freenet: ProxyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default)]
    pub reboot: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub force: bool,
    #[serde(default = "default_cpu")]
    pub cpu: usize,
    #[serde(default)]
    pub multiprocessing: bool,
    #[serde(default)]
    pub multithreading: bool,
    /// Non-root user for dropping privileges when launching proxy daemons.
    /// Must not equal `root` — enforced at load time.
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_path_data")]
    pub path_data: PathBuf,
    /// Seconds, `None` = disabled (`TIME_CACHE=inf`). Grace interval before a
    /// claimed queue entry becomes claimable again.
    #[serde(default = "default_time_cache")]
    pub time_cache_secs: Option<f64>,
    /// Seconds, `None` = disabled (`SE_WAIT=inf`). Headless browser page-load
    /// timeout.
    #[serde(default = "default_se_wait")]
    pub se_wait_secs: Option<f64>,
    /// Seconds, `None` = disabled (`DARC_WAIT=inf`). Protocol-fetch timeout /
    /// post-render settle wait.
    #[serde(default = "default_darc_wait")]
    pub darc_wait_secs: Option<f64>,
}

fn default_cpu() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}
fn default_user() -> String {
    "darc".to_string()
}
fn default_path_data() -> PathBuf {
    PathBuf::from("/var/lib/darc")
}
fn default_time_cache() -> Option<f64> {
    Some(DEFAULT_TIME_CACHE_SECS)
}
fn default_se_wait() -> Option<f64> {
    Some(DEFAULT_SE_WAIT_SECS)
}
fn default_darc_wait() -> Option<f64> {
    Some(DEFAULT_DARC_WAIT_SECS)
}

impl GeneralConfig {
    pub fn validate(&self) -> Result<(), crate::error::WorkError> {
        if self.multiprocessing && self.multithreading {
            return Err(crate::error::WorkError::Config(
                "DARC_MULTIPROCESSING and DARC_MULTITHREADING are mutually exclusive".into(),
            ));
        }
        if self.user == "root" {
            return Err(crate::error::WorkError::Config(
                "DARC_USER must not be root".into(),
            ));
        }
        Ok(())
    }
}

/// Selects the Work Store backend: `REDIS_URL` set selects the sorted-set
/// backend; otherwise `DB_URL` selects the relational backend.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct StoreConfig {
    pub redis_url: Option<String>,
    pub db_url: Option<String>,
}

/// Raw white/black-list patterns plus their fallback verdicts. Compiled to
/// `Regex` by the consumer (`darc-store`) rather than here, so this crate
/// stays free of a hard dependency on how matching is implemented.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FilterConfig {
    #[serde(default)]
    pub link_white_list: Vec<String>,
    #[serde(default)]
    pub link_black_list: Vec<String>,
    #[serde(default)]
    pub mime_white_list: Vec<String>,
    #[serde(default)]
    pub mime_black_list: Vec<String>,
    #[serde(default)]
    pub proxy_white_list: Vec<String>,
    #[serde(default)]
    pub proxy_black_list: Vec<String>,
    #[serde(default)]
    pub link_fallback: bool,
    #[serde(default)]
    pub mime_fallback: bool,
    #[serde(default)]
    pub proxy_fallback: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProxyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_retry")]
    pub retry: u32,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_retry() -> u32 {
    DEFAULT_PROXY_RETRY
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            retry: DEFAULT_PROXY_RETRY,
            extra_args: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Loads from `path`, falling back to the embedded default on read
    /// failure, then layers environment-variable overrides on top: a
    /// two-layer pattern covering the `DARC_*`/`REDIS_URL`/`DB_URL`/`*_LIST`
    /// contract.
    pub fn load(path: &std::path::Path, embedded_default: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path).unwrap_or_else(|_| {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            embedded_default.to_string()
        });
        let mut config: AppConfig = toml::from_str(&raw)?;
        config.apply_env_overrides();
        config.general.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        let bool_var = |name: &str| -> Option<bool> {
            std::env::var(name)
                .ok()
                .map(|v| !(v == "0" || v.eq_ignore_ascii_case("false")))
        };
        let f64_var = |name: &str| -> Option<Option<f64>> {
            std::env::var(name).ok().map(|v| {
                if v.eq_ignore_ascii_case("inf") {
                    None
                } else {
                    v.parse::<f64>().ok()
                }
            })
        };

        if let Some(v) = bool_var("DARC_REBOOT") {
            self.general.reboot = v;
        }
        if let Some(v) = bool_var("DARC_DEBUG") {
            self.general.debug = v;
        }
        if let Some(v) = bool_var("DARC_VERBOSE") {
            self.general.verbose = v;
        }
        if let Some(v) = bool_var("DARC_FORCE") {
            self.general.force = v;
        }
        if let Some(v) = bool_var("DARC_MULTIPROCESSING") {
            self.general.multiprocessing = v;
        }
        if let Some(v) = bool_var("DARC_MULTITHREADING") {
            self.general.multithreading = v;
        }
        if let Ok(v) = std::env::var("DARC_CPU") {
            if let Ok(n) = v.parse::<usize>() {
                if n > 0 {
                    self.general.cpu = n;
                }
            }
        }
        if let Ok(v) = std::env::var("DARC_USER") {
            self.general.user = v;
        }
        if let Ok(v) = std::env::var("PATH_DATA") {
            self.general.path_data = PathBuf::from(v);
        }
        if let Some(v) = f64_var("TIME_CACHE") {
            self.general.time_cache_secs = v;
        }
        if let Some(v) = f64_var("SE_WAIT") {
            self.general.se_wait_secs = v;
        }
        if let Some(v) = f64_var("DARC_WAIT") {
            self.general.darc_wait_secs = v;
        }

        if let Ok(v) = std::env::var("REDIS_URL") {
            self.store.redis_url = Some(v);
        }
        if let Ok(v) = std::env::var("DB_URL") {
            self.store.db_url = Some(v);
        }

        let list_var = |name: &str| -> Option<Vec<String>> {
            std::env::var(name)
                .ok()
                .and_then(|v| serde_json::from_str::<Vec<String>>(&v).ok())
        };
        if let Some(v) = list_var("LINK_WHITE_LIST") {
            self.filters.link_white_list = v;
        }
        if let Some(v) = list_var("LINK_BLACK_LIST") {
            self.filters.link_black_list = v;
        }
        if let Some(v) = list_var("MIME_WHITE_LIST") {
            self.filters.mime_white_list = v;
        }
        if let Some(v) = list_var("MIME_BLACK_LIST") {
            self.filters.mime_black_list = v;
        }
        if let Some(v) = list_var("PROXY_WHITE_LIST") {
            self.filters.proxy_white_list = v;
        }
        if let Some(v) = list_var("PROXY_BLACK_LIST") {
            self.filters.proxy_black_list = v;
        }
        if let Some(v) = bool_var("LINK_FALLBACK") {
            self.filters.link_fallback = v;
        }
        if let Some(v) = bool_var("MIME_FALLBACK") {
            self.filters.mime_fallback = v;
        }
        if let Some(v) = bool_var("PROXY_FALLBACK") {
            self.filters.proxy_fallback = v;
        }

        if let Some(v) = bool_var("TOR_ENABLED") {
            self.tor.enabled = v;
        }
        if let Some(v) = bool_var("I2P_ENABLED") {
            self.i2p.enabled = v;
        }
        if let Some(v) = bool_var("ZERONET_ENABLED") {
            self.zeronet.enabled = v;
        }
        if let Some(v) = bool_var("FREENET_ENABLED") {
            self.freenet.enabled = v;
        }
        if let Ok(v) = std::env::var("TOR_RETRY") {
            if let Ok(n) = v.parse() {
                self.tor.retry = n;
            }
        }
        if let Ok(v) = std::env::var("I2P_RETRY") {
            if let Ok(n) = v.parse() {
                self.i2p.retry = n;
            }
        }
        if let Ok(v) = std::env::var("ZERONET_RETRY") {
            if let Ok(n) = v.parse() {
                self.zeronet.retry = n;
            }
        }
        if let Ok(v) = std::env::var("FREENET_RETRY") {
            if let Ok(n) = v.parse() {
                self.freenet.retry = n;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
        [general]
        [store]
        [filters]
        [tor]
        [i2p]
        [zeronet]
        [freenet]
        "#
    }

    #[test]
    fn defaults_parse_from_minimal_toml() {
        let config: AppConfig = toml::from_str(minimal_toml()).unwrap();
        assert!(!config.general.multiprocessing);
        assert_eq!(config.general.time_cache_secs, Some(DEFAULT_TIME_CACHE_SECS));
        assert!(!config.tor.enabled);
    }

    #[test]
    fn mutually_exclusive_concurrency_modes_rejected() {
        let mut config: AppConfig = toml::from_str(minimal_toml()).unwrap();
        config.general.multiprocessing = true;
        config.general.multithreading = true;
        assert!(config.general.validate().is_err());
    }

    #[test]
    fn root_user_rejected() {
        let mut config: AppConfig = toml::from_str(minimal_toml()).unwrap();
        config.general.user = "root".to_string();
        assert!(config.general.validate().is_err());
    }
}
