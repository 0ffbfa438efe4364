use thiserror::Error;

/// The shared error taxonomy for every crate in the workspace, so a single
/// `?` chain can cross store/proxy/fetch boundaries.
#[derive(Error, Debug)]
pub enum WorkError {
    #[error("work store unavailable: {0}")]
    WorkStoreUnavailable(String),

    #[error("{0} bootstrap failed after retry budget exhausted")]
    ProxyBootstrapFailed(String),

    #[error("{0} is not supported on this platform")]
    UnsupportedPlatform(String),

    #[error("network timeout after {0:?}")]
    NetworkTimeout(std::time::Duration),

    #[error("transient network error: {0}")]
    NetworkTransient(String),

    #[error("client error: HTTP {0}")]
    HttpErrorClient(u16),

    #[error("server error: HTTP {0}")]
    HttpErrorServer(u16),

    #[error("robots.txt denies this URL")]
    RobotsDenied,

    #[error("content-type filtered: {0}")]
    MimeDenied(String),

    #[error("proxy kind filtered")]
    ProxyDenied,

    #[error("render timed out after {0:?}")]
    RenderTimeout(std::time::Duration),

    #[error("render produced an empty page")]
    RenderEmpty,

    #[error("database operation failed: {0}")]
    DatabaseOperationFailed(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: usize, max: usize },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl WorkError {
    /// Whether this outcome should be retried in-worker (not whether a
    /// supervisor-level retry is warranted — that's decided by the caller
    /// holding the retry counter).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkError::NetworkTimeout(_)
                | WorkError::NetworkTransient(_)
                | WorkError::HttpErrorServer(_)
        )
    }
}
