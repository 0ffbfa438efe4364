use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("{0} bootstrap failed after retry budget exhausted")]
    BootstrapFailed(String),

    #[error("{0} is not supported on this platform")]
    UnsupportedPlatform(String),

    #[error("proxy denied: {0} supervisor is in failed state")]
    Denied(String),

    #[error("daemon spawn failed: {0}")]
    Spawn(String),
}

impl From<ProxyError> for darc_core::WorkError {
    fn from(e: ProxyError) -> Self {
        match e {
            ProxyError::BootstrapFailed(k) => darc_core::WorkError::ProxyBootstrapFailed(k),
            ProxyError::UnsupportedPlatform(p) => darc_core::WorkError::UnsupportedPlatform(p),
            ProxyError::Denied(_) => darc_core::WorkError::ProxyDenied,
            ProxyError::Spawn(s) => darc_core::WorkError::Config(s),
        }
    }
}
