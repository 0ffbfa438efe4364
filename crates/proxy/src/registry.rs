use std::sync::Arc;

use darc_core::config::AppConfig;

use crate::profile::ProxyDaemonKind;
use crate::supervisor::Supervisor;

/// Process-wide map of proxy kind to its supervisor. One registry per
/// process; in multi-process mode each child constructs its own, never
/// sharing supervisors across processes.
pub struct ProxyRegistry {
    tor: Arc<Supervisor>,
    i2p: Arc<Supervisor>,
    zeronet: Arc<Supervisor>,
    freenet: Arc<Supervisor>,
}

impl ProxyRegistry {
    pub fn new(config: &AppConfig) -> Self {
        let user = config.general.user.clone();
        let ua = format!("darc/{}", env!("CARGO_PKG_VERSION"));
        Self {
            tor: Arc::new(Supervisor::new(
                ProxyDaemonKind::Tor,
                config.tor.retry,
                user.clone(),
                config.tor.extra_args.clone(),
                ua.clone(),
            )),
            i2p: Arc::new(Supervisor::new(
                ProxyDaemonKind::I2p,
                config.i2p.retry,
                user.clone(),
                config.i2p.extra_args.clone(),
                ua.clone(),
            )),
            zeronet: Arc::new(Supervisor::new(
                ProxyDaemonKind::Zeronet,
                config.zeronet.retry,
                user.clone(),
                config.zeronet.extra_args.clone(),
                ua.clone(),
            )),
            freenet: Arc::new(Supervisor::new(
                ProxyDaemonKind::Freenet,
                config.freenet.retry,
                user,
                config.freenet.extra_args.clone(),
                ua,
            )),
        }
    }

    pub fn supervisor(&self, kind: ProxyDaemonKind) -> Arc<Supervisor> {
        match kind {
            ProxyDaemonKind::Tor => self.tor.clone(),
            ProxyDaemonKind::I2p => self.i2p.clone(),
            ProxyDaemonKind::Zeronet => self.zeronet.clone(),
            ProxyDaemonKind::Freenet => self.freenet.clone(),
        }
    }

    /// `_exit()` equivalent: stops every supervisor, swallowing individual
    /// failures so one stuck daemon never blocks the rest. Idempotent.
    pub async fn stop_all(&self) {
        for sup in [&self.tor, &self.i2p, &self.zeronet, &self.freenet] {
            sup.stop().await;
        }
    }
}
