use std::net::SocketAddr;
use std::time::Duration;

use headless_chrome::{Browser, LaunchOptionsBuilder};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::ProxyError;
use crate::profile::ProxyDaemonKind;

/// `idle -> bootstrapping -> (ready | failed) -> stopping -> idle`.
/// `ready -> bootstrapping` only via explicit [`Supervisor::restart`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Bootstrapping,
    Ready,
    Failed,
    Stopping,
}

/// Owns one proxy daemon's lifecycle: bootstrap, retry, teardown. Hands out
/// a configured HTTP client factory and browser factory once ready.
/// Bootstrap is lazy and single-flight: the first caller to `http_session`
/// or `browser` performs it; concurrent callers await the same attempt.
pub struct Supervisor {
    kind: ProxyDaemonKind,
    state: Mutex<State>,
    bootstrap_gate: Mutex<()>,
    child: Mutex<Option<Child>>,
    retry: u32,
    wait: Duration,
    user: String,
    extra_args: Vec<String>,
    user_agent: String,
}

impl Supervisor {
    pub fn new(kind: ProxyDaemonKind, retry: u32, user: String, extra_args: Vec<String>, user_agent: String) -> Self {
        Self {
            kind,
            state: Mutex::new(State::Idle),
            bootstrap_gate: Mutex::new(()),
            child: Mutex::new(None),
            retry,
            wait: kind.default_wait(),
            user,
            extra_args,
            user_agent,
        }
    }

    pub fn kind(&self) -> ProxyDaemonKind {
        self.kind
    }

    pub async fn state(&self) -> State {
        *self.state.lock().await
    }

    /// Starts the daemon if not already running and waits for its
    /// readiness probe to succeed, retrying up to the configured budget.
    /// Single-flight: concurrent callers block on `bootstrap_gate` and
    /// observe the same outcome rather than launching a second daemon.
    pub async fn bootstrap(&self) -> Result<(), ProxyError> {
        {
            let state = self.state.lock().await;
            match *state {
                State::Ready => return Ok(()),
                State::Failed => {
                    return Err(ProxyError::BootstrapFailed(self.kind.name().to_string()))
                }
                _ => {}
            }
        }

        let _gate = self.bootstrap_gate.lock().await;
        // Re-check after acquiring the gate: another caller may have
        // finished the bootstrap while we were waiting.
        {
            let state = self.state.lock().await;
            match *state {
                State::Ready => return Ok(()),
                State::Failed => {
                    return Err(ProxyError::BootstrapFailed(self.kind.name().to_string()))
                }
                _ => {}
            }
        }

        let running_as_root = std::env::var("USER").map(|u| u == "root").unwrap_or(false);
        if !ProxyDaemonKind::supported_on_current_platform(running_as_root) {
            *self.state.lock().await = State::Failed;
            return Err(ProxyError::UnsupportedPlatform(format!(
                "{} on {}",
                self.kind.name(),
                std::env::consts::OS
            )));
        }

        *self.state.lock().await = State::Bootstrapping;
        info!(proxy = self.kind.name(), "bootstrapping proxy daemon");

        for attempt in 0..=self.retry {
            match self.try_bootstrap_once().await {
                Ok(()) => {
                    *self.state.lock().await = State::Ready;
                    info!(proxy = self.kind.name(), attempt, "proxy daemon ready");
                    return Ok(());
                }
                Err(e) => {
                    warn!(proxy = self.kind.name(), attempt, error = %e, "bootstrap attempt failed");
                }
            }
        }

        *self.state.lock().await = State::Failed;
        Err(ProxyError::BootstrapFailed(self.kind.name().to_string()))
    }

    async fn try_bootstrap_once(&self) -> Result<(), ProxyError> {
        let already_listening = self.probe_ready().await;
        if !already_listening {
            self.spawn_daemon().await?;
        }

        let deadline = tokio::time::Instant::now() + self.wait;
        while tokio::time::Instant::now() < deadline {
            if self.probe_ready().await {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        Err(ProxyError::Spawn(format!(
            "{} did not become ready within {:?}",
            self.kind.name(),
            self.wait
        )))
    }

    async fn spawn_daemon(&self) -> Result<(), ProxyError> {
        let running_as_root = std::env::var("USER").map(|u| u == "root").unwrap_or(false);
        let args = self.kind.spawn_args(&self.user, running_as_root, &self.extra_args);
        let Some((program, rest)) = args.split_first() else {
            return Err(ProxyError::Spawn("empty daemon command".into()));
        };
        let child = Command::new(program)
            .args(rest)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProxyError::Spawn(e.to_string()))?;
        *self.child.lock().await = Some(child);
        Ok(())
    }

    async fn probe_ready(&self) -> bool {
        let addr: SocketAddr = match format!("127.0.0.1:{}", self.kind.loopback_port()).parse() {
            Ok(a) => a,
            Err(_) => return false,
        };
        tokio::time::timeout(Duration::from_secs(2), TcpStream::connect(addr))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }

    /// `ready -> bootstrapping`, the only path that re-enters bootstrap
    /// once ready.
    pub async fn restart(&self) -> Result<(), ProxyError> {
        self.stop().await;
        *self.state.lock().await = State::Idle;
        self.bootstrap().await
    }

    /// Idempotent: send terminate, wait, then kill. Never raises — all
    /// failures are logged and swallowed, matching the teardown contract
    /// every supervisor must honor.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if *state == State::Idle {
            return;
        }
        *state = State::Stopping;
        drop(state);

        let mut child_slot = self.child.lock().await;
        if let Some(mut child) = child_slot.take() {
            if let Err(e) = child.start_kill() {
                warn!(proxy = self.kind.name(), error = %e, "failed to signal daemon, continuing teardown");
            }
            match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
                Ok(Ok(status)) => {
                    info!(proxy = self.kind.name(), ?status, "daemon stopped");
                }
                Ok(Err(e)) => warn!(proxy = self.kind.name(), error = %e, "error waiting for daemon exit"),
                Err(_) => warn!(proxy = self.kind.name(), "daemon did not exit in time, abandoning"),
            }
        }

        *self.state.lock().await = State::Idle;
    }

    /// A configured HTTP client whose proxy is this daemon's loopback
    /// socket, TLS validation disabled for `.onion`/`.i2p` hosts, and
    /// redirects capped at the configured limit.
    pub async fn http_session(&self, max_redirects: usize) -> Result<rquest::Client, ProxyError> {
        self.bootstrap().await?;
        let proxy_url = format!("socks5h://127.0.0.1:{}", self.kind.loopback_port());
        let proxy = rquest::Proxy::all(proxy_url).map_err(|e| ProxyError::Spawn(e.to_string()))?;

        rquest::Client::builder()
            .proxy(proxy)
            .cert_verification(false)
            .redirect(rquest::redirect::Policy::limited(max_redirects))
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| ProxyError::Spawn(e.to_string()))
    }

    /// A headless-browser driver launched with this daemon's proxy and a
    /// page-load timeout equal to `SE_WAIT`.
    pub async fn browser(&self, se_wait: Option<Duration>) -> Result<Browser, ProxyError> {
        self.bootstrap().await?;
        let proxy_arg = format!("--proxy-server=socks5://127.0.0.1:{}", self.kind.loopback_port());

        let mut builder = LaunchOptionsBuilder::default();
        builder
            .headless(true)
            .window_size(Some((1920, 1080)))
            .args(vec![
                std::ffi::OsStr::new("--no-sandbox"),
                std::ffi::OsStr::new("--disable-dev-shm-usage"),
                std::ffi::OsStr::new("--disable-gpu"),
                std::ffi::OsStr::new(&proxy_arg),
            ]);
        if let Some(timeout) = se_wait {
            builder.idle_browser_timeout(timeout);
        }
        let options = builder.build().map_err(|e| ProxyError::Spawn(e.to_string()))?;
        Browser::new(options).map_err(|e| ProxyError::Spawn(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_supervisor_starts_idle() {
        let sup = Supervisor::new(ProxyDaemonKind::Tor, 3, "darc".into(), vec![], "darc/0.1".into());
        assert_eq!(sup.state().await, State::Idle);
    }

    #[tokio::test]
    async fn stop_on_idle_is_a_noop() {
        let sup = Supervisor::new(ProxyDaemonKind::I2p, 3, "darc".into(), vec![], "darc/0.1".into());
        sup.stop().await;
        sup.stop().await;
        assert_eq!(sup.state().await, State::Idle);
    }
}
