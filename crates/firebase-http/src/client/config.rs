//! Configuration for the Firebase client.

use crate::protocol::constants::DEFAULT_TIMEOUT_SECS;
use std::time::Duration;

/// Environment variable overriding [`ClientConfig::timeout`], in milliseconds.
pub const ENV_TIMEOUT_MS: &str = "FIREBASE_TIMEOUT_MS";
/// Environment variable overriding [`ClientConfig::proxy_url`].
pub const ENV_PROXY: &str = "FIREBASE_PROXY";

/// Configuration for the Firebase client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Budget shared by connection setup and the wait for response headers.
    pub timeout: Duration,
    /// TCP keep-alive interval for pooled connections.
    pub tcp_keepalive: Duration,
    /// How long an idle pooled connection is kept.
    pub pool_idle_timeout: Duration,
    /// Proxy URL (optional).
    pub proxy_url: String,
    pub user_agent: String,
    /// Suggested capacity for watch channels.
    pub watch_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            tcp_keepalive: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            proxy_url: String::new(),
            user_agent: concat!("firebase-http/", env!("CARGO_PKG_VERSION")).to_string(),
            watch_buffer: 100,
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `FIREBASE_TIMEOUT_MS` and `FIREBASE_PROXY`.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.timeout = Duration::from_millis(ms),
                Err(_) => tracing::warn!("Ignoring invalid {}={:?}", ENV_TIMEOUT_MS, raw),
            }
        }
        if let Some(proxy) = lookup(ENV_PROXY) {
            self.proxy_url = proxy.trim().to_string();
        }
        self
    }
}
