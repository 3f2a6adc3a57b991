use crate::error::{BrowserError, Result};
use rand::Rng;
use std::time::Duration;
use url::Url;

/// Default controller port, also used by the default puppet server URL
pub const DEFAULT_PORT: u16 = 47225;

/// Puppet ids are drawn from `[0, MAX_PUPPET_ID)`
pub const MAX_PUPPET_ID: u64 = 10_000_000_000_000;

/// Controller (puppeteer) options
#[derive(Debug, Clone)]
pub struct PuppeteerConfig {
    /// Interface the websocket server binds to
    pub host: String,

    /// Port to listen on, 0 picks a free one
    pub port: u16,

    /// How long `send_message` waits for a puppet before giving up
    pub wait_for_connection_timeout: Duration,

    /// Poll interval while waiting for a puppet connection
    pub connection_poll_interval: Duration,
}

impl Default for PuppeteerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            wait_for_connection_timeout: Duration::from_millis(60_000),
            connection_poll_interval: Duration::from_millis(500),
        }
    }
}

impl PuppeteerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn wait_for_connection_timeout(mut self, timeout: Duration) -> Self {
        self.wait_for_connection_timeout = timeout;
        self
    }

    pub fn connection_poll_interval(mut self, interval: Duration) -> Self {
        self.connection_poll_interval = interval;
        self
    }

    /// `host:port` string for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Reconnecting channel options
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Interval of the liveness check that redials a dropped connection
    pub reconnect_interval: Duration,

    /// Longest a websocket handshake may take before the dial is abandoned
    pub connect_timeout: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_millis(1000),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ChannelOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// In-page agent (puppet) options
#[derive(Debug, Clone)]
pub struct PuppetConfig {
    /// Controller websocket URL, without the `puppet-id` parameter
    pub server_url: String,

    /// Identity presented in the handshake
    pub puppet_id: u64,

    pub channel: ChannelOptions,
}

impl Default for PuppetConfig {
    fn default() -> Self {
        Self {
            server_url: format!("ws://localhost:{}", DEFAULT_PORT),
            puppet_id: random_puppet_id(),
            channel: ChannelOptions::default(),
        }
    }
}

impl PuppetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    pub fn puppet_id(mut self, id: u64) -> Self {
        self.puppet_id = id;
        self
    }

    pub fn channel(mut self, channel: ChannelOptions) -> Self {
        self.channel = channel;
        self
    }

    /// Full handshake URL: the server URL with `puppet-id` appended
    pub fn connect_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.server_url)?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(BrowserError::InvalidOptions(format!(
                "server URL must use ws or wss, got '{}'",
                url.scheme()
            )));
        }

        url.query_pairs_mut().append_pair("puppet-id", &self.puppet_id.to_string());
        Ok(url)
    }
}

/// Random puppet id in `[0, 10^13)`
pub fn random_puppet_id() -> u64 {
    rand::thread_rng().gen_range(0..MAX_PUPPET_ID)
}
