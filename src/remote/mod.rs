//! Client side of the connector server protocol.

pub mod client;
pub mod facade;
pub mod manager;

pub use client::{ClientSession, SessionPool};
pub use facade::RemoteConnectorFacade;
pub use manager::RemoteConnectorInfoManager;

use crate::protocol::DEFAULT_STREAM_WINDOW;
use crate::security::GuardedSecret;
use std::time::Duration;

/// Where a connector server lives and the shared secret it expects.
#[derive(Debug, Clone)]
pub struct RemoteFrameworkConnectionInfo {
    pub host: String,
    pub port: u16,
    pub key: GuardedSecret,
    pub connect_timeout: Duration,
    /// Results the server may send ahead of the consumer during a search.
    pub stream_window: u32,
    pub max_idle_sessions: usize,
}

impl RemoteFrameworkConnectionInfo {
    pub fn new(host: impl Into<String>, port: u16, key: GuardedSecret) -> Self {
        Self {
            host: host.into(),
            port,
            key,
            connect_timeout: Duration::from_secs(10),
            stream_window: DEFAULT_STREAM_WINDOW,
            max_idle_sessions: 4,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Results the server may send ahead of the client's credits, at least 1.
    ///
    /// Only a window of 1 guarantees that nothing past the result a handler
    /// declines is produced. With a larger window the server can emit up to
    /// `window - 1` further results before it sees the cancel; the client
    /// discards them.
    pub fn with_stream_window(mut self, window: u32) -> Self {
        self.stream_window = window.max(1);
        self
    }

    pub fn with_max_idle_sessions(mut self, sessions: usize) -> Self {
        self.max_idle_sessions = sessions;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
