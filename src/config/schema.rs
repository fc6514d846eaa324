use crate::pool::PoolConfig;
use crate::security::DEFAULT_ENCRYPTOR;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bundles: BundlesConfig,
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub operation_timeout_ms: Option<u64>,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerSettings {
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// `SecretHash` text of the shared secret clients must present.
    #[serde(default)]
    pub key_hash: String,
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Serves `GET /metrics` on this address when set.
    #[serde(default)]
    pub metrics_address: Option<String>,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            key_hash: String::new(),
            handshake_timeout_ms: default_handshake_timeout(),
            max_connections: default_max_connections(),
            metrics_address: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlesConfig {
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSettings {
    #[serde(default = "default_max_objects")]
    pub max_objects: usize,
    #[serde(default = "default_max_idle")]
    pub max_idle: usize,
    #[serde(default = "default_min_idle")]
    pub min_idle: usize,
    #[serde(default = "default_max_wait")]
    pub max_wait_ms: u64,
    #[serde(default = "default_min_evictable_idle")]
    pub min_evictable_idle_ms: u64,
    #[serde(default = "default_eviction_interval")]
    pub eviction_interval_ms: u64,
}

impl PoolSettings {
    pub fn to_pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_objects: self.max_objects,
            max_idle: self.max_idle,
            min_idle: self.min_idle,
            max_wait: Duration::from_millis(self.max_wait_ms),
            min_evictable_idle: Duration::from_millis(self.min_evictable_idle_ms),
        }
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_millis(self.eviction_interval_ms)
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_objects: default_max_objects(),
            max_idle: default_max_idle(),
            min_idle: default_min_idle(),
            max_wait_ms: default_max_wait(),
            min_evictable_idle_ms: default_min_evictable_idle(),
            eviction_interval_ms: default_eviction_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    #[serde(default = "default_encryptor")]
    pub encryptor: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            encryptor: default_encryptor(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8759
}

fn default_handshake_timeout() -> u64 {
    10_000
}

fn default_max_connections() -> usize {
    256
}

fn default_max_objects() -> usize {
    10
}

fn default_max_idle() -> usize {
    10
}

fn default_min_idle() -> usize {
    1
}

fn default_max_wait() -> u64 {
    150_000
}

fn default_min_evictable_idle() -> u64 {
    120_000
}

fn default_eviction_interval() -> u64 {
    60_000
}

fn default_encryptor() -> String {
    DEFAULT_ENCRYPTOR.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
