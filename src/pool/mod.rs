pub mod config;
pub mod connector_pool;
pub mod manager;

pub use config::PoolConfig;
pub use connector_pool::{ConnectorPool, PoolStatistics, PooledConnector, ReleaseOutcome};
pub use manager::{ConnectorPoolManager, PoolKey};
