use super::config::PoolConfig;
use super::connector_pool::{ConnectorPool, PoolStatistics};
use crate::connector::{Configuration, ConnectorFactory, ConnectorKey};
use crate::error::Result;
use dashmap::DashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Pool identity: the connector plus the fingerprint of its configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub connector_key: ConnectorKey,
    pub fingerprint: String,
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.fingerprint.get(..12).unwrap_or(&self.fingerprint);
        write!(f, "{}#{}", self.connector_key, short)
    }
}

/// One pool per distinct (connector, configuration) pair.
pub struct ConnectorPoolManager {
    pools: DashMap<PoolKey, Arc<ConnectorPool>>,
    default_config: PoolConfig,
}

impl ConnectorPoolManager {
    pub fn new(default_config: PoolConfig) -> Self {
        Self {
            pools: DashMap::new(),
            default_config,
        }
    }

    pub fn default_config(&self) -> &PoolConfig {
        &self.default_config
    }

    /// Returns the pool for `configuration`, creating it on first use.
    ///
    /// `pool_config` only applies when the pool does not exist yet.
    pub fn pool_for(
        &self,
        key: &ConnectorKey,
        factory: &Arc<dyn ConnectorFactory>,
        configuration: &Configuration,
        pool_config: Option<&PoolConfig>,
    ) -> Result<Arc<ConnectorPool>> {
        let pool_key = PoolKey {
            connector_key: key.clone(),
            fingerprint: configuration.fingerprint()?,
        };

        if let Some(pool) = self.pools.get(&pool_key) {
            return Ok(pool.value().clone());
        }

        let config = pool_config.unwrap_or(&self.default_config).clone();
        config.validate()?;

        let pool = self
            .pools
            .entry(pool_key.clone())
            .or_insert_with(|| {
                debug!(
                    pool = %pool_key,
                    max_objects = config.max_objects,
                    "Creating connector pool"
                );
                Arc::new(ConnectorPool::new(
                    pool_key.to_string(),
                    factory.clone(),
                    configuration.clone(),
                    config,
                ))
            })
            .value()
            .clone();
        Ok(pool)
    }

    fn snapshot(&self) -> Vec<Arc<ConnectorPool>> {
        self.pools.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Evicts expired idle instances, then retires pools nobody holds that
    /// have been unused for their `min_evictable_idle`. A retired pool
    /// disposes its remaining instances, `min_idle` included.
    pub async fn evict_idle(&self) -> usize {
        let mut evicted = 0;
        for pool in self.snapshot() {
            evicted += pool.evict_idle().await;
        }
        evicted + self.retire_unused().await
    }

    async fn retire_unused(&self) -> usize {
        let keys: Vec<PoolKey> = self.pools.iter().map(|entry| entry.key().clone()).collect();
        let mut disposed = 0;
        for key in keys {
            // Only the map holds an unreferenced pool; facades and leases keep clones.
            let removed = self
                .pools
                .remove_if(&key, |_, pool| Arc::strong_count(pool) == 1 && pool.is_unused());
            if let Some((key, pool)) = removed {
                disposed += pool.shutdown().await;
                debug!(pool = %key, "Retired unused connector pool");
            }
        }
        disposed
    }

    /// Runs [`evict_idle`](Self::evict_idle) every `interval` until the manager is dropped.
    pub fn spawn_evictor(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let evicted = manager.evict_idle().await;
                if evicted > 0 {
                    debug!(evicted, "Idle connector eviction pass");
                }
            }
        })
    }

    /// Shuts down and forgets every pool.
    pub async fn dispose_all(&self) {
        let pools = self.snapshot();
        self.pools.clear();
        for pool in &pools {
            pool.shutdown().await;
        }
        if !pools.is_empty() {
            info!(pools = pools.len(), "Disposed all connector pools");
        }
    }

    pub fn statistics(&self) -> Vec<(PoolKey, PoolStatistics)> {
        self.pools
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().statistics()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ReleaseOutcome;
    use crate::test_utils::MockConnectorFactory;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_pool_per_configuration() {
        let manager = ConnectorPoolManager::new(PoolConfig::default());
        let key = ConnectorKey::new("mock", "1.0", "MockConnector");
        let factory: Arc<dyn ConnectorFactory> = Arc::new(MockConnectorFactory::new());

        let a = Configuration::new().with("host", "a");
        let same = Configuration::new().with("host", "a");
        let b = Configuration::new().with("host", "b");

        let pool_a = manager.pool_for(&key, &factory, &a, None).unwrap();
        let pool_same = manager.pool_for(&key, &factory, &same, None).unwrap();
        let pool_b = manager.pool_for(&key, &factory, &b, None).unwrap();

        assert!(Arc::ptr_eq(&pool_a, &pool_same));
        assert!(!Arc::ptr_eq(&pool_a, &pool_b));
        assert_eq!(manager.len(), 2);
    }

    #[tokio::test]
    async fn test_dispose_all_disposes_idle_instances() {
        let manager = ConnectorPoolManager::new(PoolConfig::default());
        let key = ConnectorKey::new("mock", "1.0", "MockConnector");
        let mock = MockConnectorFactory::new().poolable();
        let counters = mock.counters();
        let factory: Arc<dyn ConnectorFactory> = Arc::new(mock);

        let pool = manager
            .pool_for(&key, &factory, &Configuration::new(), None)
            .unwrap();
        let lease = pool.checkout().await.unwrap();
        lease.release(ReleaseOutcome::Healthy).await;

        manager.dispose_all().await;
        assert!(manager.is_empty());
        assert_eq!(counters.disposes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_eviction_retires_unreferenced_pools() {
        let manager = ConnectorPoolManager::new(PoolConfig {
            min_evictable_idle: Duration::ZERO,
            ..PoolConfig::default()
        });
        let key = ConnectorKey::new("mock", "1.0", "MockConnector");
        let mock = MockConnectorFactory::new().poolable();
        let counters = mock.counters();
        let factory: Arc<dyn ConnectorFactory> = Arc::new(mock);

        for index in 0..50 {
            let configuration = Configuration::new().with("host", format!("h{index}"));
            let pool = manager.pool_for(&key, &factory, &configuration, None).unwrap();
            let lease = pool.checkout().await.unwrap();
            lease.release(ReleaseOutcome::Healthy).await;
        }
        let held = manager
            .pool_for(&key, &factory, &Configuration::new().with("host", "h0"), None)
            .unwrap();
        assert_eq!(manager.len(), 50);

        assert_eq!(manager.evict_idle().await, 49);
        assert_eq!(manager.len(), 1);
        assert_eq!(counters.disposes.load(Ordering::SeqCst), 49);
        assert_eq!(held.statistics().idle, 1);

        drop(held);
        assert_eq!(manager.evict_idle().await, 1);
        assert!(manager.is_empty());
        assert_eq!(counters.disposes.load(Ordering::SeqCst), 50);
    }

    #[tokio::test]
    async fn test_recently_used_pool_is_kept() {
        let manager = ConnectorPoolManager::new(PoolConfig::default());
        let key = ConnectorKey::new("mock", "1.0", "MockConnector");
        let factory: Arc<dyn ConnectorFactory> =
            Arc::new(MockConnectorFactory::new().poolable());

        let pool = manager
            .pool_for(&key, &factory, &Configuration::new(), None)
            .unwrap();
        let lease = pool.checkout().await.unwrap();
        lease.release(ReleaseOutcome::Healthy).await;
        drop(pool);

        assert_eq!(manager.evict_idle().await, 0);
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_invalid_pool_config() {
        let manager = ConnectorPoolManager::new(PoolConfig::default());
        let key = ConnectorKey::new("mock", "1.0", "MockConnector");
        let factory: Arc<dyn ConnectorFactory> = Arc::new(MockConnectorFactory::new());
        let invalid = PoolConfig {
            max_objects: 0,
            ..PoolConfig::default()
        };
        assert!(manager
            .pool_for(&key, &factory, &Configuration::new(), Some(&invalid))
            .is_err());
    }
}
