use super::config::PoolConfig;
use crate::connector::{Configuration, Connector, ConnectorFactory, PoolableConnector};
use crate::error::{PoolError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatistics {
    pub active: usize,
    pub idle: usize,
    pub created: u64,
    pub disposed: u64,
}

/// How a lease ended, decided by the caller from the operation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The connector may be reused if it passes its liveness check.
    Healthy,
    /// The connector saw a connectivity failure and must be disposed.
    Broken,
}

struct IdleConnector {
    connector: Box<dyn Connector>,
    idle_since: Instant,
}

struct PoolState {
    idle: VecDeque<IdleConnector>,
    active: usize,
    created: u64,
    disposed: u64,
    last_used: Instant,
    shut_down: bool,
}

impl Default for PoolState {
    fn default() -> Self {
        Self {
            idle: VecDeque::new(),
            active: 0,
            created: 0,
            disposed: 0,
            last_used: Instant::now(),
            shut_down: false,
        }
    }
}

/// Initialised connector instances for one configuration.
///
/// Bookkeeping happens under a short synchronous lock; connector calls
/// (`init`, `check_alive`, `dispose`) and operations run outside it. A
/// semaphore of `max_objects` permits bounds checked-out instances, poolable
/// or not.
pub struct ConnectorPool {
    name: String,
    factory: Arc<dyn ConnectorFactory>,
    configuration: Configuration,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    state: Mutex<PoolState>,
}

impl ConnectorPool {
    pub fn new(
        name: impl Into<String>,
        factory: Arc<dyn ConnectorFactory>,
        configuration: Configuration,
        config: PoolConfig,
    ) -> Self {
        Self {
            name: name.into(),
            factory,
            configuration,
            permits: Arc::new(Semaphore::new(config.max_objects)),
            config,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Hands out an initialised instance, waiting up to `max_wait` for capacity.
    pub async fn checkout(self: &Arc<Self>) -> Result<PooledConnector> {
        let started = Instant::now();
        let permit = match timeout(self.config.max_wait, self.permits.clone().acquire_owned()).await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(self.shut_down_error()),
            Err(_) => {
                let waited_ms = duration_ms(started.elapsed());
                warn!(pool = %self.name, waited_ms, "Connector pool exhausted");
                return Err(PoolError::Exhausted {
                    pool: self.name.clone(),
                    waited_ms,
                }
                .into());
            }
        };

        let mut slot = ActiveSlot::claim(self)?;
        let connector = self.acquire_instance().await?;
        slot.keep();

        Ok(PooledConnector {
            connector,
            permit: Some(permit),
            pool: Arc::clone(self),
            released: false,
        })
    }

    /// Reuses the newest idle instance that passes `check_alive`, disposing
    /// those that fail, and initialises a new one when none is left.
    async fn acquire_instance(self: &Arc<Self>) -> Result<Box<dyn Connector>> {
        loop {
            let idle = self.state().idle.pop_back();
            let Some(idle) = idle else {
                break;
            };
            let pending = PendingConnector::initialised(self, idle.connector);
            let alive = match pending.connector().as_poolable() {
                Some(poolable) => self.check_alive(poolable).await,
                None => true,
            };
            let connector = pending.into_inner();
            if alive {
                debug!(pool = %self.name, "Reusing idle connector");
                return Ok(connector);
            }
            self.dispose_instance(connector).await;
        }
        self.create_instance().await
    }

    async fn create_instance(self: &Arc<Self>) -> Result<Box<dyn Connector>> {
        let mut pending = PendingConnector::fresh(self, self.factory.create());
        if let Err(e) = pending.connector_mut().init(self.configuration.clone()).await {
            warn!(pool = %self.name, error = %e, "Connector initialisation failed");
            pending.forget();
            return Err(e.into());
        }
        self.state().created += 1;
        debug!(pool = %self.name, "Initialised new connector instance");
        Ok(pending.into_inner())
    }

    async fn give_back(
        &self,
        connector: Box<dyn Connector>,
        permit: Option<OwnedSemaphorePermit>,
        outcome: ReleaseOutcome,
    ) {
        let alive = match (outcome, connector.as_poolable()) {
            (ReleaseOutcome::Healthy, Some(poolable)) => self.check_alive(poolable).await,
            _ => false,
        };

        let rejected = {
            let mut state = self.state();
            state.active = state.active.saturating_sub(1);
            state.last_used = Instant::now();
            if alive && !state.shut_down && state.idle.len() < self.config.max_idle {
                state.idle.push_back(IdleConnector {
                    connector,
                    idle_since: Instant::now(),
                });
                None
            } else {
                Some(connector)
            }
        };

        if let Some(connector) = rejected {
            self.dispose_instance(connector).await;
        }
        drop(permit);
    }

    async fn check_alive(&self, poolable: &dyn PoolableConnector) -> bool {
        match poolable.check_alive().await {
            Ok(()) => true,
            Err(e) => {
                warn!(pool = %self.name, error = %e, "Connector failed liveness check");
                false
            }
        }
    }

    async fn dispose_instance(&self, mut connector: Box<dyn Connector>) {
        connector.dispose().await;
        self.state().disposed += 1;
        debug!(pool = %self.name, "Disposed connector instance");
    }

    /// Disposes idle instances older than `min_evictable_idle`, keeping `min_idle`.
    pub async fn evict_idle(&self) -> usize {
        let evicted: Vec<IdleConnector> = {
            let mut state = self.state();
            let mut evicted = Vec::new();
            while state.idle.len() > self.config.min_idle {
                let expired = state.idle.front().map_or(false, |oldest| {
                    oldest.idle_since.elapsed() >= self.config.min_evictable_idle
                });
                if !expired {
                    break;
                }
                if let Some(oldest) = state.idle.pop_front() {
                    evicted.push(oldest);
                }
            }
            evicted
        };

        let count = evicted.len();
        for idle in evicted {
            self.dispose_instance(idle.connector).await;
        }
        if count > 0 {
            debug!(pool = %self.name, evicted = count, "Evicted idle connectors");
        }
        count
    }

    /// Refuses further checkouts and disposes every idle instance, returning
    /// how many were disposed. Instances still checked out are disposed when
    /// returned.
    pub async fn shutdown(&self) -> usize {
        let idle: Vec<IdleConnector> = {
            let mut state = self.state();
            state.shut_down = true;
            state.idle.drain(..).collect()
        };
        self.permits.close();
        let count = idle.len();
        for entry in idle {
            self.dispose_instance(entry.connector).await;
        }
        count
    }

    /// True when nothing is checked out and the pool has not been used for
    /// `min_evictable_idle`.
    pub fn is_unused(&self) -> bool {
        let state = self.state();
        state.active == 0 && state.last_used.elapsed() >= self.config.min_evictable_idle
    }

    pub fn statistics(&self) -> PoolStatistics {
        let state = self.state();
        PoolStatistics {
            active: state.active,
            idle: state.idle.len(),
            created: state.created,
            disposed: state.disposed,
        }
    }

    fn shut_down_error(&self) -> crate::error::FrameworkError {
        PoolError::ShutDown {
            pool: self.name.clone(),
        }
        .into()
    }
}

/// Exclusive lease on a pooled connector instance.
///
/// Return it with [`PooledConnector::release`]. A lease dropped without being
/// released (for example when the operation future is cancelled) is disposed
/// in the background, never reused.
pub struct PooledConnector {
    connector: Box<dyn Connector>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<ConnectorPool>,
    released: bool,
}

impl PooledConnector {
    pub async fn release(mut self, outcome: ReleaseOutcome) {
        self.released = true;
        let connector = std::mem::replace(&mut self.connector, Box::new(Vacant));
        let permit = self.permit.take();
        let pool = Arc::clone(&self.pool);
        pool.give_back(connector, permit, outcome).await;
    }
}

impl std::ops::Deref for PooledConnector {
    type Target = dyn Connector;

    fn deref(&self) -> &Self::Target {
        self.connector.as_ref()
    }
}

impl Drop for PooledConnector {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let connector = std::mem::replace(&mut self.connector, Box::new(Vacant));
        let permit = self.permit.take();
        let pool = Arc::clone(&self.pool);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    pool.give_back(connector, permit, ReleaseOutcome::Broken).await;
                });
            }
            Err(_) => {
                let mut state = pool.state();
                state.active = state.active.saturating_sub(1);
            }
        }
    }
}

/// Counts a checkout as active until the lease exists.
struct ActiveSlot<'a> {
    pool: &'a ConnectorPool,
    held: bool,
}

impl<'a> ActiveSlot<'a> {
    fn claim(pool: &'a ConnectorPool) -> Result<Self> {
        let mut state = pool.state();
        if state.shut_down {
            return Err(pool.shut_down_error());
        }
        state.active += 1;
        state.last_used = Instant::now();
        Ok(Self { pool, held: true })
    }

    fn keep(&mut self) {
        self.held = false;
    }
}

impl Drop for ActiveSlot<'_> {
    fn drop(&mut self) {
        if self.held {
            let mut state = self.pool.state();
            state.active = state.active.saturating_sub(1);
        }
    }
}

/// A connector owned by an in-flight checkout. If the checkout is dropped
/// before the lease is built, the connector is disposed in the background.
struct PendingConnector {
    connector: Box<dyn Connector>,
    pool: Arc<ConnectorPool>,
    initialised: bool,
    held: bool,
}

impl PendingConnector {
    fn fresh(pool: &Arc<ConnectorPool>, connector: Box<dyn Connector>) -> Self {
        Self {
            connector,
            pool: Arc::clone(pool),
            initialised: false,
            held: true,
        }
    }

    fn initialised(pool: &Arc<ConnectorPool>, connector: Box<dyn Connector>) -> Self {
        Self {
            connector,
            pool: Arc::clone(pool),
            initialised: true,
            held: true,
        }
    }

    fn connector(&self) -> &dyn Connector {
        self.connector.as_ref()
    }

    fn connector_mut(&mut self) -> &mut dyn Connector {
        self.connector.as_mut()
    }

    /// Drops the connector without disposing it.
    fn forget(&mut self) {
        self.held = false;
    }

    fn into_inner(mut self) -> Box<dyn Connector> {
        self.held = false;
        std::mem::replace(&mut self.connector, Box::new(Vacant))
    }
}

impl Drop for PendingConnector {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        let mut connector = std::mem::replace(&mut self.connector, Box::new(Vacant));
        let pool = Arc::clone(&self.pool);
        let initialised = self.initialised;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                debug!(pool = %pool.name, "Disposing connector from cancelled checkout");
                if initialised {
                    pool.dispose_instance(connector).await;
                } else {
                    connector.dispose().await;
                }
            });
        }
    }
}

/// Placeholder left in a lease after its connector was handed back.
struct Vacant;

#[async_trait]
impl Connector for Vacant {
    async fn init(&mut self, _configuration: Configuration) -> crate::error::ConnectorResult<()> {
        Ok(())
    }

    async fn dispose(&mut self) {}

    fn configuration(&self) -> Option<&Configuration> {
        None
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}
