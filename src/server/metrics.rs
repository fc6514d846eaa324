use crate::error::{FrameworkError, PoolError, Result};
use crate::pool::ConnectorPoolManager;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::time::Duration;

pub struct ServerMetrics {
    registry: Registry,

    // Connection metrics
    pub connections_total: IntCounter,
    pub connections_active: IntGauge,
    pub connections_rejected: IntCounter,
    pub auth_failures: IntCounter,

    // Operation metrics
    pub operations_total: IntCounterVec,
    pub operations_failed: IntCounterVec,
    pub operation_duration: HistogramVec,

    // Pool metrics
    pub pool_exhaustions: IntCounter,
    pub pool_active: IntGauge,
    pub pool_idle: IntGauge,
    pub handshake_duration: Histogram,
}

impl ServerMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let connections_total = IntCounter::new(
            "connector_server_connections_total",
            "Total number of accepted connections",
        )?;
        let connections_active = IntGauge::new(
            "connector_server_connections_active",
            "Number of open client connections",
        )?;
        let connections_rejected = IntCounter::new(
            "connector_server_connections_rejected_total",
            "Connections refused because the connection limit was reached",
        )?;
        let auth_failures = IntCounter::new(
            "connector_server_auth_failures_total",
            "Total number of failed handshakes",
        )?;

        let operations_total = IntCounterVec::new(
            Opts::new(
                "connector_server_operations_total",
                "Total number of invoked operations",
            ),
            &["operation"],
        )?;
        let operations_failed = IntCounterVec::new(
            Opts::new(
                "connector_server_operations_failed_total",
                "Total number of operations that returned an error",
            ),
            &["operation"],
        )?;
        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "connector_server_operation_duration_seconds",
                "Operation duration in seconds",
            ),
            &["operation"],
        )?;

        let pool_exhaustions = IntCounter::new(
            "connector_server_pool_exhaustions_total",
            "Checkouts that failed because a pool was exhausted",
        )?;
        let pool_active = IntGauge::new(
            "connector_server_pool_active",
            "Connector instances currently checked out",
        )?;
        let pool_idle = IntGauge::new(
            "connector_server_pool_idle",
            "Connector instances idle in pools",
        )?;
        let handshake_duration = Histogram::with_opts(HistogramOpts::new(
            "connector_server_handshake_duration_seconds",
            "Time from accept to handshake completion",
        ))?;

        registry.register(Box::new(connections_total.clone()))?;
        registry.register(Box::new(connections_active.clone()))?;
        registry.register(Box::new(connections_rejected.clone()))?;
        registry.register(Box::new(auth_failures.clone()))?;
        registry.register(Box::new(operations_total.clone()))?;
        registry.register(Box::new(operations_failed.clone()))?;
        registry.register(Box::new(operation_duration.clone()))?;
        registry.register(Box::new(pool_exhaustions.clone()))?;
        registry.register(Box::new(pool_active.clone()))?;
        registry.register(Box::new(pool_idle.clone()))?;
        registry.register(Box::new(handshake_duration.clone()))?;

        Ok(Self {
            registry,
            connections_total,
            connections_active,
            connections_rejected,
            auth_failures,
            operations_total,
            operations_failed,
            operation_duration,
            pool_exhaustions,
            pool_active,
            pool_idle,
            handshake_duration,
        })
    }

    pub fn record_operation(
        &self,
        operation: &str,
        elapsed: Duration,
        error: Option<&FrameworkError>,
    ) {
        self.operations_total.with_label_values(&[operation]).inc();
        self.operation_duration
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());

        if let Some(error) = error {
            self.operations_failed.with_label_values(&[operation]).inc();
            if matches!(error, FrameworkError::Pool(PoolError::Exhausted { .. })) {
                self.pool_exhaustions.inc();
            }
        }
    }

    pub fn observe_pools(&self, pools: &ConnectorPoolManager) {
        let (active, idle) = pools
            .statistics()
            .iter()
            .fold((0, 0), |(active, idle), (_, stats)| {
                (active + stats.active, idle + stats.idle)
            });
        self.pool_active.set(active as i64);
        self.pool_idle.set(idle as i64);
    }

    /// [`render`](Self::render) with pool gauges refreshed first.
    pub fn render_with_pools(&self, pools: &ConnectorPoolManager) -> Result<String> {
        self.observe_pools(pools);
        self.render()
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| FrameworkError::Metrics(prometheus::Error::Msg(e.to_string())))
    }
}
