//! Connector server: exposes a local connector info manager over TCP.

pub mod http;
pub mod metrics;
pub mod session;

pub use http::MetricsEndpoint;
pub use metrics::ServerMetrics;
pub use session::SessionState;

use crate::bundle::LocalConnectorInfoManager;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::security::SecretHash;
use chrono::Utc;
use session::{Session, SessionContext};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub struct ConnectorServer {
    listener: TcpListener,
    context: Arc<SessionContext>,
    max_connections: usize,
    metrics_endpoint: Option<MetricsEndpoint>,
}

impl ConnectorServer {
    /// Binds the listener immediately so [`local_addr`](Self::local_addr) is
    /// known before serving; port 0 picks a free port.
    /// The metrics endpoint, when `metrics_address` is set, starts here too.
    pub async fn bind(
        config: &ServerConfig,
        manager: Arc<LocalConnectorInfoManager>,
    ) -> Result<Self> {
        let key_hash: SecretHash = config.key_hash.parse()?;

        let listener = TcpListener::bind(config.address()).await?;
        let context = Arc::new(SessionContext {
            manager,
            key_hash,
            handshake_timeout: config.handshake_timeout(),
            started_at: Utc::now(),
            metrics: Arc::new(ServerMetrics::new()?),
        });

        let metrics_endpoint = match &config.metrics_address {
            Some(address) => Some(MetricsEndpoint::start(
                address,
                context.metrics.clone(),
                context.manager.pools().clone(),
            )?),
            None => None,
        };

        Ok(Self {
            listener,
            context,
            max_connections: config.max_connections.max(1),
            metrics_endpoint,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn metrics(&self) -> Arc<ServerMetrics> {
        self.context.metrics.clone()
    }

    pub fn manager(&self) -> &Arc<LocalConnectorInfoManager> {
        &self.context.manager
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_endpoint.as_ref().map(MetricsEndpoint::local_addr)
    }

    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` completes, then closes open sessions and
    /// disposes every pooled connector.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        info!(%addr, max_connections = self.max_connections, "Connector server listening");

        let limiter = Arc::new(Semaphore::new(self.max_connections));
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!(error = %e, "Error accepting connection");
                            continue;
                        }
                    };

                    let Ok(permit) = limiter.clone().try_acquire_owned() else {
                        warn!(%peer, "Connection limit reached, closing connection");
                        self.context.metrics.connections_rejected.inc();
                        drop(stream);
                        continue;
                    };

                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
                    }

                    debug!(%peer, "Accepted connection");
                    let context = self.context.clone();
                    sessions.spawn(async move {
                        let _permit = permit;
                        context.metrics.connections_total.inc();
                        context.metrics.connections_active.inc();
                        if let Err(e) = Session::new(stream, peer, context.clone()).run().await {
                            warn!(%peer, error = %e, "Session ended with error");
                        }
                        context.metrics.connections_active.dec();
                    });
                }
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(error = %e, "Session task panicked");
                        }
                    }
                }
            }
        }

        let open = sessions.len();
        sessions.shutdown().await;
        if open > 0 {
            info!(sessions = open, "Closed open sessions");
        }
        self.context.manager.dispose().await;
        if let Some(endpoint) = self.metrics_endpoint.take() {
            endpoint.stop().await;
        }
        info!("Connector server stopped");
        Ok(())
    }
}
