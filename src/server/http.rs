//! `GET /metrics` in the prometheus text exposition format.

use super::metrics::ServerMetrics;
use crate::error::{ConfigError, Result, TransportError};
use crate::pool::ConnectorPoolManager;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

#[derive(Clone)]
struct MetricsSource {
    metrics: Arc<ServerMetrics>,
    pools: Arc<ConnectorPoolManager>,
}

fn routes(source: MetricsSource) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("metrics")
        .and(warp::get())
        .and(with_source(source))
        .and_then(get_metrics)
}

fn with_source(
    source: MetricsSource,
) -> impl Filter<Extract = (MetricsSource,), Error = Infallible> + Clone {
    warp::any().map(move || source.clone())
}

async fn get_metrics(source: MetricsSource) -> std::result::Result<impl Reply, Rejection> {
    let (body, status) = match source.metrics.render_with_pools(&source.pools) {
        Ok(text) => (text, StatusCode::OK),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            (String::new(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    };
    Ok(warp::reply::with_status(
        warp::reply::with_header(body, "content-type", CONTENT_TYPE),
        status,
    ))
}

/// A running metrics listener, stopped gracefully by [`stop`](Self::stop) or on drop.
pub struct MetricsEndpoint {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl MetricsEndpoint {
    pub fn start(
        address: &str,
        metrics: Arc<ServerMetrics>,
        pools: Arc<ConnectorPoolManager>,
    ) -> Result<Self> {
        let addr: SocketAddr = address.parse().map_err(|e| {
            ConfigError::Validation(format!("invalid metrics address {address}: {e}"))
        })?;
        let (stop, stopped) = oneshot::channel::<()>();

        let (addr, server) = warp::serve(routes(MetricsSource { metrics, pools }))
            .try_bind_with_graceful_shutdown(addr, async move {
                let _ = stopped.await;
            })
            .map_err(|e| {
                TransportError::ConnectionFailed(format!("failed to bind metrics on {addr}: {e}"))
            })?;

        info!(%addr, "Serving metrics");
        Ok(Self {
            addr,
            stop,
            task: tokio::spawn(server),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            error!(error = %e, "Metrics endpoint task failed");
        }
    }
}
