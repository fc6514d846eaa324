use crate::bundle::{LocalConnectorInfoManager, ScanReport};
use crate::config::ServerSettings;
use crate::connectors::{builtin_bundle, builtin_registry};
use crate::error::Result;
use crate::security;
use crate::server::ConnectorServer;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Scans the built-in connectors plus every configured bundle path.
pub fn build_manager(settings: &ServerSettings) -> Result<(LocalConnectorInfoManager, ScanReport)> {
    LocalConnectorInfoManager::builder(builtin_registry())
        .bundle(builtin_bundle())
        .bundle_paths(settings.bundles.paths.iter().cloned())
        .pool_config(settings.pool.to_pool_config())
        .operation_timeout(settings.operation_timeout())
        .scan()
}

pub async fn run_server(settings: ServerSettings) -> Result<()> {
    security::select_encryptor_factory(&settings.security.encryptor)?;
    security::encryptor_factory()?;

    let (manager, report) = build_manager(&settings)?;
    for excluded in &report.excluded {
        error!(bundle = %excluded.source, reason = %excluded.reason, "Bundle excluded");
    }
    info!(
        bundles = report.loaded.len(),
        connectors = report.connectors,
        "Connector bundles loaded"
    );

    let manager = Arc::new(manager);
    let evictor = manager.spawn_evictor(settings.pool.eviction_interval());
    let server = ConnectorServer::bind(&settings.server, manager).await?;

    let result = server
        .run_until(async {
            if let Err(e) = signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Received shutdown signal");
        })
        .await;
    evictor.abort();
    result
}
