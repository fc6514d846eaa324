use super::serve::build_manager;
use crate::config::{self, ServerSettings};
use crate::error::{ConfigError, Result};
use crate::security;
use tracing::{error, info};

pub fn run_config_check(settings: ServerSettings) -> Result<()> {
    info!("Checking configuration...");

    config::validate(&settings)?;
    info!("✓ Configuration is valid");
    info!("  Listen address: {}", settings.server.address());
    info!("  Max connections: {}", settings.server.max_connections);
    if let Some(address) = &settings.server.metrics_address {
        info!("  Metrics: http://{}/metrics", address);
    }
    info!(
        "  Pool: maxObjects={} maxIdle={} minIdle={} maxWaitMs={}",
        settings.pool.max_objects,
        settings.pool.max_idle,
        settings.pool.min_idle,
        settings.pool.max_wait_ms
    );

    security::select_encryptor_factory(&settings.security.encryptor)?;
    match security::encryptor_factory() {
        Ok(_) => info!("✓ Encryptor '{}' is available", settings.security.encryptor),
        Err(e) => {
            error!("✗ Encryptor '{}' failed: {}", settings.security.encryptor, e);
            return Err(e.into());
        }
    }

    info!("Scanning {} bundle path(s)...", settings.bundles.paths.len());
    let (manager, report) = build_manager(&settings)?;

    for bundle in &report.loaded {
        info!("  ✓ {}", bundle);
    }
    for excluded in &report.excluded {
        error!("  ✗ {}: {}", excluded.source, excluded.reason);
    }
    for connector in manager.connector_infos() {
        info!("  Connector: {} ({})", connector.key(), connector.display_name());
    }

    if report.excluded.is_empty() {
        info!("\n✓ All checks passed ({} connectors)", report.connectors);
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{} bundle(s) were excluded",
            report.excluded.len()
        ))
        .into())
    }
}
