use super::manifest::BundleManifest;
use super::registry::ConnectorFactoryRegistry;
use crate::connector::{Configuration, ConnectorFactory, ConnectorInfo, ConnectorKey};
use crate::error::{ConfigError, FrameworkError, Result};
use crate::facade::{ConnectorFacade, LocalConnectorFacade};
use crate::pool::{ConnectorPoolManager, PoolConfig};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A bundle left out of discovery and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExcludedBundle {
    pub source: String,
    pub reason: String,
}

/// Outcome of a bundle scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub loaded: Vec<String>,
    pub excluded: Vec<ExcludedBundle>,
    pub connectors: usize,
}

struct LocalEntry {
    info: ConnectorInfo,
    factory: Arc<dyn ConnectorFactory>,
}

pub struct LocalConnectorInfoManagerBuilder {
    registry: ConnectorFactoryRegistry,
    search_paths: Vec<PathBuf>,
    manifests: Vec<BundleManifest>,
    pool_config: PoolConfig,
    operation_timeout: Option<Duration>,
}

impl LocalConnectorInfoManagerBuilder {
    pub fn bundle_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn bundle_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.search_paths.extend(paths);
        self
    }

    /// Adds a bundle without a manifest file.
    pub fn bundle(mut self, manifest: BundleManifest) -> Self {
        self.manifests.push(manifest);
        self
    }

    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    pub fn operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Reads every manifest and builds the manager.
    ///
    /// Malformed bundles and bundles naming unregistered classes are excluded
    /// and listed in the report. A missing search path or a connector key
    /// declared twice fails the whole scan.
    pub fn scan(self) -> Result<(LocalConnectorInfoManager, ScanReport)> {
        self.pool_config.validate()?;

        let mut report = ScanReport::default();
        let mut candidates: Vec<(String, BundleManifest)> = Vec::new();

        for path in &self.search_paths {
            for manifest_path in manifest_files(path)? {
                let source = manifest_path.display().to_string();
                match BundleManifest::load(&manifest_path) {
                    Ok(manifest) => candidates.push((source, manifest)),
                    Err(e) => {
                        warn!(bundle = %source, error = %e, "Excluding malformed bundle");
                        report.excluded.push(ExcludedBundle {
                            source,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
        for manifest in self.manifests {
            let source = format!("{}:{}", manifest.name, manifest.version);
            match manifest.validate() {
                Ok(()) => candidates.push((source, manifest)),
                Err(e) => report.excluded.push(ExcludedBundle {
                    source,
                    reason: e.to_string(),
                }),
            }
        }

        let mut entries: BTreeMap<ConnectorKey, LocalEntry> = BTreeMap::new();
        for (source, manifest) in candidates {
            let resolved = match resolve_bundle(&manifest, &self.registry) {
                Ok(resolved) => resolved,
                Err(reason) => {
                    warn!(bundle = %source, reason = %reason, "Excluding bundle");
                    report.excluded.push(ExcludedBundle { source, reason });
                    continue;
                }
            };

            for entry in resolved {
                let key = entry.info.key().clone();
                if entries.contains_key(&key) {
                    return Err(ConfigError::DuplicateConnectorKey(key).into());
                }
                debug!(connector = %key, "Discovered connector");
                entries.insert(key, entry);
            }
            report.loaded.push(format!("{}:{}", manifest.name, manifest.version));
        }
        report.connectors = entries.len();

        info!(
            bundles = report.loaded.len(),
            excluded = report.excluded.len(),
            connectors = report.connectors,
            "Bundle scan complete"
        );

        let manager = LocalConnectorInfoManager {
            entries,
            pools: Arc::new(ConnectorPoolManager::new(self.pool_config)),
            operation_timeout: self.operation_timeout,
        };
        Ok((manager, report))
    }
}

fn manifest_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(ConfigError::Validation(format!(
            "bundle path does not exist: {}",
            path.display()
        ))
        .into());
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let entries = std::fs::read_dir(path).map_err(|e| {
        ConfigError::Validation(format!("failed to read bundle path {}: {e}", path.display()))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            ConfigError::Validation(format!("failed to read directory entry: {e}"))
        })?;
        let file = entry.path();
        if file.is_file() && BundleManifest::is_manifest_file(&file) {
            files.push(file);
        }
    }
    files.sort();
    Ok(files)
}

fn resolve_bundle(
    manifest: &BundleManifest,
    registry: &ConnectorFactoryRegistry,
) -> std::result::Result<Vec<LocalEntry>, String> {
    manifest
        .connectors
        .iter()
        .map(|declaration| {
            let factory = registry
                .get(&declaration.class)
                .ok_or_else(|| format!("unknown connector class '{}'", declaration.class))?;
            let key = ConnectorKey::new(&manifest.name, &manifest.version, &declaration.class);
            let info = ConnectorInfo::new(
                key,
                declaration
                    .display_name
                    .clone()
                    .unwrap_or_else(|| declaration.class.clone()),
                declaration.category.clone(),
                factory.configuration_schema(),
                factory.capabilities(),
            );
            Ok(LocalEntry { info, factory })
        })
        .collect()
}

/// Connector infos discovered from local bundles, with in-process facades.
pub struct LocalConnectorInfoManager {
    entries: BTreeMap<ConnectorKey, LocalEntry>,
    pools: Arc<ConnectorPoolManager>,
    operation_timeout: Option<Duration>,
}

impl LocalConnectorInfoManager {
    pub fn builder(registry: ConnectorFactoryRegistry) -> LocalConnectorInfoManagerBuilder {
        LocalConnectorInfoManagerBuilder {
            registry,
            search_paths: Vec::new(),
            manifests: Vec::new(),
            pool_config: PoolConfig::default(),
            operation_timeout: None,
        }
    }

    pub fn connector_infos(&self) -> Vec<ConnectorInfo> {
        self.entries.values().map(|e| e.info.clone()).collect()
    }

    pub fn find_connector_info(&self, key: &ConnectorKey) -> Option<&ConnectorInfo> {
        self.entries.get(key).map(|e| &e.info)
    }

    pub fn create_connector_facade(
        &self,
        key: &ConnectorKey,
        configuration: Configuration,
    ) -> Result<Arc<dyn ConnectorFacade>> {
        self.build_facade(key, configuration, None)
    }

    /// Like [`create_connector_facade`](Self::create_connector_facade) with
    /// explicit pool sizing, used when the pool for this configuration is new.
    pub fn create_connector_facade_with(
        &self,
        key: &ConnectorKey,
        configuration: Configuration,
        pool_config: PoolConfig,
    ) -> Result<Arc<dyn ConnectorFacade>> {
        self.build_facade(key, configuration, Some(&pool_config))
    }

    fn build_facade(
        &self,
        key: &ConnectorKey,
        configuration: Configuration,
        pool_config: Option<&PoolConfig>,
    ) -> Result<Arc<dyn ConnectorFacade>> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| FrameworkError::ConnectorNotFound(key.clone()))?;
        let configuration = entry.info.configuration_schema().apply(configuration)?;
        let pool = self
            .pools
            .pool_for(key, &entry.factory, &configuration, pool_config)?;

        Ok(Arc::new(LocalConnectorFacade::new(
            entry.info.clone(),
            entry.factory.clone(),
            pool,
            configuration,
            self.operation_timeout,
        )))
    }

    pub fn pools(&self) -> &Arc<ConnectorPoolManager> {
        &self.pools
    }

    pub fn spawn_evictor(&self, interval: Duration) -> JoinHandle<()> {
        self.pools.spawn_evictor(interval)
    }

    /// Disposes every pooled connector instance.
    pub async fn dispose(&self) {
        self.pools.dispose_all().await;
    }
}
