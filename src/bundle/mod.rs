//! Bundle discovery and the local connector info manager.

pub mod manager;
pub mod manifest;
pub mod registry;

pub use manager::{
    ExcludedBundle, LocalConnectorInfoManager, LocalConnectorInfoManagerBuilder, ScanReport,
};
pub use manifest::{BundleManifest, ConnectorDeclaration};
pub use registry::ConnectorFactoryRegistry;
