//! Connectors compiled into the host.

pub mod memory;

pub use memory::{MemoryConnector, MemoryConnectorFactory, MEMORY_CONNECTOR_CLASS};

use crate::bundle::{BundleManifest, ConnectorDeclaration, ConnectorFactoryRegistry};
use std::sync::Arc;

pub const BUILTIN_BUNDLE_NAME: &str = "connector-host-builtin";

/// Registry holding every built-in connector class.
pub fn builtin_registry() -> ConnectorFactoryRegistry {
    ConnectorFactoryRegistry::new().with(
        MEMORY_CONNECTOR_CLASS,
        Arc::new(MemoryConnectorFactory::new()),
    )
}

/// Bundle declaring the built-in connectors, versioned with the host.
pub fn builtin_bundle() -> BundleManifest {
    BundleManifest::new(BUILTIN_BUNDLE_NAME, env!("CARGO_PKG_VERSION")).with_connector(
        ConnectorDeclaration::new(MEMORY_CONNECTOR_CLASS)
            .with_display_name("In-memory connector")
            .with_category("testing"),
    )
}
