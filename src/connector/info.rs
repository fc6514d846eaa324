use super::configuration::ConfigurationSchema;
use super::key::ConnectorKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Create,
    Update,
    Delete,
    Search,
    Authenticate,
    Schema,
    Test,
    ScriptOnConnector,
    Pooling,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Create => "create",
            Capability::Update => "update",
            Capability::Delete => "delete",
            Capability::Search => "search",
            Capability::Authenticate => "authenticate",
            Capability::Schema => "schema",
            Capability::Test => "test",
            Capability::ScriptOnConnector => "script_on_connector",
            Capability::Pooling => "pooling",
        };
        f.write_str(name)
    }
}

/// Discovered metadata of one connector. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorInfo {
    key: ConnectorKey,
    display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    schema: ConfigurationSchema,
    capabilities: BTreeSet<Capability>,
}

impl ConnectorInfo {
    pub fn new(
        key: ConnectorKey,
        display_name: impl Into<String>,
        category: Option<String>,
        schema: ConfigurationSchema,
        capabilities: BTreeSet<Capability>,
    ) -> Self {
        Self {
            key,
            display_name: display_name.into(),
            category,
            schema,
            capabilities,
        }
    }

    pub fn key(&self) -> &ConnectorKey {
        &self.key
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn configuration_schema(&self) -> &ConfigurationSchema {
        &self.schema
    }

    pub fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}
