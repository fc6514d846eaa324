use crate::error::ConfigError;
use figment::{
    providers::{Format, Json, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MANIFEST_SUFFIXES: [&str; 4] =
    [".bundle.toml", ".bundle.json", ".bundle.yaml", ".bundle.yml"];

/// One connector class declared by a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorDeclaration {
    pub class: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl ConnectorDeclaration {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            display_name: None,
            category: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Bundle metadata: a named, versioned set of connector classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleManifest {
    pub name: String,
    pub version: String,
    pub connectors: Vec<ConnectorDeclaration>,
}

impl BundleManifest {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            connectors: Vec::new(),
        }
    }

    pub fn with_connector(mut self, declaration: ConnectorDeclaration) -> Self {
        self.connectors.push(declaration);
        self
    }

    /// Reads a manifest file, choosing the format from its extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let figment = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Figment::new().merge(Toml::file(path)),
            Some("json") => Figment::new().merge(Json::file(path)),
            Some("yaml") | Some("yml") => Figment::new().merge(Yaml::file(path)),
            _ => {
                return Err(ConfigError::MalformedBundle {
                    bundle: path.display().to_string(),
                    reason: "unsupported manifest format".to_string(),
                })
            }
        };

        let manifest: BundleManifest =
            figment
                .extract()
                .map_err(|e| ConfigError::MalformedBundle {
                    bundle: path.display().to_string(),
                    reason: e.to_string(),
                })?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let malformed = |reason: &str| ConfigError::MalformedBundle {
            bundle: format!("{}:{}", self.name, self.version),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(malformed("bundle name is empty"));
        }
        if self.version.trim().is_empty() {
            return Err(malformed("bundle version is empty"));
        }
        if self.connectors.is_empty() {
            return Err(malformed("bundle declares no connectors"));
        }
        if self.connectors.iter().any(|c| c.class.trim().is_empty()) {
            return Err(malformed("connector class is empty"));
        }
        Ok(())
    }

    pub fn is_manifest_file(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|name| MANIFEST_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)))
            .unwrap_or(false)
    }
}
