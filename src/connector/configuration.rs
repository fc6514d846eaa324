use crate::error::{ConfigError, Result};
use crate::security::GuardedSecret;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    String,
    Boolean,
    Integer,
    Secret,
    StringArray,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyType::String => "string",
            PropertyType::Boolean => "boolean",
            PropertyType::Integer => "integer",
            PropertyType::Secret => "secret",
            PropertyType::StringArray => "string array",
        };
        f.write_str(name)
    }
}

/// A typed configuration value. Secrets travel as sealed blobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConfigValue {
    String(String),
    Boolean(bool),
    Integer(i64),
    Secret(GuardedSecret),
    StringArray(Vec<String>),
}

impl ConfigValue {
    pub fn property_type(&self) -> PropertyType {
        match self {
            ConfigValue::String(_) => PropertyType::String,
            ConfigValue::Boolean(_) => PropertyType::Boolean,
            ConfigValue::Integer(_) => PropertyType::Integer,
            ConfigValue::Secret(_) => PropertyType::Secret,
            ConfigValue::StringArray(_) => PropertyType::StringArray,
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Boolean(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Integer(value)
    }
}

impl From<GuardedSecret> for ConfigValue {
    fn from(value: GuardedSecret) -> Self {
        ConfigValue::Secret(value)
    }
}

impl From<Vec<String>> for ConfigValue {
    fn from(value: Vec<String>) -> Self {
        ConfigValue::StringArray(value)
    }
}

/// Property set bound to one connector instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    properties: BTreeMap<String, ConfigValue>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ConfigValue>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ConfigValue> {
        self.properties.get(name)
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.properties.get(name) {
            Some(ConfigValue::String(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.properties.get(name) {
            Some(ConfigValue::Boolean(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn get_integer(&self, name: &str) -> Option<i64> {
        match self.properties.get(name) {
            Some(ConfigValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn get_secret(&self, name: &str) -> Option<&GuardedSecret> {
        match self.properties.get(name) {
            Some(ConfigValue::Secret(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_string_array(&self, name: &str) -> Option<&[String]> {
        match self.properties.get(name) {
            Some(ConfigValue::StringArray(value)) => Some(value),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ConfigValue)> {
        self.properties.iter()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Hex SHA-256 of the canonical serialised form.
    ///
    /// Two configurations with the same fingerprint share a connector pool.
    /// Secrets contribute their default-key blob, which is stable for equal values.
    pub fn fingerprint(&self) -> Result<String> {
        let canonical = serde_json::to_vec(&self.properties)?;
        let digest = Sha256::digest(&canonical);
        Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Non-secret properties as JSON, for script bindings.
    pub fn public_properties(&self) -> serde_json::Value {
        let map = self
            .properties
            .iter()
            .filter_map(|(name, value)| {
                let json = match value {
                    ConfigValue::String(v) => serde_json::Value::from(v.clone()),
                    ConfigValue::Boolean(v) => serde_json::Value::from(*v),
                    ConfigValue::Integer(v) => serde_json::Value::from(*v),
                    ConfigValue::StringArray(v) => serde_json::Value::from(v.clone()),
                    ConfigValue::Secret(_) => return None,
                };
                Some((name.clone(), json))
            })
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySpec {
    pub name: String,
    pub property_type: PropertyType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ConfigValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl PropertySpec {
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
            required: false,
            default: None,
            help: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<ConfigValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

/// Declared configuration properties of a connector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigurationSchema {
    properties: Vec<PropertySpec>,
}

impl ConfigurationSchema {
    pub fn new(properties: Vec<PropertySpec>) -> Self {
        Self { properties }
    }

    pub fn properties(&self) -> &[PropertySpec] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Checks `configuration` against the schema and fills in defaults.
    pub fn apply(
        &self,
        mut configuration: Configuration,
    ) -> std::result::Result<Configuration, ConfigError> {
        if let Some(unknown) = configuration
            .properties
            .keys()
            .find(|name| self.property(name).is_none())
        {
            return Err(ConfigError::InvalidProperty {
                property: unknown.clone(),
                reason: "not declared by the connector".to_string(),
            });
        }

        for spec in &self.properties {
            match configuration.properties.get(&spec.name) {
                Some(value) if value.property_type() != spec.property_type => {
                    return Err(ConfigError::InvalidProperty {
                        property: spec.name.clone(),
                        reason: format!(
                            "expected {}, got {}",
                            spec.property_type,
                            value.property_type()
                        ),
                    });
                }
                Some(_) => {}
                None => match &spec.default {
                    Some(default) => {
                        configuration
                            .properties
                            .insert(spec.name.clone(), default.clone());
                    }
                    None if spec.required => {
                        return Err(ConfigError::InvalidProperty {
                            property: spec.name.clone(),
                            reason: "required property is missing".to_string(),
                        });
                    }
                    None => {}
                },
            }
        }

        Ok(configuration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ConfigurationSchema {
        ConfigurationSchema::new(vec![
            PropertySpec::new("host", PropertyType::String).required(),
            PropertySpec::new("port", PropertyType::Integer).with_default(389i64),
            PropertySpec::new("ssl", PropertyType::Boolean),
            PropertySpec::new("password", PropertyType::Secret),
        ])
    }

    #[test]
    fn test_apply_fills_defaults() {
        let applied = schema()
            .apply(Configuration::new().with("host", "ldap.example.com"))
            .unwrap();
        assert_eq!(applied.get_integer("port"), Some(389));
        assert_eq!(applied.get_string("host"), Some("ldap.example.com"));
        assert!(applied.get("ssl").is_none());
    }

    #[test]
    fn test_apply_rejects_invalid_properties() {
        let missing = schema().apply(Configuration::new());
        assert!(matches!(
            missing,
            Err(ConfigError::InvalidProperty { ref property, .. }) if property == "host"
        ));

        let mismatch = schema().apply(Configuration::new().with("host", "h").with("port", "389"));
        assert!(matches!(
            mismatch,
            Err(ConfigError::InvalidProperty { ref property, .. }) if property == "port"
        ));

        let unknown = schema().apply(Configuration::new().with("host", "h").with("colour", "red"));
        assert!(matches!(
            unknown,
            Err(ConfigError::InvalidProperty { ref property, .. }) if property == "colour"
        ));
    }

    #[test]
    fn test_fingerprint_is_order_independent_and_secret_stable() {
        let password = GuardedSecret::from_string("pw".to_string()).unwrap();
        let a = Configuration::new()
            .with("host", "a")
            .with("port", 1i64)
            .with("password", password.clone());
        let b = Configuration::new()
            .with("password", GuardedSecret::from_string("pw".to_string()).unwrap())
            .with("port", 1i64)
            .with("host", "a");
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());

        let c = a.clone().with("port", 2i64);
        assert_ne!(a.fingerprint().unwrap(), c.fingerprint().unwrap());
    }

    #[test]
    fn test_secrets_serialise_sealed() {
        let config = Configuration::new()
            .with("password", GuardedSecret::from_string("plain-pw".to_string()).unwrap());
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"type\":\"secret\""));
        assert!(!json.contains("plain-pw"));

        let back: Configuration = serde_json::from_str(&json).unwrap();
        let restored = back.get_secret("password").unwrap();
        assert_eq!(restored.access_str(|s| s.to_string()).unwrap(), "plain-pw");
    }

    #[test]
    fn test_public_properties_skip_secrets() {
        let config = Configuration::new()
            .with("host", "h")
            .with("password", GuardedSecret::from_string("x".to_string()).unwrap());
        let public = config.public_properties();
        assert_eq!(public["host"], "h");
        assert!(public.get("password").is_none());
    }
}
