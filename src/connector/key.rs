use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a discoverable connector implementation.
///
/// Equality, ordering and hashing are structural over all three parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorKey {
    bundle_name: String,
    bundle_version: String,
    connector_name: String,
}

impl ConnectorKey {
    pub fn new(
        bundle_name: impl Into<String>,
        bundle_version: impl Into<String>,
        connector_name: impl Into<String>,
    ) -> Self {
        Self {
            bundle_name: bundle_name.into(),
            bundle_version: bundle_version.into(),
            connector_name: connector_name.into(),
        }
    }

    pub fn bundle_name(&self) -> &str {
        &self.bundle_name
    }

    pub fn bundle_version(&self) -> &str {
        &self.bundle_version
    }

    pub fn connector_name(&self) -> &str {
        &self.connector_name
    }
}

impl fmt::Display for ConnectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}",
            self.bundle_name, self.bundle_version, self.connector_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_keys_differ_by_any_component() {
        let base = ConnectorKey::new("ldap", "1.0", "LdapConnector");
        let keys = [
            base.clone(),
            ConnectorKey::new("ldap", "1.1", "LdapConnector"),
            ConnectorKey::new("ad", "1.0", "LdapConnector"),
            ConnectorKey::new("ldap", "1.0", "LdifConnector"),
        ];
        let unique: HashSet<_> = keys.iter().cloned().collect();
        assert_eq!(unique.len(), 4);
        assert_eq!(base, ConnectorKey::new("ldap", "1.0", "LdapConnector"));
    }

    #[test]
    fn test_display() {
        let key = ConnectorKey::new("csv", "2.3.0", "CsvConnector");
        assert_eq!(key.to_string(), "csv:2.3.0/CsvConnector");
    }
}
