use crate::connector::ConnectorFactory;
use std::collections::HashMap;
use std::sync::Arc;

/// Connector classes linked into this process, keyed by class name.
///
/// Bundle manifests refer to classes by name; only registered classes can be
/// discovered.
#[derive(Default, Clone)]
pub struct ConnectorFactoryRegistry {
    factories: HashMap<String, Arc<dyn ConnectorFactory>>,
}

impl ConnectorFactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class: impl Into<String>, factory: Arc<dyn ConnectorFactory>) {
        self.factories.insert(class.into(), factory);
    }

    pub fn with(mut self, class: impl Into<String>, factory: Arc<dyn ConnectorFactory>) -> Self {
        self.register(class, factory);
        self
    }

    pub fn get(&self, class: &str) -> Option<Arc<dyn ConnectorFactory>> {
        self.factories.get(class).cloned()
    }

    pub fn classes(&self) -> Vec<&str> {
        let mut classes: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        classes.sort_unstable();
        classes
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
