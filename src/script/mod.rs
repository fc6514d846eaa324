//! Registry of script executors keyed by language name.

use crate::error::ScriptError;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Named values visible to a script.
pub type Bindings = BTreeMap<String, Value>;

pub trait ScriptExecutor: Send + Sync {
    fn execute(&self, script: &str, bindings: &Bindings) -> Result<Value, ScriptError>;
}

pub trait ScriptExecutorFactory: Send + Sync {
    fn language(&self) -> &str;

    fn new_executor(&self) -> Result<Box<dyn ScriptExecutor>, ScriptError>;
}

#[derive(Default)]
pub struct ScriptExecutorRegistry {
    factories: DashMap<String, Arc<dyn ScriptExecutorFactory>>,
}

static GLOBAL_REGISTRY: OnceLock<ScriptExecutorRegistry> = OnceLock::new();

impl ScriptExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry populated at startup.
    pub fn global() -> &'static ScriptExecutorRegistry {
        GLOBAL_REGISTRY.get_or_init(ScriptExecutorRegistry::new)
    }

    /// Registers `factory` under its language; a later registration for the same
    /// language replaces the earlier one.
    pub fn register(&self, factory: Arc<dyn ScriptExecutorFactory>) {
        let language = factory.language().to_ascii_lowercase();
        debug!(language = %language, "Registering script executor");
        self.factories.insert(language, factory);
    }

    pub fn new_instance(&self, language: &str) -> Result<Box<dyn ScriptExecutor>, ScriptError> {
        let factory = self
            .factories
            .get(&language.to_ascii_lowercase())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ScriptError::UnsupportedLanguage(language.to_string()))?;
        factory.new_executor()
    }

    pub fn supported_languages(&self) -> Vec<String> {
        let mut languages: Vec<String> =
            self.factories.iter().map(|entry| entry.key().clone()).collect();
        languages.sort();
        languages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl ScriptExecutor for Echo {
        fn execute(&self, script: &str, bindings: &Bindings) -> Result<Value, ScriptError> {
            Ok(serde_json::json!({ "script": script, "bindings": bindings }))
        }
    }

    struct EchoFactory;

    impl ScriptExecutorFactory for EchoFactory {
        fn language(&self) -> &str {
            "Echo"
        }

        fn new_executor(&self) -> Result<Box<dyn ScriptExecutor>, ScriptError> {
            Ok(Box::new(Echo))
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = ScriptExecutorRegistry::new();
        registry.register(Arc::new(EchoFactory));

        let executor = registry.new_instance("ECHO").unwrap();
        let mut bindings = Bindings::new();
        bindings.insert("x".to_string(), Value::from(1));
        let result = executor.execute("return x", &bindings).unwrap();
        assert_eq!(result["bindings"]["x"], 1);
        assert_eq!(registry.supported_languages(), vec!["echo".to_string()]);
    }

    #[test]
    fn test_unknown_language() {
        let registry = ScriptExecutorRegistry::new();
        assert!(matches!(
            registry.new_instance("groovy"),
            Err(ScriptError::UnsupportedLanguage(lang)) if lang == "groovy"
        ));
    }
}
