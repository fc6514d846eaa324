pub mod encryptor;
pub mod guarded;
pub mod hash;

pub use encryptor::{AesGcmEncryptor, AesGcmEncryptorFactory, Encryptor, EncryptorFactory};
pub use guarded::GuardedSecret;
pub use hash::{HashAlgorithm, SecretHash};

use crate::error::SecurityError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::{debug, error};

/// Name of the built-in AES-256-GCM factory.
pub const DEFAULT_ENCRYPTOR: &str = "aes-256-gcm";

pub type EncryptorConstructor =
    Arc<dyn Fn() -> Result<Arc<dyn EncryptorFactory>, SecurityError> + Send + Sync>;

struct EncryptorState {
    selected: String,
    constructors: HashMap<String, EncryptorConstructor>,
    instance: Option<Result<Arc<dyn EncryptorFactory>, SecurityError>>,
}

impl EncryptorState {
    fn new() -> Self {
        let mut constructors: HashMap<String, EncryptorConstructor> = HashMap::new();
        constructors.insert(
            DEFAULT_ENCRYPTOR.to_string(),
            Arc::new(|| {
                AesGcmEncryptorFactory::new().map(|f| Arc::new(f) as Arc<dyn EncryptorFactory>)
            }),
        );
        Self {
            selected: DEFAULT_ENCRYPTOR.to_string(),
            constructors,
            instance: None,
        }
    }
}

static ENCRYPTOR_STATE: OnceLock<Mutex<EncryptorState>> = OnceLock::new();

fn state() -> MutexGuard<'static, EncryptorState> {
    ENCRYPTOR_STATE
        .get_or_init(|| Mutex::new(EncryptorState::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registers an encryptor implementation under `name`.
///
/// Registration after the process-wide factory was resolved does not replace it.
pub fn register_encryptor_factory(name: impl Into<String>, constructor: EncryptorConstructor) {
    let name = name.into();
    debug!(encryptor = %name, "Registering encryptor factory");
    state().constructors.insert(name, constructor);
}

/// Chooses which registered implementation the process-wide factory is built from.
pub fn select_encryptor_factory(name: &str) -> Result<(), SecurityError> {
    let mut state = state();
    if state.instance.is_some() && state.selected != name {
        return Err(SecurityError::EncryptorUnavailable(format!(
            "encryptor '{}' already initialised, cannot switch to '{}'",
            state.selected, name
        )));
    }
    state.selected = name.to_string();
    Ok(())
}

/// Returns the process-wide encryptor factory, creating it on first use.
///
/// Exactly one factory is created even under concurrent first use. A failed
/// initialisation is remembered and the same error is returned on every call.
pub fn encryptor_factory() -> Result<Arc<dyn EncryptorFactory>, SecurityError> {
    let mut state = state();
    if let Some(instance) = &state.instance {
        return instance.clone();
    }

    let result = match state.constructors.get(&state.selected) {
        Some(constructor) => constructor(),
        None => Err(SecurityError::EncryptorUnavailable(format!(
            "no encryptor registered under '{}'",
            state.selected
        ))),
    };

    match &result {
        Ok(_) => debug!(encryptor = %state.selected, "Encryptor factory initialised"),
        Err(e) => error!(
            encryptor = %state.selected,
            error = %e,
            "Encryptor factory initialisation failed; guarded secrets are unusable"
        ),
    }

    state.instance = Some(result.clone());
    result
}

pub fn default_encryptor() -> Result<Arc<dyn Encryptor>, SecurityError> {
    Ok(encryptor_factory()?.default_encryptor())
}

pub fn new_random_encryptor() -> Result<Arc<dyn Encryptor>, SecurityError> {
    encryptor_factory()?.new_random_encryptor()
}

/// Drops the resolved factory and restores the built-in registry.
pub fn reset_encryptor_factory() {
    *state() = EncryptorState::new();
}
