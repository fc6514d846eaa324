use crate::connector::ConnectorKey;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameworkError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Security error: {0}")]
    Security(#[from] SecurityError),

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Protocol error: {0}")]
    Protocol(ProtocolError),

    #[error("Connector not found: {0}")]
    ConnectorNotFound(ConnectorKey),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl FrameworkError {
    /// Pool exhaustion and connectivity failures may succeed when retried by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FrameworkError::Pool(PoolError::Exhausted { .. })) || self.is_connectivity()
    }

    pub fn is_connectivity(&self) -> bool {
        match self {
            FrameworkError::Transport(_) => true,
            FrameworkError::Connector(e) => e.is_connectivity(),
            _ => false,
        }
    }
}

impl From<io::Error> for FrameworkError {
    fn from(e: io::Error) -> Self {
        FrameworkError::Transport(TransportError::Io(e))
    }
}

impl From<ProtocolError> for FrameworkError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::Io(e) => FrameworkError::Transport(TransportError::Io(e)),
            other => FrameworkError::Protocol(other),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Environment variable error: {0}")]
    EnvVar(String),

    #[error("Invalid property '{property}': {reason}")]
    InvalidProperty { property: String, reason: String },

    #[error("Malformed bundle {bundle}: {reason}")]
    MalformedBundle { bundle: String, reason: String },

    #[error("Duplicate connector key: {0}")]
    DuplicateConnectorKey(ConnectorKey),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed by peer")]
    Closed,

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoolError {
    #[error("Pool {pool} exhausted after waiting {waited_ms}ms")]
    Exhausted { pool: String, waited_ms: u64 },

    #[error("Pool {pool} is shut down")]
    ShutDown { pool: String },
}

/// Errors raised by connector implementations.
///
/// These travel across the wire unchanged, so a remote caller sees exactly
/// what the connector reported.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectorError {
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("invalid credentials: {message}")]
    InvalidCredentials { message: String },

    #[error("object already exists: {uid}")]
    AlreadyExists { uid: String },

    #[error("unknown uid: {uid}")]
    UnknownUid { uid: String },

    #[error("operation not supported: {operation}")]
    UnsupportedOperation { operation: String },

    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl ConnectorError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ConnectorError::ConnectionFailed { .. })
    }

    pub fn unsupported(operation: impl Into<String>) -> Self {
        ConnectorError::UnsupportedOperation {
            operation: operation.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SecurityError {
    #[error("Encryptor unavailable: {0}")]
    EncryptorUnavailable(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Secret has been disposed")]
    Disposed,

    #[error("Invalid secret hash: {0}")]
    InvalidHash(String),

    #[error("Secret is not valid UTF-8")]
    Encoding,
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ScriptError {
    #[error("Unsupported script language: {0}")]
    UnsupportedLanguage(String),

    #[error("Script execution failed: {0}")]
    Execution(String),
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Unknown message kind: {0}")]
    UnknownMessageKind(u8),

    #[error("Frame of {length} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { length: usize, max: usize },

    #[error("Unexpected message: expected {expected}, got {actual}")]
    UnexpectedMessage { expected: String, actual: String },

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Remote protocol error: {0}")]
    Remote(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::Malformed(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FrameworkError>;
pub type ConnectorResult<T> = std::result::Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let exhausted: FrameworkError = PoolError::Exhausted {
            pool: "p".to_string(),
            waited_ms: 10,
        }
        .into();
        assert!(exhausted.is_retryable());
        assert!(!exhausted.is_connectivity());

        let closed: FrameworkError = TransportError::Closed.into();
        assert!(closed.is_retryable());

        let connector: FrameworkError = ConnectorError::ConnectionFailed {
            message: "ldap down".to_string(),
        }
        .into();
        assert!(connector.is_connectivity());

        let rejected: FrameworkError = ConnectorError::AlreadyExists {
            uid: "u1".to_string(),
        }
        .into();
        assert!(!rejected.is_retryable());

        let auth = FrameworkError::Authentication("bad key".to_string());
        assert!(!auth.is_retryable());
    }

    #[test]
    fn test_connector_error_serialization_keeps_detail() {
        let error = ConnectorError::OperationFailed {
            message: "target rejected the request".to_string(),
            code: Some("LDAP-53".to_string()),
        };
        let json = serde_json::to_string(&error).unwrap();
        let back: ConnectorError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, error);
    }

    #[test]
    fn test_protocol_io_maps_to_transport() {
        let error: FrameworkError =
            ProtocolError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "gone")).into();
        assert!(matches!(error, FrameworkError::Transport(TransportError::Io(_))));
    }
}
