use crate::connector::ConnectorKey;
use crate::error::{
    ConfigError, ConnectorError, FrameworkError, PoolError, ProtocolError, ScriptError,
    SecurityError, TransportError,
};
use serde::{Deserialize, Serialize};

/// Error carried by `OPERATION_ERROR` frames.
///
/// Every taxonomy kind has its own variant so the remote side rebuilds the
/// same [`FrameworkError`] variant a local caller would have received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "error", rename_all = "snake_case")]
pub enum ErrorPayload {
    Config(ConfigError),
    Authentication(String),
    Connectivity(String),
    Timeout { operation: String, after_ms: u64 },
    Pool(PoolError),
    Connector(ConnectorError),
    Security(SecurityError),
    Script(ScriptError),
    NotFound(ConnectorKey),
    Protocol(String),
    Internal(String),
}

impl From<&FrameworkError> for ErrorPayload {
    fn from(error: &FrameworkError) -> Self {
        match error {
            FrameworkError::Config(e) => ErrorPayload::Config(e.clone()),
            FrameworkError::Authentication(message) => {
                ErrorPayload::Authentication(message.clone())
            }
            FrameworkError::Transport(TransportError::Timeout {
                operation,
                after_ms,
            }) => ErrorPayload::Timeout {
                operation: operation.clone(),
                after_ms: *after_ms,
            },
            FrameworkError::Transport(e) => ErrorPayload::Connectivity(e.to_string()),
            FrameworkError::Pool(e) => ErrorPayload::Pool(e.clone()),
            FrameworkError::Connector(e) => ErrorPayload::Connector(e.clone()),
            FrameworkError::Security(e) => ErrorPayload::Security(e.clone()),
            FrameworkError::Script(e) => ErrorPayload::Script(e.clone()),
            FrameworkError::ConnectorNotFound(key) => ErrorPayload::NotFound(key.clone()),
            FrameworkError::Protocol(e) => ErrorPayload::Protocol(e.to_string()),
            FrameworkError::Serialization(e) => ErrorPayload::Internal(e.to_string()),
            FrameworkError::Metrics(e) => ErrorPayload::Internal(e.to_string()),
        }
    }
}

impl From<ErrorPayload> for FrameworkError {
    fn from(payload: ErrorPayload) -> Self {
        match payload {
            ErrorPayload::Config(e) => FrameworkError::Config(e),
            ErrorPayload::Authentication(message) => FrameworkError::Authentication(message),
            ErrorPayload::Connectivity(message) => {
                FrameworkError::Transport(TransportError::ConnectionFailed(message))
            }
            ErrorPayload::Timeout {
                operation,
                after_ms,
            } => FrameworkError::Transport(TransportError::Timeout {
                operation,
                after_ms,
            }),
            ErrorPayload::Pool(e) => FrameworkError::Pool(e),
            ErrorPayload::Connector(e) => FrameworkError::Connector(e),
            ErrorPayload::Security(e) => FrameworkError::Security(e),
            ErrorPayload::Script(e) => FrameworkError::Script(e),
            ErrorPayload::NotFound(key) => FrameworkError::ConnectorNotFound(key),
            ErrorPayload::Protocol(message) | ErrorPayload::Internal(message) => {
                FrameworkError::Protocol(ProtocolError::Remote(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn across_the_wire(error: FrameworkError) -> FrameworkError {
        let payload = ErrorPayload::from(&error);
        let json = serde_json::to_string(&payload).unwrap();
        serde_json::from_str::<ErrorPayload>(&json).unwrap().into()
    }

    #[test]
    fn test_connector_detail_survives() {
        let error = ConnectorError::OperationFailed {
            message: "constraint violation".to_string(),
            code: Some("19".to_string()),
        };
        match across_the_wire(error.clone().into()) {
            FrameworkError::Connector(back) => assert_eq!(back, error),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_taxonomy_kind_is_preserved() {
        let exhausted = across_the_wire(
            PoolError::Exhausted {
                pool: "ldap".to_string(),
                waited_ms: 50,
            }
            .into(),
        );
        assert!(exhausted.is_retryable());
        assert!(matches!(
            exhausted,
            FrameworkError::Pool(PoolError::Exhausted { waited_ms: 50, .. })
        ));

        let timeout = across_the_wire(
            TransportError::Timeout {
                operation: "create".to_string(),
                after_ms: 20,
            }
            .into(),
        );
        assert!(timeout.is_connectivity());

        let missing = across_the_wire(FrameworkError::ConnectorNotFound(ConnectorKey::new(
            "b", "1", "C",
        )));
        assert!(matches!(missing, FrameworkError::ConnectorNotFound(_)));

        let config = across_the_wire(
            ConfigError::InvalidProperty {
                property: "port".to_string(),
                reason: "expected integer".to_string(),
            }
            .into(),
        );
        assert!(matches!(config, FrameworkError::Config(ConfigError::InvalidProperty { .. })));
    }
}
