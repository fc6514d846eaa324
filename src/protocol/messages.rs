use super::codec::{Frame, MessageKind};
use super::error::ErrorPayload;
use crate::connector::{
    AttributeSet, Configuration, ConnectorInfo, ConnectorKey, ConnectorObject, Filter,
    ObjectClass, OperationOptions, Schema, Script, SearchResult, Uid,
};
use crate::error::ProtocolError;
use crate::security::GuardedSecret;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Credits granted with a search request unless the client asks for more.
pub const DEFAULT_STREAM_WINDOW: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    /// Shared secret, sealed with the default encryptor.
    pub key: GuardedSecret,
    pub client_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthAccepted {
    pub server_version: String,
    pub server_started_at: DateTime<Utc>,
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRejected {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    pub key: ConnectorKey,
    pub configuration: Configuration,
    #[serde(flatten)]
    pub operation: OperationRequest,
}

fn default_window() -> u32 {
    DEFAULT_STREAM_WINDOW
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum OperationRequest {
    Validate,
    Test,
    Schema,
    #[serde(rename_all = "camelCase")]
    Create {
        object_class: ObjectClass,
        attributes: AttributeSet,
        #[serde(default)]
        options: OperationOptions,
    },
    #[serde(rename_all = "camelCase")]
    Update {
        object_class: ObjectClass,
        uid: Uid,
        attributes: AttributeSet,
        #[serde(default)]
        options: OperationOptions,
    },
    #[serde(rename_all = "camelCase")]
    Delete {
        object_class: ObjectClass,
        uid: Uid,
        #[serde(default)]
        options: OperationOptions,
    },
    #[serde(rename_all = "camelCase")]
    Authenticate {
        object_class: ObjectClass,
        username: String,
        password: GuardedSecret,
        #[serde(default)]
        options: OperationOptions,
    },
    #[serde(rename_all = "camelCase")]
    Search {
        object_class: ObjectClass,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<Filter>,
        #[serde(default)]
        options: OperationOptions,
        #[serde(default = "default_window")]
        window: u32,
    },
    #[serde(rename_all = "camelCase")]
    ScriptOnConnector {
        script: Script,
        #[serde(default)]
        options: OperationOptions,
    },
}

impl OperationRequest {
    pub fn name(&self) -> &'static str {
        match self {
            OperationRequest::Validate => "validate",
            OperationRequest::Test => "test",
            OperationRequest::Schema => "schema",
            OperationRequest::Create { .. } => "create",
            OperationRequest::Update { .. } => "update",
            OperationRequest::Delete { .. } => "delete",
            OperationRequest::Authenticate { .. } => "authenticate",
            OperationRequest::Search { .. } => "search",
            OperationRequest::ScriptOnConnector { .. } => "run_script_on_connector",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationResponse {
    Empty,
    Uid { uid: Uid },
    Schema { schema: Schema },
    Search { result: SearchResult },
    Script { value: serde_json::Value },
}

impl OperationResponse {
    pub fn name(&self) -> &'static str {
        match self {
            OperationResponse::Empty => "empty",
            OperationResponse::Uid { .. } => "uid",
            OperationResponse::Schema { .. } => "schema",
            OperationResponse::Search { .. } => "search",
            OperationResponse::Script { .. } => "script",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamCredit {
    pub credit: u32,
}

#[derive(Debug, Clone)]
pub enum Message {
    Auth(AuthRequest),
    AuthOk(AuthAccepted),
    AuthFail(AuthRejected),
    ListConnectorInfos,
    ConnectorInfoList(Vec<ConnectorInfo>),
    InvokeOperation(Box<InvokeRequest>),
    OperationResult(OperationResponse),
    OperationResultChunk(Box<ConnectorObject>),
    OperationError(ErrorPayload),
    StreamCredit(StreamCredit),
    CancelOperation,
}

fn decode<T: DeserializeOwned>(payload: &Bytes) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(payload)?)
}

fn encode<T: Serialize>(kind: MessageKind, value: &T) -> Result<Frame, ProtocolError> {
    Ok(Frame::new(kind, serde_json::to_vec(value)?))
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Auth(_) => MessageKind::Auth,
            Message::AuthOk(_) => MessageKind::AuthOk,
            Message::AuthFail(_) => MessageKind::AuthFail,
            Message::ListConnectorInfos => MessageKind::ListConnectorInfos,
            Message::ConnectorInfoList(_) => MessageKind::ConnectorInfoList,
            Message::InvokeOperation(_) => MessageKind::InvokeOperation,
            Message::OperationResult(_) => MessageKind::OperationResult,
            Message::OperationResultChunk(_) => MessageKind::OperationResultChunk,
            Message::OperationError(_) => MessageKind::OperationError,
            Message::StreamCredit(_) => MessageKind::StreamCredit,
            Message::CancelOperation => MessageKind::CancelOperation,
        }
    }

    pub fn from_frame(frame: Frame) -> Result<Self, ProtocolError> {
        let payload = &frame.payload;
        let message = match frame.kind {
            MessageKind::Auth => Message::Auth(decode(payload)?),
            MessageKind::AuthOk => Message::AuthOk(decode(payload)?),
            MessageKind::AuthFail => Message::AuthFail(decode(payload)?),
            MessageKind::ListConnectorInfos => Message::ListConnectorInfos,
            MessageKind::ConnectorInfoList => Message::ConnectorInfoList(decode(payload)?),
            MessageKind::InvokeOperation => Message::InvokeOperation(decode(payload)?),
            MessageKind::OperationResult => Message::OperationResult(decode(payload)?),
            MessageKind::OperationResultChunk => Message::OperationResultChunk(decode(payload)?),
            MessageKind::OperationError => Message::OperationError(decode(payload)?),
            MessageKind::StreamCredit => Message::StreamCredit(decode(payload)?),
            MessageKind::CancelOperation => Message::CancelOperation,
        };
        Ok(message)
    }

    pub fn into_frame(self) -> Result<Frame, ProtocolError> {
        let kind = self.kind();
        match self {
            Message::Auth(auth) => encode(kind, &auth),
            Message::AuthOk(accepted) => encode(kind, &accepted),
            Message::AuthFail(rejected) => encode(kind, &rejected),
            Message::ListConnectorInfos | Message::CancelOperation => Ok(Frame::empty(kind)),
            Message::ConnectorInfoList(infos) => encode(kind, &infos),
            Message::InvokeOperation(request) => encode(kind, &request),
            Message::OperationResult(response) => encode(kind, &response),
            Message::OperationResultChunk(object) => encode(kind, &object),
            Message::OperationError(error) => encode(kind, &error),
            Message::StreamCredit(credit) => encode(kind, &credit),
        }
    }

    /// Error for receiving this message where `expected` was required.
    pub fn unexpected(&self, expected: &str) -> ProtocolError {
        ProtocolError::UnexpectedMessage {
            expected: expected.to_string(),
            actual: self.kind().name().to_string(),
        }
    }
}
