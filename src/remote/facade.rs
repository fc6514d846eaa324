use super::client::SessionPool;
use crate::connector::{
    AttributeSet, Configuration, ConnectorInfo, ConnectorKey, Filter, ObjectClass,
    OperationOptions, ResultsHandler, Schema, Script, SearchResult, Uid,
};
use crate::error::{ProtocolError, Result};
use crate::facade::ConnectorFacade;
use crate::protocol::{InvokeRequest, OperationRequest, OperationResponse};
use crate::security::GuardedSecret;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Invokes operations on a connector hosted by a connector server.
///
/// No call is retried; a lost connection surfaces as a transport error.
pub struct RemoteConnectorFacade {
    info: ConnectorInfo,
    configuration: Configuration,
    sessions: Arc<SessionPool>,
}

impl RemoteConnectorFacade {
    pub(crate) fn new(
        info: ConnectorInfo,
        configuration: Configuration,
        sessions: Arc<SessionPool>,
    ) -> Self {
        Self {
            info,
            configuration,
            sessions,
        }
    }

    pub fn info(&self) -> &ConnectorInfo {
        &self.info
    }

    fn request(&self, operation: OperationRequest) -> InvokeRequest {
        InvokeRequest {
            key: self.info.key().clone(),
            configuration: self.configuration.clone(),
            operation,
        }
    }

    async fn call(&self, operation: OperationRequest) -> Result<OperationResponse> {
        let name = operation.name();
        debug!(connector = %self.info.key(), operation = name, "Invoking remote operation");
        let mut session = self.sessions.acquire().await?;
        let result = session.invoke(self.request(operation)).await;
        self.sessions.release(session);
        result
    }
}

fn mismatch(expected: &str, response: &OperationResponse) -> ProtocolError {
    ProtocolError::UnexpectedMessage {
        expected: expected.to_string(),
        actual: response.name().to_string(),
    }
}

fn expect_empty(response: OperationResponse) -> Result<()> {
    match response {
        OperationResponse::Empty => Ok(()),
        other => Err(mismatch("empty result", &other).into()),
    }
}

fn expect_uid(response: OperationResponse) -> Result<Uid> {
    match response {
        OperationResponse::Uid { uid } => Ok(uid),
        other => Err(mismatch("uid", &other).into()),
    }
}

#[async_trait]
impl ConnectorFacade for RemoteConnectorFacade {
    fn connector_key(&self) -> &ConnectorKey {
        self.info.key()
    }

    async fn validate(&self) -> Result<()> {
        expect_empty(self.call(OperationRequest::Validate).await?)
    }

    async fn test(&self) -> Result<()> {
        expect_empty(self.call(OperationRequest::Test).await?)
    }

    async fn schema(&self) -> Result<Schema> {
        match self.call(OperationRequest::Schema).await? {
            OperationResponse::Schema { schema } => Ok(schema),
            other => Err(mismatch("schema", &other).into()),
        }
    }

    async fn create(
        &self,
        object_class: &ObjectClass,
        attributes: AttributeSet,
        options: &OperationOptions,
    ) -> Result<Uid> {
        let operation = OperationRequest::Create {
            object_class: object_class.clone(),
            attributes,
            options: options.clone(),
        };
        expect_uid(self.call(operation).await?)
    }

    async fn update(
        &self,
        object_class: &ObjectClass,
        uid: &Uid,
        attributes: AttributeSet,
        options: &OperationOptions,
    ) -> Result<Uid> {
        let operation = OperationRequest::Update {
            object_class: object_class.clone(),
            uid: uid.clone(),
            attributes,
            options: options.clone(),
        };
        expect_uid(self.call(operation).await?)
    }

    async fn delete(
        &self,
        object_class: &ObjectClass,
        uid: &Uid,
        options: &OperationOptions,
    ) -> Result<()> {
        let operation = OperationRequest::Delete {
            object_class: object_class.clone(),
            uid: uid.clone(),
            options: options.clone(),
        };
        expect_empty(self.call(operation).await?)
    }

    async fn authenticate(
        &self,
        object_class: &ObjectClass,
        username: &str,
        password: &GuardedSecret,
        options: &OperationOptions,
    ) -> Result<Uid> {
        let operation = OperationRequest::Authenticate {
            object_class: object_class.clone(),
            username: username.to_string(),
            password: password.clone(),
            options: options.clone(),
        };
        expect_uid(self.call(operation).await?)
    }

    async fn search(
        &self,
        object_class: &ObjectClass,
        filter: Option<&Filter>,
        handler: &mut dyn ResultsHandler,
        options: &OperationOptions,
    ) -> Result<SearchResult> {
        let operation = OperationRequest::Search {
            object_class: object_class.clone(),
            filter: filter.cloned(),
            options: options.clone(),
            window: self.sessions.info().stream_window,
        };
        debug!(connector = %self.info.key(), "Starting remote search");
        let mut session = self.sessions.acquire().await?;
        let result = session.search(self.request(operation), handler).await;
        self.sessions.release(session);
        result
    }

    async fn run_script_on_connector(
        &self,
        script: &Script,
        options: &OperationOptions,
    ) -> Result<serde_json::Value> {
        let operation = OperationRequest::ScriptOnConnector {
            script: script.clone(),
            options: options.clone(),
        };
        match self.call(operation).await? {
            OperationResponse::Script { value } => Ok(value),
            other => Err(mismatch("script result", &other).into()),
        }
    }
}
