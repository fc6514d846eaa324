use super::metrics::ServerMetrics;
use crate::bundle::LocalConnectorInfoManager;
use crate::connector::{ConnectorObject, ResultsHandler};
use crate::error::{ProtocolError, Result};
use crate::facade::ConnectorFacade;
use crate::protocol::{
    AuthAccepted, AuthRejected, ErrorPayload, InvokeRequest, Message, MessageCodec,
    OperationRequest, OperationResponse, StreamCredit, PROTOCOL_VERSION,
};
use crate::security::SecretHash;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{FutureExt, SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};
use uuid::Uuid;

type Transport = Framed<TcpStream, MessageCodec>;

/// State shared by every connection of one server.
pub(crate) struct SessionContext {
    pub manager: Arc<LocalConnectorInfoManager>,
    pub key_hash: SecretHash,
    pub handshake_timeout: Duration,
    pub started_at: DateTime<Utc>,
    pub metrics: Arc<ServerMetrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingAuth,
    Ready,
    Streaming,
    Closed,
}

/// One client connection. Requests are handled strictly one after another.
pub(crate) struct Session {
    id: Uuid,
    peer: SocketAddr,
    framed: Transport,
    context: Arc<SessionContext>,
    state: SessionState,
}

impl Session {
    pub fn new(stream: TcpStream, peer: SocketAddr, context: Arc<SessionContext>) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            framed: Framed::new(stream, MessageCodec::new()),
            context,
            state: SessionState::AwaitingAuth,
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(session = %self.id, from = ?self.state, to = ?next, "Session state change");
        self.state = next;
    }

    pub async fn run(mut self) -> Result<()> {
        let accepted_at = Instant::now();
        let authenticated = self.handshake().await;
        if !matches!(authenticated, Ok(true)) {
            self.transition(SessionState::Closed);
            return authenticated.map(|_| ());
        }
        self.context
            .metrics
            .handshake_duration
            .observe(accepted_at.elapsed().as_secs_f64());

        self.transition(SessionState::Ready);
        let result = self.serve_requests().await;
        self.transition(SessionState::Closed);
        result
    }

    async fn handshake(&mut self) -> Result<bool> {
        let first = match timeout(self.context.handshake_timeout, self.framed.next()).await {
            Err(_) => {
                self.reject("handshake timed out").await;
                return Ok(false);
            }
            Ok(None) => {
                debug!(peer = %self.peer, "Connection closed before handshake");
                return Ok(false);
            }
            Ok(Some(Err(ProtocolError::Io(e)))) => return Err(e.into()),
            Ok(Some(Err(e))) => {
                self.reject(&format!("malformed handshake: {e}")).await;
                return Ok(false);
            }
            Ok(Some(Ok(message))) => message,
        };

        let request = match first {
            Message::Auth(request) => request,
            other => {
                let reason = other.unexpected("AUTH").to_string();
                self.reject(&reason).await;
                return Ok(false);
            }
        };

        match request.key.verify_hash(&self.context.key_hash) {
            Ok(true) => {}
            Ok(false) => {
                self.reject("invalid shared secret").await;
                return Ok(false);
            }
            Err(e) => {
                self.reject(&format!("unable to verify shared secret: {e}")).await;
                return Ok(false);
            }
        }

        self.framed
            .send(Message::AuthOk(AuthAccepted {
                server_version: PROTOCOL_VERSION.to_string(),
                server_started_at: self.context.started_at,
                session_id: self.id,
            }))
            .await?;
        info!(
            peer = %self.peer,
            session = %self.id,
            client_version = %request.client_version,
            "Client authenticated"
        );
        Ok(true)
    }

    async fn reject(&mut self, reason: &str) {
        self.context.metrics.auth_failures.inc();
        warn!(peer = %self.peer, reason, "Rejecting connection");
        let rejected = Message::AuthFail(AuthRejected {
            message: reason.to_string(),
        });
        if let Err(e) = self.framed.send(rejected).await {
            debug!(peer = %self.peer, error = %e, "Failed to send AUTH_FAIL");
        }
    }

    async fn serve_requests(&mut self) -> Result<()> {
        loop {
            let message = match self.framed.next().await {
                None => {
                    debug!(session = %self.id, "Client closed connection");
                    return Ok(());
                }
                Some(Err(e)) => {
                    warn!(session = %self.id, error = %e, "Protocol error");
                    let payload = ErrorPayload::Protocol(e.to_string());
                    let _ = self.framed.send(Message::OperationError(payload)).await;
                    return Err(e.into());
                }
                Some(Ok(message)) => message,
            };

            match message {
                Message::ListConnectorInfos => {
                    let infos = self.context.manager.connector_infos();
                    debug!(session = %self.id, connectors = infos.len(), "Listing connector infos");
                    self.framed.send(Message::ConnectorInfoList(infos)).await?;
                }
                Message::InvokeOperation(request) => {
                    if !self.invoke(*request).await? {
                        return Ok(());
                    }
                }
                Message::StreamCredit(_) | Message::CancelOperation => {
                    debug!(session = %self.id, "Ignoring stream control outside a search");
                }
                other => {
                    let error = other.unexpected("LIST_CONNECTOR_INFOS or INVOKE_OPERATION");
                    let payload = ErrorPayload::Protocol(error.to_string());
                    let _ = self.framed.send(Message::OperationError(payload)).await;
                    return Err(error.into());
                }
            }
        }
    }

    /// Runs one operation and replies. Returns `false` once the peer is gone.
    async fn invoke(&mut self, request: InvokeRequest) -> Result<bool> {
        let InvokeRequest {
            key,
            configuration,
            operation,
        } = request;
        let name = operation.name();
        let started = Instant::now();
        debug!(session = %self.id, connector = %key, operation = name, "Invoking operation");

        let (outcome, open) = match self
            .context
            .manager
            .create_connector_facade(&key, configuration)
        {
            Ok(facade) => self.dispatch(facade, operation).await,
            Err(e) => (Err(e), true),
        };
        self.context
            .metrics
            .record_operation(name, started.elapsed(), outcome.as_ref().err());

        if !open {
            debug!(session = %self.id, operation = name, "Client went away during operation");
            return Ok(false);
        }

        let reply = match outcome {
            Ok(response) => Message::OperationResult(response),
            Err(e) => {
                debug!(session = %self.id, operation = name, error = %e, "Operation failed");
                Message::OperationError(ErrorPayload::from(&e))
            }
        };
        self.framed.send(reply).await?;
        Ok(true)
    }

    async fn dispatch(
        &mut self,
        facade: Arc<dyn ConnectorFacade>,
        operation: OperationRequest,
    ) -> (Result<OperationResponse>, bool) {
        let outcome = match operation {
            OperationRequest::Validate => facade.validate().await.map(|_| OperationResponse::Empty),
            OperationRequest::Test => facade.test().await.map(|_| OperationResponse::Empty),
            OperationRequest::Schema => facade
                .schema()
                .await
                .map(|schema| OperationResponse::Schema { schema }),
            OperationRequest::Create {
                object_class,
                attributes,
                options,
            } => facade
                .create(&object_class, attributes, &options)
                .await
                .map(|uid| OperationResponse::Uid { uid }),
            OperationRequest::Update {
                object_class,
                uid,
                attributes,
                options,
            } => facade
                .update(&object_class, &uid, attributes, &options)
                .await
                .map(|uid| OperationResponse::Uid { uid }),
            OperationRequest::Delete {
                object_class,
                uid,
                options,
            } => facade
                .delete(&object_class, &uid, &options)
                .await
                .map(|_| OperationResponse::Empty),
            OperationRequest::Authenticate {
                object_class,
                username,
                password,
                options,
            } => facade
                .authenticate(&object_class, &username, &password, &options)
                .await
                .map(|uid| OperationResponse::Uid { uid }),
            OperationRequest::ScriptOnConnector { script, options } => facade
                .run_script_on_connector(&script, &options)
                .await
                .map(|value| OperationResponse::Script { value }),
            OperationRequest::Search {
                object_class,
                filter,
                options,
                window,
            } => {
                self.transition(SessionState::Streaming);
                let mut handler = RemoteResultsHandler::new(&mut self.framed, window.max(1));
                let result = facade
                    .search(&object_class, filter.as_ref(), &mut handler, &options)
                    .await;
                let (sent, cancelled, closed) = (handler.sent, handler.cancelled, handler.closed);
                debug!(session = %self.id, sent, cancelled, "Search stream finished");
                self.transition(SessionState::Ready);
                return (result.map(|result| OperationResponse::Search { result }), !closed);
            }
        };
        (outcome, true)
    }
}

/// Forwards search results as chunks, one per credit granted by the client.
struct RemoteResultsHandler<'a> {
    framed: &'a mut Transport,
    credits: u32,
    sent: usize,
    cancelled: bool,
    closed: bool,
}

impl<'a> RemoteResultsHandler<'a> {
    fn new(framed: &'a mut Transport, window: u32) -> Self {
        Self {
            framed,
            credits: window,
            sent: 0,
            cancelled: false,
            closed: false,
        }
    }

    fn stopped(&self) -> bool {
        self.cancelled || self.closed
    }

    fn apply(&mut self, message: Option<std::result::Result<Message, ProtocolError>>) {
        match message {
            Some(Ok(Message::StreamCredit(StreamCredit { credit }))) => {
                self.credits = self.credits.saturating_add(credit);
            }
            Some(Ok(Message::CancelOperation)) => self.cancelled = true,
            Some(Ok(other)) => {
                warn!(kind = %other.kind(), "Unexpected message during search");
                self.closed = true;
            }
            Some(Err(e)) => {
                warn!(error = %e, "Stream control failed");
                self.closed = true;
            }
            None => self.closed = true,
        }
    }
}

#[async_trait]
impl<'a> ResultsHandler for RemoteResultsHandler<'a> {
    async fn handle(&mut self, object: ConnectorObject) -> bool {
        // Pick up credits or a cancel that already arrived.
        while !self.stopped() {
            match self.framed.next().now_or_never() {
                Some(message) => self.apply(message),
                None => break,
            }
        }
        while !self.stopped() && self.credits == 0 {
            let message = self.framed.next().await;
            self.apply(message);
        }
        if self.stopped() {
            return false;
        }

        if let Err(e) = self
            .framed
            .send(Message::OperationResultChunk(Box::new(object)))
            .await
        {
            debug!(error = %e, "Failed to send search result");
            self.closed = true;
            return false;
        }
        self.credits -= 1;
        self.sent += 1;
        true
    }
}
