use super::RemoteFrameworkConnectionInfo;
use crate::connector::{ConnectorInfo, ResultsHandler, SearchResult};
use crate::error::{FrameworkError, ProtocolError, Result, TransportError};
use crate::pool::connector_pool::duration_ms;
use crate::protocol::{
    AuthAccepted, AuthRequest, InvokeRequest, Message, MessageCodec, OperationResponse,
    StreamCredit, PROTOCOL_VERSION,
};
use arc_swap::ArcSwapOption;
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

/// An authenticated connection to a connector server.
pub struct ClientSession {
    framed: Framed<TcpStream, MessageCodec>,
    server: AuthAccepted,
    broken: bool,
}

impl ClientSession {
    /// Connects and performs the `AUTH` handshake.
    pub async fn open(info: &RemoteFrameworkConnectionInfo) -> Result<Self> {
        let address = info.address();
        let stream = match timeout(info.connect_timeout, TcpStream::connect(&address)).await {
            Err(_) => {
                return Err(TransportError::Timeout {
                    operation: format!("connect to {address}"),
                    after_ms: duration_ms(info.connect_timeout),
                }
                .into())
            }
            Ok(Err(e)) => {
                return Err(TransportError::ConnectionFailed(format!("{address}: {e}")).into())
            }
            Ok(Ok(stream)) => stream,
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%address, error = %e, "Failed to set TCP_NODELAY");
        }

        let mut framed = Framed::new(stream, MessageCodec::new());
        framed
            .send(Message::Auth(AuthRequest {
                key: info.key.clone(),
                client_version: PROTOCOL_VERSION.to_string(),
            }))
            .await?;

        let reply = match timeout(info.connect_timeout, framed.next()).await {
            Err(_) => {
                return Err(TransportError::Timeout {
                    operation: format!("handshake with {address}"),
                    after_ms: duration_ms(info.connect_timeout),
                }
                .into())
            }
            Ok(None) => return Err(TransportError::Closed.into()),
            Ok(Some(reply)) => reply?,
        };

        match reply {
            Message::AuthOk(server) => {
                debug!(
                    %address,
                    session = %server.session_id,
                    "Authenticated with connector server"
                );
                Ok(Self {
                    framed,
                    server,
                    broken: false,
                })
            }
            Message::AuthFail(rejected) => {
                warn!(%address, reason = %rejected.message, "Connector server rejected handshake");
                Err(FrameworkError::Authentication(rejected.message))
            }
            other => Err(other.unexpected("AUTH_OK").into()),
        }
    }

    pub fn server(&self) -> &AuthAccepted {
        &self.server
    }

    /// Set once the connection can no longer be trusted to be in sync.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    async fn send(&mut self, message: Message) -> Result<()> {
        if let Err(e) = self.framed.send(message).await {
            self.broken = true;
            return Err(e.into());
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<Message> {
        match self.framed.next().await {
            Some(Ok(message)) => Ok(message),
            Some(Err(e)) => {
                self.broken = true;
                Err(e.into())
            }
            None => {
                self.broken = true;
                Err(TransportError::Closed.into())
            }
        }
    }

    fn violation(&mut self, error: ProtocolError) -> FrameworkError {
        self.broken = true;
        error.into()
    }

    pub async fn list_connector_infos(&mut self) -> Result<Vec<ConnectorInfo>> {
        self.send(Message::ListConnectorInfos).await?;
        match self.receive().await? {
            Message::ConnectorInfoList(infos) => Ok(infos),
            Message::OperationError(payload) => Err(payload.into()),
            other => Err(self.violation(other.unexpected("CONNECTOR_INFO_LIST"))),
        }
    }

    pub async fn invoke(&mut self, request: InvokeRequest) -> Result<OperationResponse> {
        self.send(Message::InvokeOperation(Box::new(request))).await?;
        match self.receive().await? {
            Message::OperationResult(response) => Ok(response),
            Message::OperationError(payload) => Err(payload.into()),
            other => Err(self.violation(other.unexpected("OPERATION_RESULT"))),
        }
    }

    /// Streams a search, granting one credit per accepted result and
    /// cancelling as soon as the handler declines.
    pub async fn search(
        &mut self,
        request: InvokeRequest,
        handler: &mut dyn ResultsHandler,
    ) -> Result<SearchResult> {
        self.send(Message::InvokeOperation(Box::new(request))).await?;
        let mut cancelled = false;

        loop {
            match self.receive().await? {
                Message::OperationResultChunk(object) => {
                    if cancelled {
                        continue;
                    }
                    if handler.handle(*object).await {
                        self.send(Message::StreamCredit(StreamCredit { credit: 1 }))
                            .await?;
                    } else {
                        cancelled = true;
                        self.send(Message::CancelOperation).await?;
                    }
                }
                Message::OperationResult(OperationResponse::Search { result }) => return Ok(result),
                Message::OperationResult(other) => {
                    let error = ProtocolError::UnexpectedMessage {
                        expected: "search result".to_string(),
                        actual: other.name().to_string(),
                    };
                    return Err(self.violation(error));
                }
                Message::OperationError(payload) => return Err(payload.into()),
                other => return Err(self.violation(other.unexpected("OPERATION_RESULT_CHUNK"))),
            }
        }
    }
}

/// Idle authenticated sessions to one server.
///
/// Sessions are handed out one caller at a time; broken sessions are dropped
/// on release instead of being reused.
pub struct SessionPool {
    info: RemoteFrameworkConnectionInfo,
    idle: Mutex<Vec<ClientSession>>,
    last_handshake: ArcSwapOption<AuthAccepted>,
}

impl SessionPool {
    pub fn new(info: RemoteFrameworkConnectionInfo) -> Self {
        Self {
            info,
            idle: Mutex::new(Vec::new()),
            last_handshake: ArcSwapOption::empty(),
        }
    }

    pub fn info(&self) -> &RemoteFrameworkConnectionInfo {
        &self.info
    }

    fn idle(&self) -> MutexGuard<'_, Vec<ClientSession>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn acquire(&self) -> Result<ClientSession> {
        let reused = self.idle().pop();
        if let Some(session) = reused {
            return Ok(session);
        }
        let session = ClientSession::open(&self.info).await?;
        self.last_handshake.store(Some(Arc::new(session.server().clone())));
        Ok(session)
    }

    pub fn release(&self, session: ClientSession) {
        if session.is_broken() {
            debug!(server = %self.info.address(), "Dropping broken session");
            return;
        }
        let mut idle = self.idle();
        if idle.len() < self.info.max_idle_sessions {
            idle.push(session);
        }
    }

    /// Handshake details from the most recently opened session.
    pub fn last_handshake(&self) -> Option<Arc<AuthAccepted>> {
        self.last_handshake.load_full()
    }

    pub fn idle_sessions(&self) -> usize {
        self.idle().len()
    }

    pub fn close_idle(&self) {
        self.idle().clear();
    }
}
