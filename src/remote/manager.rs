use super::client::SessionPool;
use super::facade::RemoteConnectorFacade;
use super::RemoteFrameworkConnectionInfo;
use crate::connector::{Configuration, ConnectorInfo, ConnectorKey};
use crate::error::{FrameworkError, Result};
use crate::facade::ConnectorFacade;
use crate::protocol::AuthAccepted;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::info;

/// Connector infos published by one connector server.
pub struct RemoteConnectorInfoManager {
    sessions: Arc<SessionPool>,
    infos: ArcSwap<Vec<ConnectorInfo>>,
}

impl RemoteConnectorInfoManager {
    /// Authenticates and fetches the server's connector list.
    ///
    /// A rejected shared secret fails with [`FrameworkError::Authentication`].
    pub async fn connect(info: RemoteFrameworkConnectionInfo) -> Result<Self> {
        let manager = Self {
            sessions: Arc::new(SessionPool::new(info)),
            infos: ArcSwap::from_pointee(Vec::new()),
        };
        manager.refresh().await?;
        Ok(manager)
    }

    /// Re-reads the connector list from the server.
    pub async fn refresh(&self) -> Result<()> {
        let mut session = self.sessions.acquire().await?;
        let result = session.list_connector_infos().await;
        self.sessions.release(session);
        let infos = result?;

        info!(
            server = %self.sessions.info().address(),
            connectors = infos.len(),
            "Fetched remote connector infos"
        );
        self.infos.store(Arc::new(infos));
        Ok(())
    }

    pub fn connection_info(&self) -> &RemoteFrameworkConnectionInfo {
        self.sessions.info()
    }

    pub fn connector_infos(&self) -> Vec<ConnectorInfo> {
        self.infos.load().as_ref().clone()
    }

    pub fn find_connector_info(&self, key: &ConnectorKey) -> Option<ConnectorInfo> {
        self.infos.load().iter().find(|info| info.key() == key).cloned()
    }

    /// Version, start time and session id from the latest handshake.
    pub fn server_info(&self) -> Option<Arc<AuthAccepted>> {
        self.sessions.last_handshake()
    }

    /// Checks the configuration against the published schema before any
    /// request reaches the server.
    pub fn create_connector_facade(
        &self,
        key: &ConnectorKey,
        configuration: Configuration,
    ) -> Result<Arc<dyn ConnectorFacade>> {
        let info = self
            .find_connector_info(key)
            .ok_or_else(|| FrameworkError::ConnectorNotFound(key.clone()))?;
        let configuration = info.configuration_schema().apply(configuration)?;
        Ok(Arc::new(RemoteConnectorFacade::new(
            info,
            configuration,
            self.sessions.clone(),
        )))
    }

    /// Closes idle sessions; facades already handed out reconnect on use.
    pub fn close(&self) {
        self.sessions.close_idle();
    }
}
