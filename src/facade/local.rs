use super::ConnectorFacade;
use crate::connector::{
    AttributeSet, Capability, Configuration, ConnectorFactory, ConnectorInfo, ConnectorKey,
    Filter, ObjectClass, OperationOptions, ResultsHandler, Schema, Script, SearchResult, Uid,
};
use crate::error::{ConnectorError, ConnectorResult, Result, TransportError};
use crate::pool::connector_pool::duration_ms;
use crate::pool::{ConnectorPool, PooledConnector, ReleaseOutcome};
use crate::script::{Bindings, ScriptExecutorRegistry};
use crate::security::GuardedSecret;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Runs operations in-process on instances checked out of a connector pool.
pub struct LocalConnectorFacade {
    info: ConnectorInfo,
    factory: Arc<dyn ConnectorFactory>,
    pool: Arc<ConnectorPool>,
    configuration: Configuration,
    operation_timeout: Option<Duration>,
    scripts: &'static ScriptExecutorRegistry,
}

impl LocalConnectorFacade {
    pub fn new(
        info: ConnectorInfo,
        factory: Arc<dyn ConnectorFactory>,
        pool: Arc<ConnectorPool>,
        configuration: Configuration,
        operation_timeout: Option<Duration>,
    ) -> Self {
        Self {
            info,
            factory,
            pool,
            configuration,
            operation_timeout,
            scripts: ScriptExecutorRegistry::global(),
        }
    }

    pub fn info(&self) -> &ConnectorInfo {
        &self.info
    }

    pub fn pool(&self) -> &Arc<ConnectorPool> {
        &self.pool
    }

    async fn checkout(&self, operation: &str) -> Result<PooledConnector> {
        debug!(connector = %self.info.key(), operation, "Checking out connector");
        self.pool.checkout().await
    }

    async fn bounded<T: Send>(
        &self,
        operation: &str,
        call: impl Future<Output = ConnectorResult<T>> + Send,
    ) -> Result<T> {
        let Some(limit) = self.operation_timeout else {
            return call.await.map_err(Into::into);
        };
        match timeout(limit, call).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => {
                warn!(connector = %self.info.key(), operation, "Connector operation timed out");
                Err(TransportError::Timeout {
                    operation: operation.to_string(),
                    after_ms: duration_ms(limit),
                }
                .into())
            }
        }
    }

    /// Returns the lease to the pool; connectivity failures discard the instance.
    async fn finish<T>(&self, lease: PooledConnector, result: Result<T>) -> Result<T> {
        let outcome = match &result {
            Err(e) if e.is_connectivity() => ReleaseOutcome::Broken,
            _ => ReleaseOutcome::Healthy,
        };
        lease.release(outcome).await;
        result
    }

    fn script_bindings(&self, script: &Script, options: &OperationOptions) -> Result<Bindings> {
        let mut bindings: Bindings = script.arguments.clone();
        bindings.insert(
            "configuration".to_string(),
            self.configuration.public_properties(),
        );
        bindings.insert("options".to_string(), serde_json::to_value(options)?);
        Ok(bindings)
    }
}

fn unsupported<T>(operation: &str) -> Result<T> {
    Err(ConnectorError::unsupported(operation).into())
}

#[async_trait]
impl ConnectorFacade for LocalConnectorFacade {
    fn connector_key(&self) -> &ConnectorKey {
        self.info.key()
    }

    async fn validate(&self) -> Result<()> {
        let configuration = self
            .info
            .configuration_schema()
            .apply(self.configuration.clone())?;
        self.factory.validate(&configuration)?;
        Ok(())
    }

    async fn test(&self) -> Result<()> {
        let lease = self.checkout("test").await?;
        let result = match lease.as_test() {
            Some(op) => self.bounded("test", op.test()).await,
            None => unsupported("test"),
        };
        self.finish(lease, result).await
    }

    async fn schema(&self) -> Result<Schema> {
        let lease = self.checkout("schema").await?;
        let result = match lease.as_schema() {
            Some(op) => self.bounded("schema", op.schema()).await,
            None => unsupported("schema"),
        };
        self.finish(lease, result).await
    }

    async fn create(
        &self,
        object_class: &ObjectClass,
        attributes: AttributeSet,
        options: &OperationOptions,
    ) -> Result<Uid> {
        let lease = self.checkout("create").await?;
        let result = match lease.as_create() {
            Some(op) => {
                self.bounded("create", op.create(object_class, attributes, options))
                    .await
            }
            None => unsupported("create"),
        };
        self.finish(lease, result).await
    }

    async fn update(
        &self,
        object_class: &ObjectClass,
        uid: &Uid,
        attributes: AttributeSet,
        options: &OperationOptions,
    ) -> Result<Uid> {
        let lease = self.checkout("update").await?;
        let result = match lease.as_update() {
            Some(op) => {
                self.bounded("update", op.update(object_class, uid, attributes, options))
                    .await
            }
            None => unsupported("update"),
        };
        self.finish(lease, result).await
    }

    async fn delete(
        &self,
        object_class: &ObjectClass,
        uid: &Uid,
        options: &OperationOptions,
    ) -> Result<()> {
        let lease = self.checkout("delete").await?;
        let result = match lease.as_delete() {
            Some(op) => {
                self.bounded("delete", op.delete(object_class, uid, options))
                    .await
            }
            None => unsupported("delete"),
        };
        self.finish(lease, result).await
    }

    async fn authenticate(
        &self,
        object_class: &ObjectClass,
        username: &str,
        password: &GuardedSecret,
        options: &OperationOptions,
    ) -> Result<Uid> {
        let lease = self.checkout("authenticate").await?;
        let result = match lease.as_authenticate() {
            Some(op) => {
                self.bounded(
                    "authenticate",
                    op.authenticate(object_class, username, password, options),
                )
                .await
            }
            None => unsupported("authenticate"),
        };
        self.finish(lease, result).await
    }

    /// Not bounded by the operation timeout; the handler controls duration.
    async fn search(
        &self,
        object_class: &ObjectClass,
        filter: Option<&Filter>,
        handler: &mut dyn ResultsHandler,
        options: &OperationOptions,
    ) -> Result<SearchResult> {
        let lease = self.checkout("search").await?;
        let result: Result<SearchResult> = match lease.as_search() {
            Some(op) => op
                .search(object_class, filter, handler, options)
                .await
                .map_err(Into::into),
            None => unsupported("search"),
        };
        self.finish(lease, result).await
    }

    async fn run_script_on_connector(
        &self,
        script: &Script,
        options: &OperationOptions,
    ) -> Result<serde_json::Value> {
        if self.info.supports(Capability::ScriptOnConnector) {
            let lease = self.checkout("run_script_on_connector").await?;
            let result = match lease.as_script() {
                Some(op) => {
                    self.bounded(
                        "run_script_on_connector",
                        op.run_script_on_connector(script, options),
                    )
                    .await
                }
                None => unsupported("run_script_on_connector"),
            };
            return self.finish(lease, result).await;
        }

        debug!(
            connector = %self.info.key(),
            language = %script.language,
            "Running script through executor registry"
        );
        let executor = self.scripts.new_instance(&script.language)?;
        let bindings = self.script_bindings(script, options)?;
        Ok(executor.execute(&script.text, &bindings)?)
    }
}
