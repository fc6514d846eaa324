//! Uniform operation API over local and remote connectors.

pub mod local;
pub mod stream;

pub use local::LocalConnectorFacade;
pub use stream::{search_stream, SearchStream};

use crate::connector::{
    AttributeSet, ConnectorKey, ConnectorObject, Filter, ObjectClass, OperationOptions,
    ResultsHandler, Schema, Script, SearchResult, Uid,
};
use crate::error::Result;
use crate::security::GuardedSecret;
use async_trait::async_trait;

/// Handle through which operations on one configured connector are invoked.
///
/// Callers see the same behaviour whether the connector runs in this process or
/// behind a connector server.
#[async_trait]
pub trait ConnectorFacade: Send + Sync {
    fn connector_key(&self) -> &ConnectorKey;

    /// Checks the configuration without creating a connector instance.
    async fn validate(&self) -> Result<()>;

    async fn test(&self) -> Result<()>;

    async fn schema(&self) -> Result<Schema>;

    async fn create(
        &self,
        object_class: &ObjectClass,
        attributes: AttributeSet,
        options: &OperationOptions,
    ) -> Result<Uid>;

    async fn update(
        &self,
        object_class: &ObjectClass,
        uid: &Uid,
        attributes: AttributeSet,
        options: &OperationOptions,
    ) -> Result<Uid>;

    async fn delete(
        &self,
        object_class: &ObjectClass,
        uid: &Uid,
        options: &OperationOptions,
    ) -> Result<()>;

    async fn authenticate(
        &self,
        object_class: &ObjectClass,
        username: &str,
        password: &GuardedSecret,
        options: &OperationOptions,
    ) -> Result<Uid>;

    async fn search(
        &self,
        object_class: &ObjectClass,
        filter: Option<&Filter>,
        handler: &mut dyn ResultsHandler,
        options: &OperationOptions,
    ) -> Result<SearchResult>;

    async fn run_script_on_connector(
        &self,
        script: &Script,
        options: &OperationOptions,
    ) -> Result<serde_json::Value>;

    async fn get_object(
        &self,
        object_class: &ObjectClass,
        uid: &Uid,
        options: &OperationOptions,
    ) -> Result<Option<ConnectorObject>> {
        let mut collector = ResultsCollector::with_limit(1);
        let filter = Filter::uid(uid);
        self.search(object_class, Some(&filter), &mut collector, options)
            .await?;
        Ok(collector.into_objects().into_iter().next())
    }
}

/// Collects search results, optionally stopping after `limit` objects.
#[derive(Debug, Default)]
pub struct ResultsCollector {
    objects: Vec<ConnectorObject>,
    limit: Option<usize>,
}

impl ResultsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            objects: Vec::new(),
            limit: Some(limit),
        }
    }

    pub fn objects(&self) -> &[ConnectorObject] {
        &self.objects
    }

    pub fn into_objects(self) -> Vec<ConnectorObject> {
        self.objects
    }
}

#[async_trait]
impl ResultsHandler for ResultsCollector {
    async fn handle(&mut self, object: ConnectorObject) -> bool {
        self.objects.push(object);
        self.limit.map_or(true, |limit| self.objects.len() < limit)
    }
}
