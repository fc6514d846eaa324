//! Interfaces implemented by connector plugins.
//!
//! A connector declares its operations by returning `Some` from the matching
//! `as_*` accessor instead of inheriting from a capability-specific base.

use super::configuration::{Configuration, ConfigurationSchema};
use super::info::Capability;
use super::objects::{
    AttributeSet, ConnectorObject, Filter, ObjectClass, OperationOptions, Schema, Script,
    SearchResult, Uid,
};
use crate::error::ConnectorResult;
use crate::security::GuardedSecret;
use async_trait::async_trait;
use std::collections::BTreeSet;

#[async_trait]
pub trait Connector: Send + Sync {
    async fn init(&mut self, configuration: Configuration) -> ConnectorResult<()>;

    /// Releases sockets, sessions and handles. Must tolerate repeated calls.
    async fn dispose(&mut self);

    fn configuration(&self) -> Option<&Configuration>;

    fn as_create(&self) -> Option<&dyn CreateOp> {
        None
    }

    fn as_update(&self) -> Option<&dyn UpdateOp> {
        None
    }

    fn as_delete(&self) -> Option<&dyn DeleteOp> {
        None
    }

    fn as_search(&self) -> Option<&dyn SearchOp> {
        None
    }

    fn as_authenticate(&self) -> Option<&dyn AuthenticateOp> {
        None
    }

    fn as_schema(&self) -> Option<&dyn SchemaOp> {
        None
    }

    fn as_test(&self) -> Option<&dyn TestOp> {
        None
    }

    fn as_script(&self) -> Option<&dyn ScriptOnConnectorOp> {
        None
    }

    /// Connectors that can cheaply verify their connection are pooled.
    fn as_poolable(&self) -> Option<&dyn PoolableConnector> {
        None
    }
}

#[async_trait]
pub trait CreateOp: Send + Sync {
    async fn create(
        &self,
        object_class: &ObjectClass,
        attributes: AttributeSet,
        options: &OperationOptions,
    ) -> ConnectorResult<Uid>;
}

#[async_trait]
pub trait UpdateOp: Send + Sync {
    async fn update(
        &self,
        object_class: &ObjectClass,
        uid: &Uid,
        attributes: AttributeSet,
        options: &OperationOptions,
    ) -> ConnectorResult<Uid>;
}

#[async_trait]
pub trait DeleteOp: Send + Sync {
    async fn delete(
        &self,
        object_class: &ObjectClass,
        uid: &Uid,
        options: &OperationOptions,
    ) -> ConnectorResult<()>;
}

#[async_trait]
pub trait SearchOp: Send + Sync {
    /// Delivers matches to `handler` until it returns `false` or results run out.
    /// A connector must stop reading from the target and release cursors as soon
    /// as the handler declines.
    async fn search(
        &self,
        object_class: &ObjectClass,
        filter: Option<&Filter>,
        handler: &mut dyn ResultsHandler,
        options: &OperationOptions,
    ) -> ConnectorResult<SearchResult>;
}

#[async_trait]
pub trait AuthenticateOp: Send + Sync {
    async fn authenticate(
        &self,
        object_class: &ObjectClass,
        username: &str,
        password: &GuardedSecret,
        options: &OperationOptions,
    ) -> ConnectorResult<Uid>;
}

#[async_trait]
pub trait SchemaOp: Send + Sync {
    async fn schema(&self) -> ConnectorResult<Schema>;
}

#[async_trait]
pub trait TestOp: Send + Sync {
    async fn test(&self) -> ConnectorResult<()>;
}

#[async_trait]
pub trait ScriptOnConnectorOp: Send + Sync {
    async fn run_script_on_connector(
        &self,
        script: &Script,
        options: &OperationOptions,
    ) -> ConnectorResult<serde_json::Value>;
}

#[async_trait]
pub trait PoolableConnector: Send + Sync {
    async fn check_alive(&self) -> ConnectorResult<()>;
}

/// Receives search results one at a time. Returning `false` stops the search.
#[async_trait]
pub trait ResultsHandler: Send {
    async fn handle(&mut self, object: ConnectorObject) -> bool;
}

/// Creates connector instances for one connector class.
pub trait ConnectorFactory: Send + Sync {
    fn capabilities(&self) -> BTreeSet<Capability>;

    fn configuration_schema(&self) -> ConfigurationSchema;

    /// Connector-specific checks beyond the schema, run without an instance.
    fn validate(&self, _configuration: &Configuration) -> ConnectorResult<()> {
        Ok(())
    }

    fn create(&self) -> Box<dyn Connector>;
}
