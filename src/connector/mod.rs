pub mod configuration;
pub mod info;
pub mod key;
pub mod objects;
pub mod spi;

pub use configuration::{
    ConfigValue, Configuration, ConfigurationSchema, PropertySpec, PropertyType,
};
pub use info::{Capability, ConnectorInfo};
pub use key::ConnectorKey;
pub use objects::{
    AttributeInfo, AttributeSet, AttributeType, AttributeValue, ConnectorObject, Filter,
    ObjectClass, ObjectClassInfo, OperationOptions, Schema, Script, SearchResult, Uid,
};
pub use spi::{
    AuthenticateOp, Connector, ConnectorFactory, CreateOp, DeleteOp, PoolableConnector,
    ResultsHandler, SchemaOp, ScriptOnConnectorOp, SearchOp, TestOp, UpdateOp,
};
