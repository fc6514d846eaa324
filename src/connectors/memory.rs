use crate::connector::{
    AttributeInfo, AttributeSet, AttributeType, AttributeValue, AuthenticateOp, Capability,
    Configuration, ConfigurationSchema, Connector, ConnectorFactory, ConnectorObject, CreateOp,
    DeleteOp, Filter, ObjectClass, ObjectClassInfo, OperationOptions, PoolableConnector,
    PropertySpec, PropertyType, ResultsHandler, Schema, SchemaOp, SearchOp, SearchResult, TestOp,
    Uid, UpdateOp,
};
use crate::error::{ConnectorError, ConnectorResult};
use crate::security::GuardedSecret;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub const MEMORY_CONNECTOR_CLASS: &str = "MemoryConnector";

const DEFAULT_REALM: &str = "default";

type Objects = BTreeMap<Uid, ConnectorObject>;

/// Connector keeping objects in process memory, partitioned by `realm`.
///
/// All instances created by one factory share the same store.
#[derive(Clone, Default)]
pub struct MemoryConnectorFactory {
    store: Arc<DashMap<(String, ObjectClass), Objects>>,
}

impl MemoryConnectorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects across all realms.
    pub fn object_count(&self) -> usize {
        self.store.iter().map(|entry| entry.value().len()).sum()
    }
}

impl ConnectorFactory for MemoryConnectorFactory {
    fn capabilities(&self) -> BTreeSet<Capability> {
        [
            Capability::Create,
            Capability::Update,
            Capability::Delete,
            Capability::Search,
            Capability::Authenticate,
            Capability::Schema,
            Capability::Test,
            Capability::Pooling,
        ]
        .into_iter()
        .collect()
    }

    fn configuration_schema(&self) -> ConfigurationSchema {
        ConfigurationSchema::new(vec![PropertySpec::new("realm", PropertyType::String)
            .with_default(DEFAULT_REALM)
            .with_help("Partition of the in-memory store used by this configuration")])
    }

    fn validate(&self, configuration: &Configuration) -> ConnectorResult<()> {
        match configuration.get_string("realm") {
            Some(realm) if realm.trim().is_empty() => Err(ConnectorError::InvalidConfiguration {
                message: "realm must not be blank".to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn create(&self) -> Box<dyn Connector> {
        Box::new(MemoryConnector {
            store: self.store.clone(),
            configuration: None,
            realm: DEFAULT_REALM.to_string(),
        })
    }
}

pub struct MemoryConnector {
    store: Arc<DashMap<(String, ObjectClass), Objects>>,
    configuration: Option<Configuration>,
    realm: String,
}

impl MemoryConnector {
    fn partition(&self, object_class: &ObjectClass) -> (String, ObjectClass) {
        (self.realm.clone(), object_class.clone())
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn init(&mut self, configuration: Configuration) -> ConnectorResult<()> {
        self.realm = configuration
            .get_string("realm")
            .unwrap_or(DEFAULT_REALM)
            .to_string();
        debug!(realm = %self.realm, "Memory connector initialised");
        self.configuration = Some(configuration);
        Ok(())
    }

    async fn dispose(&mut self) {
        self.configuration = None;
    }

    fn configuration(&self) -> Option<&Configuration> {
        self.configuration.as_ref()
    }

    fn as_create(&self) -> Option<&dyn CreateOp> {
        Some(self)
    }

    fn as_update(&self) -> Option<&dyn UpdateOp> {
        Some(self)
    }

    fn as_delete(&self) -> Option<&dyn DeleteOp> {
        Some(self)
    }

    fn as_search(&self) -> Option<&dyn SearchOp> {
        Some(self)
    }

    fn as_authenticate(&self) -> Option<&dyn AuthenticateOp> {
        Some(self)
    }

    fn as_schema(&self) -> Option<&dyn SchemaOp> {
        Some(self)
    }

    fn as_test(&self) -> Option<&dyn TestOp> {
        Some(self)
    }

    fn as_poolable(&self) -> Option<&dyn PoolableConnector> {
        Some(self)
    }
}

fn name_of(attributes: &AttributeSet) -> ConnectorResult<Option<String>> {
    match attributes.get(AttributeSet::NAME_ATTRIBUTE) {
        None => Ok(None),
        Some([AttributeValue::String(name)]) if !name.is_empty() => Ok(Some(name.clone())),
        Some(_) => Err(ConnectorError::InvalidConfiguration {
            message: format!("{} must be a single non-empty string", AttributeSet::NAME_ATTRIBUTE),
        }),
    }
}

fn name_taken(objects: &Objects, name: &str, except: Option<&Uid>) -> bool {
    objects
        .values()
        .any(|o| o.name.as_deref() == Some(name) && Some(&o.uid) != except)
}

#[async_trait]
impl CreateOp for MemoryConnector {
    async fn create(
        &self,
        object_class: &ObjectClass,
        mut attributes: AttributeSet,
        _options: &OperationOptions,
    ) -> ConnectorResult<Uid> {
        let name = name_of(&attributes)?.ok_or_else(|| ConnectorError::InvalidConfiguration {
            message: format!("{} is required", AttributeSet::NAME_ATTRIBUTE),
        })?;
        attributes.remove(AttributeSet::NAME_ATTRIBUTE);

        let mut objects = self.store.entry(self.partition(object_class)).or_default();
        if name_taken(&objects, &name, None) {
            return Err(ConnectorError::AlreadyExists { uid: name });
        }

        let uid = Uid::new(Uuid::new_v4().to_string());
        let object = ConnectorObject::new(object_class.clone(), uid.clone())
            .with_name(name)
            .with_attributes(attributes);
        objects.insert(uid.clone(), object);
        Ok(uid)
    }
}

#[async_trait]
impl UpdateOp for MemoryConnector {
    async fn update(
        &self,
        object_class: &ObjectClass,
        uid: &Uid,
        mut attributes: AttributeSet,
        _options: &OperationOptions,
    ) -> ConnectorResult<Uid> {
        let rename = name_of(&attributes)?;
        attributes.remove(AttributeSet::NAME_ATTRIBUTE);

        let unknown = || ConnectorError::UnknownUid {
            uid: uid.to_string(),
        };
        let mut objects = self
            .store
            .get_mut(&self.partition(object_class))
            .ok_or_else(unknown)?;
        if let Some(name) = &rename {
            if name_taken(&objects, name, Some(uid)) {
                return Err(ConnectorError::AlreadyExists { uid: name.clone() });
            }
        }

        let object = objects.get_mut(uid).ok_or_else(unknown)?;
        if rename.is_some() {
            object.name = rename;
        }
        object.attributes.merge(attributes);
        Ok(uid.clone())
    }
}

#[async_trait]
impl DeleteOp for MemoryConnector {
    async fn delete(
        &self,
        object_class: &ObjectClass,
        uid: &Uid,
        _options: &OperationOptions,
    ) -> ConnectorResult<()> {
        let removed = self
            .store
            .get_mut(&self.partition(object_class))
            .and_then(|mut objects| objects.remove(uid));
        match removed {
            Some(_) => Ok(()),
            None => Err(ConnectorError::UnknownUid {
                uid: uid.to_string(),
            }),
        }
    }
}

fn attribute_values(object: &ConnectorObject, attribute: &str) -> Vec<AttributeValue> {
    match attribute {
        Filter::UID_ATTRIBUTE => vec![AttributeValue::String(object.uid.to_string())],
        AttributeSet::NAME_ATTRIBUTE => object
            .name
            .iter()
            .map(|name| AttributeValue::String(name.clone()))
            .collect(),
        other => object.attributes.get(other).map(<[_]>::to_vec).unwrap_or_default(),
    }
}

fn value_matches(candidate: &AttributeValue, expected: &Value) -> bool {
    match candidate {
        AttributeValue::String(value) => expected.as_str() == Some(value.as_str()),
        AttributeValue::Integer(value) => expected.as_i64() == Some(*value),
        AttributeValue::Boolean(value) => expected.as_bool() == Some(*value),
        AttributeValue::Secret(_) => false,
    }
}

fn matches(filter: &Filter, object: &ConnectorObject) -> bool {
    match filter {
        Filter::Equals { attribute, value } => attribute_values(object, attribute)
            .iter()
            .any(|candidate| value_matches(candidate, value)),
        Filter::StartsWith { attribute, value } => attribute_values(object, attribute)
            .iter()
            .any(|candidate| candidate.as_str().is_some_and(|s| s.starts_with(value.as_str()))),
        Filter::And { filters } => filters.iter().all(|f| matches(f, object)),
        Filter::Or { filters } => filters.iter().any(|f| matches(f, object)),
        Filter::Not { filter } => !matches(filter, object),
    }
}

/// Strips secrets and applies `attributes_to_get`.
fn project(object: &ConnectorObject, options: &OperationOptions) -> ConnectorObject {
    let mut attributes = AttributeSet::new();
    for (name, values) in object.attributes.iter() {
        if let Some(wanted) = &options.attributes_to_get {
            if !wanted.iter().any(|w| w == name) {
                continue;
            }
        }
        for value in values {
            if !matches!(value, AttributeValue::Secret(_)) {
                attributes = attributes.with(name, value.clone());
            }
        }
    }
    ConnectorObject {
        object_class: object.object_class.clone(),
        uid: object.uid.clone(),
        name: object.name.clone(),
        attributes,
    }
}

#[async_trait]
impl SearchOp for MemoryConnector {
    async fn search(
        &self,
        object_class: &ObjectClass,
        filter: Option<&Filter>,
        handler: &mut dyn ResultsHandler,
        options: &OperationOptions,
    ) -> ConnectorResult<SearchResult> {
        let partition = self.partition(object_class);
        let mut candidates: Vec<ConnectorObject> = match self.store.get(&partition) {
            Some(objects) => objects
                .values()
                .filter(|o| filter.map_or(true, |f| matches(f, o)))
                .filter(|o| {
                    options
                        .paged_results_cookie
                        .as_deref()
                        .map_or(true, |cookie| o.uid.as_str() > cookie)
                })
                .map(|o| project(o, options))
                .collect(),
            None => Vec::new(),
        };

        let remaining = match options.page_size.map(|n| n as usize) {
            Some(size) if size > 0 && candidates.len() > size => candidates.split_off(size).len(),
            _ => 0,
        };
        let cookie = candidates
            .last()
            .filter(|_| remaining > 0)
            .map(|o| o.uid.to_string());

        for object in candidates {
            if !handler.handle(object).await {
                return Ok(SearchResult {
                    all_results_returned: false,
                    ..SearchResult::default()
                });
            }
        }

        Ok(SearchResult {
            paged_results_cookie: cookie,
            remaining_paged_results: Some(remaining as i64),
            all_results_returned: remaining == 0,
        })
    }
}

#[async_trait]
impl AuthenticateOp for MemoryConnector {
    async fn authenticate(
        &self,
        object_class: &ObjectClass,
        username: &str,
        password: &GuardedSecret,
        _options: &OperationOptions,
    ) -> ConnectorResult<Uid> {
        let rejected = || ConnectorError::InvalidCredentials {
            message: format!("authentication failed for {username}"),
        };

        let (uid, stored) = {
            let objects = self
                .store
                .get(&self.partition(object_class))
                .ok_or_else(rejected)?;
            let object = objects
                .values()
                .find(|o| o.name.as_deref() == Some(username))
                .ok_or_else(rejected)?;
            let stored = match object.attributes.get(AttributeSet::PASSWORD_ATTRIBUTE) {
                Some([AttributeValue::Secret(secret)]) => secret.clone(),
                _ => return Err(rejected()),
            };
            (object.uid.clone(), stored)
        };

        match stored.secure_eq(password) {
            Ok(true) => Ok(uid),
            Ok(false) => Err(rejected()),
            Err(e) => Err(ConnectorError::OperationFailed {
                message: e.to_string(),
                code: None,
            }),
        }
    }
}

#[async_trait]
impl SchemaOp for MemoryConnector {
    async fn schema(&self) -> ConnectorResult<Schema> {
        let name = AttributeInfo {
            name: AttributeSet::NAME_ATTRIBUTE.to_string(),
            attribute_type: AttributeType::String,
            required: true,
            multi_valued: false,
        };
        let password = AttributeInfo {
            name: AttributeSet::PASSWORD_ATTRIBUTE.to_string(),
            attribute_type: AttributeType::Secret,
            required: false,
            multi_valued: false,
        };
        Ok(Schema {
            object_classes: vec![
                ObjectClassInfo {
                    object_class: ObjectClass::account(),
                    attributes: vec![name.clone(), password],
                },
                ObjectClassInfo {
                    object_class: ObjectClass::group(),
                    attributes: vec![name],
                },
            ],
        })
    }
}

#[async_trait]
impl TestOp for MemoryConnector {
    async fn test(&self) -> ConnectorResult<()> {
        if self.configuration.is_none() {
            return Err(ConnectorError::InvalidConfiguration {
                message: "connector is not initialised".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PoolableConnector for MemoryConnector {
    async fn check_alive(&self) -> ConnectorResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::ResultsCollector;

    async fn connector(factory: &MemoryConnectorFactory, realm: &str) -> Box<dyn Connector> {
        let mut connector = factory.create();
        connector
            .init(Configuration::new().with("realm", realm))
            .await
            .unwrap();
        connector
    }

    fn account(name: &str) -> AttributeSet {
        AttributeSet::new()
            .with(AttributeSet::NAME_ATTRIBUTE, name)
            .with("mail", format!("{name}@example.com"))
            .with("active", true)
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let factory = MemoryConnectorFactory::new();
        let connector = connector(&factory, "crud").await;
        let options = OperationOptions::default();
        let create = connector.as_create().unwrap();

        let uid = create
            .create(&ObjectClass::account(), account("alice"), &options)
            .await
            .unwrap();
        let duplicate = create
            .create(&ObjectClass::account(), account("alice"), &options)
            .await;
        assert!(matches!(duplicate, Err(ConnectorError::AlreadyExists { .. })));

        connector
            .as_update()
            .unwrap()
            .update(
                &ObjectClass::account(),
                &uid,
                AttributeSet::new().with("mail", "a@example.org"),
                &options,
            )
            .await
            .unwrap();

        let mut collector = ResultsCollector::new();
        connector
            .as_search()
            .unwrap()
            .search(&ObjectClass::account(), Some(&Filter::uid(&uid)), &mut collector, &options)
            .await
            .unwrap();
        assert_eq!(collector.objects()[0].attributes.get_str("mail"), Some("a@example.org"));

        let delete = connector.as_delete().unwrap();
        delete.delete(&ObjectClass::account(), &uid, &options).await.unwrap();
        assert!(matches!(
            delete.delete(&ObjectClass::account(), &uid, &options).await,
            Err(ConnectorError::UnknownUid { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_of_unknown_uid_leaves_store_untouched() {
        let factory = MemoryConnectorFactory::new();
        let connector = connector(&factory, "sparse").await;

        let result = connector
            .as_update()
            .unwrap()
            .update(
                &ObjectClass::group(),
                &Uid::new("ghost"),
                AttributeSet::new().with("description", "nobody"),
                &OperationOptions::default(),
            )
            .await;
        assert!(matches!(result, Err(ConnectorError::UnknownUid { .. })));
        assert!(factory.store.is_empty());
    }

    #[tokio::test]
    async fn test_realms_are_isolated() {
        let factory = MemoryConnectorFactory::new();
        let first = connector(&factory, "one").await;
        let second = connector(&factory, "two").await;
        let options = OperationOptions::default();

        first
            .as_create()
            .unwrap()
            .create(&ObjectClass::account(), account("bob"), &options)
            .await
            .unwrap();

        let mut collector = ResultsCollector::new();
        second
            .as_search()
            .unwrap()
            .search(&ObjectClass::account(), None, &mut collector, &options)
            .await
            .unwrap();
        assert!(collector.objects().is_empty());
        assert_eq!(factory.object_count(), 1);
    }

    #[tokio::test]
    async fn test_filters_and_paging() {
        let factory = MemoryConnectorFactory::new();
        let connector = connector(&factory, "paging").await;
        let options = OperationOptions::default();
        for name in ["ann", "andy", "bea", "amir"] {
            connector
                .as_create()
                .unwrap()
                .create(&ObjectClass::account(), account(name), &options)
                .await
                .unwrap();
        }
        let search = connector.as_search().unwrap();

        let starts_with_a = Filter::StartsWith {
            attribute: AttributeSet::NAME_ATTRIBUTE.to_string(),
            value: "a".to_string(),
        };
        let mut collector = ResultsCollector::new();
        search
            .search(&ObjectClass::account(), Some(&starts_with_a), &mut collector, &options)
            .await
            .unwrap();
        assert_eq!(collector.objects().len(), 3);

        let not_ann = Filter::And {
            filters: vec![
                starts_with_a.clone(),
                Filter::Not {
                    filter: Box::new(Filter::equals(AttributeSet::NAME_ATTRIBUTE, "ann")),
                },
            ],
        };
        let mut collector = ResultsCollector::new();
        search
            .search(&ObjectClass::account(), Some(&not_ann), &mut collector, &options)
            .await
            .unwrap();
        assert_eq!(collector.objects().len(), 2);

        let mut seen = Vec::new();
        let mut paging = OperationOptions {
            page_size: Some(3),
            ..OperationOptions::default()
        };
        loop {
            let mut collector = ResultsCollector::new();
            let result = search
                .search(&ObjectClass::account(), None, &mut collector, &paging)
                .await
                .unwrap();
            seen.extend(collector.into_objects().into_iter().map(|o| o.uid));
            match result.paged_results_cookie {
                Some(cookie) => paging.paged_results_cookie = Some(cookie),
                None => {
                    assert!(result.all_results_returned);
                    break;
                }
            }
        }
        assert_eq!(seen.len(), 4);
        let unique: BTreeSet<_> = seen.iter().collect();
        assert_eq!(unique.len(), 4);
    }

    #[tokio::test]
    async fn test_authenticate_and_secret_stripping() {
        let factory = MemoryConnectorFactory::new();
        let connector = connector(&factory, "auth").await;
        let options = OperationOptions::default();
        let password = GuardedSecret::from_string("s3cret".to_string()).unwrap();

        let uid = connector
            .as_create()
            .unwrap()
            .create(
                &ObjectClass::account(),
                account("carol").with(AttributeSet::PASSWORD_ATTRIBUTE, password.clone()),
                &options,
            )
            .await
            .unwrap();

        let authenticate = connector.as_authenticate().unwrap();
        let authenticated = authenticate
            .authenticate(&ObjectClass::account(), "carol", &password, &options)
            .await
            .unwrap();
        assert_eq!(authenticated, uid);

        let wrong = GuardedSecret::from_string("guess".to_string()).unwrap();
        assert!(matches!(
            authenticate
                .authenticate(&ObjectClass::account(), "carol", &wrong, &options)
                .await,
            Err(ConnectorError::InvalidCredentials { .. })
        ));

        let mut collector = ResultsCollector::new();
        connector
            .as_search()
            .unwrap()
            .search(&ObjectClass::account(), None, &mut collector, &options)
            .await
            .unwrap();
        assert!(collector.objects()[0]
            .attributes
            .get(AttributeSet::PASSWORD_ATTRIBUTE)
            .is_none());
    }
}
