mod common;

use async_trait::async_trait;
use common::*;
use connector_host::connector::{
    AttributeSet, Configuration, ConnectorObject, ObjectClass, OperationOptions, ResultsHandler,
};
use connector_host::error::{ConfigError, ConnectorError, FrameworkError};
use connector_host::facade::{ConnectorFacade, ResultsCollector};
use connector_host::pool::PoolConfig;
use connector_host::remote::RemoteConnectorInfoManager;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Accepts results until it has seen `stop_after` of them.
struct StopAfter {
    stop_after: usize,
    seen: Vec<String>,
}

#[async_trait]
impl ResultsHandler for StopAfter {
    async fn handle(&mut self, object: ConnectorObject) -> bool {
        self.seen.push(object.uid.as_str().to_string());
        self.seen.len() < self.stop_after
    }
}

#[tokio::test]
async fn test_remote_results_match_local() {
    let server = TestServer::start(manager(CountingConnectorFactory::new())).await;
    let local = manager(CountingConnectorFactory::new());

    let remote = RemoteConnectorInfoManager::connect(server.connection_info(SHARED_SECRET))
        .await
        .unwrap();
    let infos = remote.connector_infos();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].key(), &counting_key());
    assert_eq!(infos[0].display_name(), "Counting connector");
    assert!(remote.server_info().is_some());

    let remote_facade = remote
        .create_connector_facade(&counting_key(), configuration())
        .unwrap();
    let local_facade = local
        .create_connector_facade(&counting_key(), configuration())
        .unwrap();

    let attributes = AttributeSet::new().with(AttributeSet::NAME_ATTRIBUTE, "alice");
    let options = OperationOptions::default();
    let remote_uid = remote_facade
        .create(&ObjectClass::account(), attributes.clone(), &options)
        .await
        .unwrap();
    let local_uid = local_facade
        .create(&ObjectClass::account(), attributes, &options)
        .await
        .unwrap();
    assert_eq!(remote_uid, local_uid);

    let mut remote_results = ResultsCollector::new();
    let remote_summary = remote_facade
        .search(&ObjectClass::account(), None, &mut remote_results, &options)
        .await
        .unwrap();
    let mut local_results = ResultsCollector::new();
    let local_summary = local_facade
        .search(&ObjectClass::account(), None, &mut local_results, &options)
        .await
        .unwrap();
    assert_eq!(remote_summary, local_summary);
    let uids = |c: &ResultsCollector| c.objects().iter().map(|o| o.uid.clone()).collect::<Vec<_>>();
    assert_eq!(uids(&remote_results), uids(&local_results));
    assert_eq!(remote_results.objects().len(), 5);

    remote_facade.test().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_wrong_secret_is_rejected() {
    let server = TestServer::start(manager(CountingConnectorFactory::new())).await;

    let result =
        RemoteConnectorInfoManager::connect(server.connection_info("not-the-secret")).await;
    match result {
        Err(FrameworkError::Authentication(_)) => {}
        Err(other) => panic!("expected authentication failure, got {other}"),
        Ok(_) => panic!("connection with a wrong secret succeeded"),
    }
    assert!(server
        .render_metrics()
        .contains("connector_server_auth_failures_total 1"));
    server.stop().await;
}

#[tokio::test]
async fn test_pool_exhaustion_is_counted_by_the_server() {
    let factory = CountingConnectorFactory::new().holding(Duration::from_millis(800));
    let pool = PoolConfig {
        max_objects: 1,
        max_idle: 1,
        min_idle: 0,
        max_wait: Duration::from_millis(100),
        ..PoolConfig::default()
    };
    let server = TestServer::start(manager_with(factory, pool)).await;
    let remote = RemoteConnectorInfoManager::connect(server.connection_info(SHARED_SECRET))
        .await
        .unwrap();
    let facade = remote
        .create_connector_facade(&counting_key(), configuration())
        .unwrap();

    let holder = {
        let facade = facade.clone();
        tokio::spawn(async move { facade.test().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let err = facade.test().await.unwrap_err();
    assert!(err.is_retryable());
    holder.await.unwrap().unwrap();

    let metrics = server.render_metrics();
    assert!(metrics.contains("connector_server_pool_exhaustions_total 1"));
    assert!(metrics.contains("connector_server_operations_failed_total{operation=\"test\"} 1"));
    server.stop().await;
}

#[tokio::test]
async fn test_metrics_endpoint_serves_text_format() {
    let server = TestServer::start_with_metrics(manager(CountingConnectorFactory::new())).await;
    let remote = RemoteConnectorInfoManager::connect(server.connection_info(SHARED_SECRET))
        .await
        .unwrap();
    remote
        .create_connector_facade(&counting_key(), configuration())
        .unwrap()
        .test()
        .await
        .unwrap();

    let metrics_addr = server.metrics_addr.expect("metrics endpoint is bound");
    let mut stream = TcpStream::connect(metrics_addr).await.unwrap();
    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("connector_server_operations_total{operation=\"test\"} 1"));
    assert!(response.contains("connector_server_pool_idle 1"));
    server.stop().await;
}

#[tokio::test]
async fn test_connector_errors_cross_the_wire_intact() {
    let server = TestServer::start(manager(CountingConnectorFactory::new())).await;
    let remote = RemoteConnectorInfoManager::connect(server.connection_info(SHARED_SECRET))
        .await
        .unwrap();
    let facade = remote
        .create_connector_facade(&counting_key(), configuration())
        .unwrap();

    let taken = facade
        .create(
            &ObjectClass::account(),
            AttributeSet::new().with(AttributeSet::NAME_ATTRIBUTE, "taken-bob"),
            &OperationOptions::default(),
        )
        .await;
    match taken {
        Err(FrameworkError::Connector(ConnectorError::AlreadyExists { uid })) => {
            assert_eq!(uid, "taken-bob")
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let unnamed = facade
        .create(&ObjectClass::account(), AttributeSet::new(), &OperationOptions::default())
        .await;
    match unnamed {
        Err(FrameworkError::Connector(ConnectorError::OperationFailed { code, .. })) => {
            assert_eq!(code.as_deref(), Some("E_NAME"))
        }
        other => panic!("unexpected result: {other:?}"),
    }

    // The session stays usable after connector errors.
    facade.test().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_invalid_configuration_fails_before_invocation() {
    let factory = CountingConnectorFactory::new();
    let counters = factory.counters();
    let server = TestServer::start(manager(factory)).await;
    let remote = RemoteConnectorInfoManager::connect(server.connection_info(SHARED_SECRET))
        .await
        .unwrap();

    let missing = remote.create_connector_facade(&counting_key(), Configuration::new());
    assert!(matches!(
        missing,
        Err(FrameworkError::Config(ConfigError::InvalidProperty { .. }))
    ));
    assert_eq!(counters.inits.load(Ordering::SeqCst), 0);
    server.stop().await;
}

#[tokio::test]
async fn test_streaming_stops_when_consumer_stops() {
    let factory = CountingConnectorFactory::new().with_records(5);
    let counters = factory.counters();
    let server = TestServer::start(manager(factory)).await;
    let remote = RemoteConnectorInfoManager::connect(server.connection_info(SHARED_SECRET))
        .await
        .unwrap();
    let facade = remote
        .create_connector_facade(&counting_key(), configuration())
        .unwrap();

    let mut handler = StopAfter {
        stop_after: 2,
        seen: Vec::new(),
    };
    let result = facade
        .search(&ObjectClass::account(), None, &mut handler, &OperationOptions::default())
        .await
        .unwrap();

    assert_eq!(handler.seen, vec!["r1".to_string(), "r2".to_string()]);
    assert!(!result.all_results_returned);
    // r3 was never produced and the cursor is closed.
    assert_eq!(counters.delivered.load(Ordering::SeqCst), 2);
    assert_eq!(counters.open_cursors.load(Ordering::SeqCst), 0);

    // The same session serves the next request.
    let mut collector = ResultsCollector::new();
    facade
        .search(&ObjectClass::account(), None, &mut collector, &OperationOptions::default())
        .await
        .unwrap();
    assert_eq!(collector.objects().len(), 5);
    server.stop().await;
}

#[tokio::test]
async fn test_lost_server_is_a_connectivity_error() {
    let server = TestServer::start(manager(CountingConnectorFactory::new())).await;
    let remote = RemoteConnectorInfoManager::connect(server.connection_info(SHARED_SECRET))
        .await
        .unwrap();
    let facade = remote
        .create_connector_facade(&counting_key(), configuration())
        .unwrap();
    facade.test().await.unwrap();

    server.stop().await;

    let err = facade.test().await.unwrap_err();
    assert!(err.is_connectivity(), "unexpected error: {err}");
}

#[tokio::test]
async fn test_unknown_connector_key() {
    let server = TestServer::start(manager(CountingConnectorFactory::new())).await;
    let remote = RemoteConnectorInfoManager::connect(server.connection_info(SHARED_SECRET))
        .await
        .unwrap();

    let key = connector_host::connector::ConnectorKey::new(TEST_BUNDLE, "9.9", COUNTING_CLASS);
    assert!(remote.find_connector_info(&key).is_none());
    assert!(matches!(
        remote.create_connector_facade(&key, configuration()),
        Err(FrameworkError::ConnectorNotFound(_))
    ));
    server.stop().await;
}
