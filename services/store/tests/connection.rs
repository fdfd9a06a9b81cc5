use async_trait::async_trait;
use bookshelf_core::{DocumentStore, PortError, PortResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use store_lib::adapters::MemoryStore;
use store_lib::{ConnectionManager, Connector, StoreConfig, DEFAULT_ALIAS};

/// Hands out in-memory stores and counts how often it was asked to.
#[derive(Clone, Default)]
struct CountingConnector {
    opens: Arc<AtomicUsize>,
    unreachable: bool,
}

#[async_trait]
impl Connector for CountingConnector {
    async fn open(&self, _config: &StoreConfig) -> PortResult<Arc<dyn DocumentStore>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(PortError::Connection("server selection timed out".to_string()));
        }
        Ok(Arc::new(MemoryStore::new()))
    }
}

fn config() -> StoreConfig {
    StoreConfig::from_lookup(|key| (key == "MONGO_URI").then(|| "mongodb://localhost:27017".to_string()))
        .unwrap()
}

#[tokio::test]
async fn second_connect_reuses_the_live_connection() {
    let connector = CountingConnector::default();
    let opens = connector.opens.clone();
    let manager = ConnectionManager::new(connector);
    assert_eq!(manager.alias(), DEFAULT_ALIAS);

    manager.connect_with(&config()).await.unwrap();
    manager.connect_with(&config()).await.unwrap();

    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert!(manager.is_connected().await);
}

#[tokio::test]
async fn concurrent_connects_open_once() {
    let connector = CountingConnector::default();
    let opens = connector.opens.clone();
    let manager = ConnectionManager::new(connector);
    let cfg = config();

    let (a, b) = tokio::join!(manager.connect_with(&cfg), manager.connect_with(&cfg));
    a.unwrap();
    b.unwrap();

    assert_eq!(opens.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn connected_manager_skips_configuration() {
    let manager = ConnectionManager::new(CountingConnector::default());
    manager.connect_with(&config()).await.unwrap();

    // The loader would fail, but it is never consulted once connected.
    manager
        .connect_using(|| StoreConfig::from_lookup(|_| None))
        .await
        .unwrap();
}

#[tokio::test]
async fn missing_target_is_a_configuration_error() {
    let connector = CountingConnector::default();
    let opens = connector.opens.clone();
    let manager = ConnectionManager::new(connector);

    let err = manager
        .connect_using(|| StoreConfig::from_lookup(|_| None))
        .await
        .err()
        .unwrap();

    assert!(matches!(err, PortError::Configuration(_)));
    assert_eq!(opens.load(Ordering::SeqCst), 0);
    assert!(!manager.is_connected().await);
}

#[tokio::test]
async fn unreachable_store_is_reported_and_retryable() {
    let manager = ConnectionManager::new(CountingConnector {
        unreachable: true,
        ..CountingConnector::default()
    });

    let err = manager.connect_with(&config()).await.err().unwrap();

    assert!(matches!(err, PortError::Connection(_)));
    assert!(err.is_retryable());
    assert!(manager.current().await.is_none());
}

#[tokio::test]
async fn disconnect_without_connection_fails_softly() {
    let manager = ConnectionManager::new(CountingConnector::default());

    let err = manager.disconnect().await.unwrap_err();

    assert!(matches!(err, PortError::NotFound(_)));
}

#[tokio::test]
async fn disconnect_releases_and_allows_reconnect() {
    let connector = CountingConnector::default();
    let opens = connector.opens.clone();
    let manager = ConnectionManager::new(connector);

    let first = manager.connect_with(&config()).await.unwrap();
    manager.disconnect().await.unwrap();

    assert!(!manager.is_connected().await);
    assert!(first.ping().await.is_err());

    let second = manager.connect_with(&config()).await.unwrap();
    second.ping().await.unwrap();
    assert_eq!(opens.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn connect_without_mongo_uri_is_a_configuration_error() {
    // No other test in this binary reads the environment.
    std::env::remove_var("MONGO_URI");
    let connector = CountingConnector::default();
    let opens = connector.opens.clone();
    let manager = ConnectionManager::new(connector);

    let err = manager.connect().await.err().unwrap();

    assert!(matches!(err, PortError::Configuration(ref msg) if msg.contains("MONGO_URI")));
    assert!(!err.is_retryable());
    assert_eq!(opens.load(Ordering::SeqCst), 0);
    assert!(!manager.is_connected().await);
}
