//! services/store/src/connection.rs
//!
//! The connection manager: owns the single document-store connection of the
//! process under the `default` alias. It is constructed once at startup and
//! passed by reference to whoever needs a store handle.

use crate::config::{ConfigError, StoreConfig};
use async_trait::async_trait;
use bookshelf_core::{DocumentStore, PortError, PortResult};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

pub const DEFAULT_ALIAS: &str = "default";

/// Opens a new connection to a document store.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, config: &StoreConfig) -> PortResult<Arc<dyn DocumentStore>>;
}

pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    alias: String,
    live: Mutex<Option<Arc<dyn DocumentStore>>>,
}

impl ConnectionManager {
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            alias: DEFAULT_ALIAS.to_string(),
            live: Mutex::new(None),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Connects using `MONGO_URI` from the environment. Returns the existing
    /// handle without touching the network if already connected.
    pub async fn connect(&self) -> PortResult<Arc<dyn DocumentStore>> {
        self.connect_using(StoreConfig::from_env).await
    }

    pub async fn connect_with(&self, config: &StoreConfig) -> PortResult<Arc<dyn DocumentStore>> {
        self.connect_using(|| Ok(config.clone())).await
    }

    /// Connects with configuration produced by `load`, which is only invoked
    /// when no connection exists yet. Failures are logged and returned.
    pub async fn connect_using<F>(&self, load: F) -> PortResult<Arc<dyn DocumentStore>>
    where
        F: FnOnce() -> Result<StoreConfig, ConfigError> + Send,
    {
        // Held across `open` so concurrent callers share a single connection.
        let mut live = self.live.lock().await;
        if let Some(store) = live.as_ref() {
            info!(alias = %self.alias, "Document store connection already exists");
            return Ok(Arc::clone(store));
        }

        let config = load().map_err(|e| {
            error!(alias = %self.alias, "Cannot connect to the document store: {}", e);
            PortError::from(e)
        })?;

        let store = self.connector.open(&config).await.map_err(|e| {
            error!(alias = %self.alias, "Error connecting to the document store: {}", e);
            e
        })?;

        info!(alias = %self.alias, database = %config.database_name, "Connected to the document store");
        *live = Some(Arc::clone(&store));
        Ok(store)
    }

    /// The live connection, if any.
    pub async fn current(&self) -> Option<Arc<dyn DocumentStore>> {
        self.live.lock().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.live.lock().await.is_some()
    }

    /// Releases the connection. Fails with `NotFound` when nothing is connected;
    /// callers that only want a clean slate may ignore that.
    pub async fn disconnect(&self) -> PortResult<()> {
        let store = self.live.lock().await.take().ok_or_else(|| {
            warn!(alias = %self.alias, "Disconnect requested but no connection exists");
            PortError::NotFound(format!("no connection under alias '{}'", self.alias))
        })?;

        store.shutdown().await.map_err(|e| {
            error!(alias = %self.alias, "Error disconnecting from the document store: {}", e);
            e
        })?;
        info!(alias = %self.alias, "Disconnected from the document store");
        Ok(())
    }
}
