//! services/store/src/bin/bookshelf_check.rs
//!
//! Connects to the document store, makes sure the indexes exist and reports
//! reading profiles whose owner is gone (orphaned) or whose owner does not
//! point back at them (unlinked). Pass `--purge-orphans` to delete orphaned
//! profiles and relink unlinked ones. Exits with an error while either remains.

use bookshelf_core::{Library, PortError};
use store_lib::{adapters::MongoConnector, config::StoreConfig, error::StoreError, ConnectionManager};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), StoreError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = StoreConfig::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut purge = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--purge-orphans" => purge = true,
            other => return Err(StoreError::Internal(format!("unknown argument '{}'", other))),
        }
    }

    // --- 2. Connect (indexes are created on connect) ---
    let connections = ConnectionManager::new(MongoConnector);
    let store = connections.connect_with(&config).await?;
    let library = Library::new(store);

    // --- 3. Check, then always release the connection ---
    let outcome = check_profiles(&library, purge).await;
    if let Err(e) = connections.disconnect().await {
        warn!("Disconnect failed: {}", e);
    }
    outcome
}

async fn check_profiles(library: &Library, purge: bool) -> Result<(), StoreError> {
    if purge {
        let removed = library.purge_orphaned_profiles().await?;
        let relinked = library.relink_profiles().await?;
        info!("Removed {} orphaned and relinked {} reading profile(s)", removed, relinked);
        return Ok(());
    }

    let orphans = library.find_orphaned_profiles().await?;
    let unlinked = library.find_unlinked_profiles().await?;
    if orphans.is_empty() && unlinked.is_empty() {
        info!("All reading profiles are linked to their owners");
        return Ok(());
    }
    Err(PortError::DataIntegrity(format!(
        "{} orphaned and {} unlinked reading profile(s); rerun with --purge-orphans to repair",
        orphans.len(),
        unlinked.len()
    ))
    .into())
}
