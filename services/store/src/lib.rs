pub mod adapters;
pub mod config;
pub mod connection;
pub mod error;

pub use config::{ConfigError, StoreConfig};
pub use connection::{ConnectionManager, Connector, DEFAULT_ALIAS};
pub use error::StoreError;
