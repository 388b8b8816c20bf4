//! Application state.
//!
//! Holds the `Client` every command runs against. The store behind it is
//! chosen at compile time via feature flags.

use std::sync::Arc;

use routebook_core::store::SharedStore;
use routebook_core::Client;

use crate::config::Config;

// Storage features: exactly one must be enabled, they are mutually exclusive
#[cfg(all(feature = "memory", feature = "sqlite"))]
compile_error!("Cannot enable both 'memory' and 'sqlite' storage features");

#[cfg(not(any(feature = "memory", feature = "sqlite")))]
compile_error!("Must enable exactly one storage feature: 'memory' or 'sqlite'");

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub client: Client,
}

impl AppState {
    fn build(store: SharedStore, config: &Config) -> Self {
        Self {
            client: Client::new(store).with_page_size(config.page_size),
        }
    }
}

#[cfg(feature = "memory")]
mod memory {
    use super::*;
    use crate::mock_data;
    use routebook_core::store::InMemoryStore;

    impl AppState {
        /// Creates AppState with an in-memory store seeded with demo data.
        ///
        /// Nothing outlives the process, so every run starts from the demo data.
        pub async fn new(config: &Config) -> Result<Self, anyhow::Error> {
            let store = InMemoryStore::new()
                .with_max_transaction_attempts(config.transaction_attempts);
            let state = Self::build(Arc::new(store), config);
            mock_data::seed(&state.client).await?;
            Ok(state)
        }
    }
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use crate::storage::SqliteStore;

    impl AppState {
        /// Creates AppState with SQLite storage.
        pub async fn new(config: &Config) -> Result<Self, anyhow::Error> {
            let store = SqliteStore::new(&config.sqlite_path)
                .await?
                .with_max_transaction_attempts(config.transaction_attempts);
            Ok(Self::build(Arc::new(store), config))
        }
    }
}
