use project_store::config::{DatabaseSettings, Environment};
use project_store::infrastructure::database::{ConnectionManager, InMemoryStore, StoreClient};
use std::sync::Arc;

use super::SettingsBuilder;

/// A connection manager over an in-memory store the test can poke at
pub struct TestDatabase {
    pub store: Arc<InMemoryStore>,
    pub manager: ConnectionManager,
}

impl TestDatabase {
    pub fn new(settings: DatabaseSettings) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let manager = ConnectionManager::new(Arc::clone(&store) as Arc<dyn StoreClient>, settings);
        Self { store, manager }
    }

    pub fn for_environment(environment: Environment) -> Self {
        Self::new(SettingsBuilder::new(environment).build())
    }

    /// Connected database for the given environment, with background probing off
    /// so store call counts stay stable
    pub async fn connected(environment: Environment) -> Self {
        let database = Self::new(
            SettingsBuilder::new(environment)
                .health_check_enabled(false)
                .build(),
        );
        database
            .manager
            .connect()
            .await
            .expect("in-memory store should connect");
        database
    }
}
