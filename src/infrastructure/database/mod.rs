//! Connection lifecycle, health and transactions for the backing store.

pub mod connection_manager;
pub mod health_monitor;
pub mod maintenance;
pub mod memory_store;
pub mod mongo_store;
pub mod store;
pub mod transaction_manager;

pub use connection_manager::{ConnectionManager, ConnectionState};
pub use health_monitor::{ConnectionStatus, HealthMetrics, HealthMonitor, HealthStatus};
pub use maintenance::MaintenanceGuard;
pub use memory_store::InMemoryStore;
pub use mongo_store::MongoStoreClient;
pub use store::{tracing_query_hook, QueryEvent, QueryHook, StoreClient, StoreTransaction};
pub use transaction_manager::{
    TransactionExecutor, TransactionIsolationLevel, TransactionOptions, TransactionOverrides,
};
