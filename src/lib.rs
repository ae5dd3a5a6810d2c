//! Project store - database connection and transaction core
//!
//! Owns the single shared connection to the backing store, retries transient
//! connection failures, exposes health metrics, runs units of work inside
//! transactions and gates maintenance operations by environment.

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

// Re-export commonly used types
pub use config::{DatabaseSettings, Environment};
pub use error::{AppError, Result};
pub use infrastructure::database::{
    ConnectionManager, ConnectionState, HealthMetrics, HealthStatus, InMemoryStore, MaintenanceGuard,
    MongoStoreClient, StoreClient, StoreTransaction, TransactionExecutor, TransactionIsolationLevel,
    TransactionOverrides,
};
