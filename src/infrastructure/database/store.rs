//! Store driver abstraction.
//!
//! The connection manager owns a `dyn StoreClient` instead of extending a
//! concrete driver, so retry and health logic can be exercised against the
//! in-memory store while production runs on MongoDB.

use crate::error::Result;
use crate::infrastructure::database::TransactionOptions;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Physical connection lifecycle plus the transaction primitive.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Short driver name used in logs.
    fn name(&self) -> &'static str;

    /// Establish the physical connection (or pool).
    async fn connect(&self) -> Result<()>;

    /// Release the physical connection.
    async fn disconnect(&self) -> Result<()>;

    /// Minimal round trip used as a liveness probe.
    async fn ping(&self) -> Result<()>;

    /// Open a transaction configured with `options`.
    async fn begin_transaction(&self, options: &TransactionOptions) -> Result<Box<dyn StoreTransaction>>;
}

/// Transaction-scoped handle handed to a unit of work.
///
/// Documents are JSON objects addressed by `(collection, id)`. Dropping a
/// handle without calling [`commit`](StoreTransaction::commit) discards every
/// change made through it.
#[async_trait]
pub trait StoreTransaction: Send {
    fn id(&self) -> Uuid;

    async fn insert(&mut self, collection: &str, id: &str, document: Value) -> Result<()>;

    async fn find(&mut self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// Returns whether a document was removed.
    async fn delete(&mut self, collection: &str, id: &str) -> Result<bool>;

    /// Returns the number of removed documents.
    async fn delete_all(&mut self, collection: &str) -> Result<u64>;

    async fn count(&mut self, collection: &str) -> Result<u64>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}

/// One store operation, reported to the query hook after it finished.
#[derive(Debug, Clone)]
pub struct QueryEvent {
    pub store: &'static str,
    pub operation: &'static str,
    pub collection: Option<String>,
    pub transaction_id: Option<Uuid>,
    pub elapsed: Duration,
    pub success: bool,
}

/// Callback invoked synchronously for every store operation.
pub type QueryHook = Arc<dyn Fn(&QueryEvent) + Send + Sync>;

/// Hook that writes each operation to the debug log.
pub fn tracing_query_hook() -> QueryHook {
    Arc::new(|event: &QueryEvent| {
        debug!(
            store = event.store,
            operation = event.operation,
            collection = event.collection.as_deref().unwrap_or("-"),
            transaction_id = ?event.transaction_id,
            elapsed_ms = event.elapsed.as_millis() as u64,
            success = event.success,
            "Database query"
        );
    })
}

pub(crate) fn emit(hook: &Option<QueryHook>, event: QueryEvent) {
    if let Some(hook) = hook {
        hook(&event);
    }
}
