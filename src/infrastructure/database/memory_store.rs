//! In-process transactional store.
//!
//! Selected by `memory://` URLs for local development and used throughout the
//! test suites. Transactions work on a snapshot taken at `begin` and replay
//! their writes atomically on commit, so every isolation level behaves as
//! snapshot isolation here. Fault injection knobs let callers simulate a
//! flaky or slow backend.

use crate::error::{AppError, Result, StoreErrorKind};
use crate::infrastructure::database::store::{emit, QueryEvent, QueryHook, StoreClient, StoreTransaction};
use crate::infrastructure::database::{TransactionIsolationLevel, TransactionOptions};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

const STORE_NAME: &str = "memory";

type Tables = HashMap<String, BTreeMap<String, Value>>;

#[derive(Debug, Default)]
struct FaultPlan {
    connect_error: Option<String>,
    /// `None` fails every attempt
    connect_failures_left: Option<u32>,
    ping_error: Option<String>,
    ping_latency: Duration,
    disconnect_error: Option<String>,
}

/// Transactional in-memory document store.
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    connected: AtomicBool,
    faults: Mutex<FaultPlan>,
    connect_attempts: AtomicU32,
    ping_count: AtomicU32,
    transactions_started: AtomicU32,
    query_hook: Option<QueryHook>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
            connected: AtomicBool::new(false),
            faults: Mutex::new(FaultPlan::default()),
            connect_attempts: AtomicU32::new(0),
            ping_count: AtomicU32::new(0),
            transactions_started: AtomicU32::new(0),
            query_hook: None,
        }
    }

    pub fn with_query_hook(mut self, hook: QueryHook) -> Self {
        self.query_hook = Some(hook);
        self
    }

    /// Fail the next `times` connection attempts with `message`.
    pub fn fail_connect(&self, message: impl Into<String>, times: u32) {
        let mut faults = self.faults();
        faults.connect_error = Some(message.into());
        faults.connect_failures_left = Some(times);
    }

    /// Fail every connection attempt with `message`.
    pub fn fail_connect_always(&self, message: impl Into<String>) {
        let mut faults = self.faults();
        faults.connect_error = Some(message.into());
        faults.connect_failures_left = None;
    }

    /// Make liveness probes fail with `message`, or succeed again with `None`.
    pub fn fail_ping(&self, message: Option<String>) {
        self.faults().ping_error = message;
    }

    /// Artificial latency added to every liveness probe.
    pub fn set_ping_latency(&self, latency: Duration) {
        self.faults().ping_latency = latency;
    }

    pub fn fail_disconnect(&self, message: impl Into<String>) {
        self.faults().disconnect_error = Some(message.into());
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn ping_count(&self) -> u32 {
        self.ping_count.load(Ordering::SeqCst)
    }

    pub fn transactions_started(&self) -> u32 {
        self.transactions_started.load(Ordering::SeqCst)
    }

    /// Total number of calls that reached the store.
    pub fn call_count(&self) -> u32 {
        self.connect_attempts() + self.ping_count() + self.transactions_started()
    }

    /// Committed documents of a collection, ordered by id.
    pub async fn documents(&self, collection: &str) -> Vec<Value> {
        self.tables
            .read()
            .await
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, FaultPlan> {
        // A poisoned plan only means a test panicked mid-update; the data is still usable.
        self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, operation: &'static str, started: Instant, success: bool) {
        emit(
            &self.query_hook,
            QueryEvent {
                store: STORE_NAME,
                operation,
                collection: None,
                transaction_id: None,
                elapsed: started.elapsed(),
                success,
            },
        );
    }

    fn next_connect_fault(&self) -> Option<String> {
        let mut faults = self.faults();
        let message = faults.connect_error.clone()?;
        match faults.connect_failures_left {
            None => Some(message),
            Some(0) => None,
            Some(left) => {
                faults.connect_failures_left = Some(left - 1);
                Some(message)
            }
        }
    }
}

#[async_trait]
impl StoreClient for InMemoryStore {
    fn name(&self) -> &'static str {
        STORE_NAME
    }

    async fn connect(&self) -> Result<()> {
        let started = Instant::now();
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = self.next_connect_fault() {
            self.record("connect", started, false);
            return Err(AppError::store(StoreErrorKind::Other, message));
        }

        self.connected.store(true, Ordering::SeqCst);
        self.record("connect", started, true);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let started = Instant::now();
        self.connected.store(false, Ordering::SeqCst);

        let fault = self.faults().disconnect_error.clone();
        if let Some(message) = fault {
            self.record("disconnect", started, false);
            return Err(AppError::DisconnectError(message));
        }

        self.record("disconnect", started, true);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let started = Instant::now();
        self.ping_count.fetch_add(1, Ordering::SeqCst);

        let (latency, fault) = {
            let faults = self.faults();
            (faults.ping_latency, faults.ping_error.clone())
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let result = if !self.is_connected() {
            Err(AppError::NotConnected)
        } else if let Some(message) = fault {
            Err(AppError::store(StoreErrorKind::Other, message))
        } else {
            Ok(())
        };

        self.record("ping", started, result.is_ok());
        result
    }

    async fn begin_transaction(&self, options: &TransactionOptions) -> Result<Box<dyn StoreTransaction>> {
        let started = Instant::now();
        self.transactions_started.fetch_add(1, Ordering::SeqCst);

        if !self.is_connected() {
            self.record("begin_transaction", started, false);
            return Err(AppError::NotConnected);
        }

        let snapshot = self.tables.read().await.clone();
        let transaction = MemoryTransaction {
            id: Uuid::new_v4(),
            isolation_level: options.isolation_level,
            tables: Arc::clone(&self.tables),
            working: snapshot,
            pending: Vec::new(),
            finished: false,
            query_hook: self.query_hook.clone(),
        };

        debug!(
            transaction_id = %transaction.id,
            isolation_level = ?transaction.isolation_level,
            "Started in-memory transaction"
        );
        self.record("begin_transaction", started, true);
        Ok(Box::new(transaction))
    }
}

#[derive(Debug, Clone)]
enum PendingWrite {
    Insert { collection: String, id: String, document: Value },
    Delete { collection: String, id: String },
    DeleteAll { collection: String },
}

impl PendingWrite {
    fn apply(self, tables: &mut Tables) -> Result<()> {
        match self {
            PendingWrite::Insert { collection, id, document } => {
                let docs = tables.entry(collection.clone()).or_default();
                if docs.contains_key(&id) {
                    return Err(AppError::DuplicateKey(format!("{}/{}", collection, id)));
                }
                docs.insert(id, document);
            }
            PendingWrite::Delete { collection, id } => {
                if let Some(docs) = tables.get_mut(&collection) {
                    docs.remove(&id);
                }
            }
            PendingWrite::DeleteAll { collection } => {
                tables.remove(&collection);
            }
        }
        Ok(())
    }
}

struct MemoryTransaction {
    id: Uuid,
    isolation_level: TransactionIsolationLevel,
    tables: Arc<RwLock<Tables>>,
    /// Snapshot plus this transaction's own writes
    working: Tables,
    pending: Vec<PendingWrite>,
    finished: bool,
    query_hook: Option<QueryHook>,
}

impl MemoryTransaction {
    fn ensure_active(&self) -> Result<()> {
        if self.finished {
            return Err(AppError::ValidationError(format!(
                "Transaction {} is already finished",
                self.id
            )));
        }
        Ok(())
    }

    fn record(&self, operation: &'static str, collection: Option<&str>, started: Instant, success: bool) {
        emit(
            &self.query_hook,
            QueryEvent {
                store: STORE_NAME,
                operation,
                collection: collection.map(str::to_string),
                transaction_id: Some(self.id),
                elapsed: started.elapsed(),
                success,
            },
        );
    }

    fn stage(&mut self, write: PendingWrite) -> Result<()> {
        write.clone().apply(&mut self.working)?;
        self.pending.push(write);
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn insert(&mut self, collection: &str, id: &str, document: Value) -> Result<()> {
        let started = Instant::now();
        self.ensure_active()?;
        let result = self.stage(PendingWrite::Insert {
            collection: collection.to_string(),
            id: id.to_string(),
            document,
        });
        self.record("insert", Some(collection), started, result.is_ok());
        result
    }

    async fn find(&mut self, collection: &str, id: &str) -> Result<Option<Value>> {
        let started = Instant::now();
        self.ensure_active()?;
        let found = self
            .working
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned();
        self.record("find", Some(collection), started, true);
        Ok(found)
    }

    async fn delete(&mut self, collection: &str, id: &str) -> Result<bool> {
        let started = Instant::now();
        self.ensure_active()?;
        let existed = self
            .working
            .get(collection)
            .map(|docs| docs.contains_key(id))
            .unwrap_or(false);
        if existed {
            self.stage(PendingWrite::Delete {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        }
        self.record("delete", Some(collection), started, true);
        Ok(existed)
    }

    async fn delete_all(&mut self, collection: &str) -> Result<u64> {
        let started = Instant::now();
        self.ensure_active()?;
        let removed = self.working.get(collection).map(|docs| docs.len() as u64).unwrap_or(0);
        self.stage(PendingWrite::DeleteAll {
            collection: collection.to_string(),
        })?;
        self.record("delete_all", Some(collection), started, true);
        Ok(removed)
    }

    async fn count(&mut self, collection: &str) -> Result<u64> {
        let started = Instant::now();
        self.ensure_active()?;
        let count = self.working.get(collection).map(|docs| docs.len() as u64).unwrap_or(0);
        self.record("count", Some(collection), started, true);
        Ok(count)
    }

    async fn commit(&mut self) -> Result<()> {
        let started = Instant::now();
        self.ensure_active()?;
        self.finished = true;

        let pending = std::mem::take(&mut self.pending);
        let tables = Arc::clone(&self.tables);
        let mut live = tables.write().await;
        let mut next = live.clone();
        for write in pending {
            if let Err(e) = write.apply(&mut next) {
                self.record("commit", None, started, false);
                return Err(e);
            }
        }
        *live = next;

        self.record("commit", None, started, true);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let started = Instant::now();
        self.ensure_active()?;
        self.finished = true;
        self.pending.clear();
        self.working.clear();
        self.record("rollback", None, started, true);
        Ok(())
    }
}
