//! MongoDB driver.
//!
//! Transactions run on a client session, so a replica set (or a sharded
//! cluster) is required. Documents are stored with `_id` set to the record id.

use crate::error::{AppError, Result, StoreErrorKind};
use crate::infrastructure::database::store::{emit, QueryEvent, QueryHook, StoreClient, StoreTransaction};
use crate::infrastructure::database::{TransactionIsolationLevel, TransactionOptions};
use async_trait::async_trait;
use mongodb::{
    bson::{doc, Bson, Document},
    error::{ErrorKind, WriteFailure},
    options::{
        Acknowledgment, ClientOptions, ReadConcern, ServerApi, ServerApiVersion,
        TransactionOptions as MongoTransactionOptions, WriteConcern,
    },
    Client, ClientSession, Collection,
};
use serde_json::Value;
use std::io;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

const STORE_NAME: &str = "mongodb";
const DUPLICATE_KEY_CODE: i32 = 11000;
const DOCUMENT_VALIDATION_FAILURE_CODE: i32 = 121;

pub struct MongoStoreClient {
    uri: String,
    database_name: String,
    connect_timeout: Duration,
    client: RwLock<Option<Client>>,
    query_hook: Option<QueryHook>,
}

impl MongoStoreClient {
    pub fn new(uri: impl Into<String>, database_name: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            uri: uri.into(),
            database_name: database_name.into(),
            connect_timeout,
            client: RwLock::new(None),
            query_hook: None,
        }
    }

    pub fn with_query_hook(mut self, hook: QueryHook) -> Self {
        self.query_hook = Some(hook);
        self
    }

    async fn client(&self) -> Result<Client> {
        self.client.read().await.clone().ok_or(AppError::NotConnected)
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
}

#[async_trait]
impl StoreClient for MongoStoreClient {
    fn name(&self) -> &'static str {
        STORE_NAME
    }

    async fn connect(&self) -> Result<()> {
        let started = Instant::now();

        let result = async {
            let mut client_options = ClientOptions::parse(&self.uri).await?;

            // Stable API version 1
            let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
            client_options.server_api = Some(server_api);
            client_options.connect_timeout = Some(self.connect_timeout);
            client_options.server_selection_timeout = Some(self.connect_timeout);

            Ok::<_, AppError>(Client::with_options(client_options)?)
        }
        .await;

        self.record("connect", started, result.is_ok());
        let client = result?;

        let previous = self.client.write().await.replace(client);
        if let Some(previous) = previous {
            previous.shutdown().await;
        }
        debug!(database = %self.database_name, "MongoDB client created");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let started = Instant::now();
        let client = self.client.write().await.take();

        if let Some(client) = client {
            client.shutdown().await;
            info!("MongoDB client shut down");
        }

        self.record("disconnect", started, true);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let started = Instant::now();

        let result = async {
            let client = self.client().await?;
            client
                .database("admin")
                .run_command(doc! {"ping": 1}, None)
                .await?;
            Ok::<_, AppError>(())
        }
        .await;

        self.record("ping", started, result.is_ok());
        result
    }

    async fn begin_transaction(&self, options: &TransactionOptions) -> Result<Box<dyn StoreTransaction>> {
        let started = Instant::now();

        let result = async {
            let client = self.client().await?;
            let mut session = client.start_session(None).await?;
            session
                .start_transaction(transaction_options(options))
                .await?;
            Ok::<_, AppError>(MongoTransaction {
                id: Uuid::new_v4(),
                session,
                database: client.database(&self.database_name),
                finished: false,
                query_hook: self.query_hook.clone(),
            })
        }
        .await;

        self.record("begin_transaction", started, result.is_ok());
        let transaction = result?;

        debug!(
            transaction_id = %transaction.id,
            isolation_level = ?options.isolation_level,
            "Started MongoDB transaction"
        );
        Ok(Box::new(transaction))
    }
}

/// Map an isolation level onto read and write concerns.
pub(crate) fn transaction_options(options: &TransactionOptions) -> MongoTransactionOptions {
    let mut mongo_options = match options.isolation_level {
        TransactionIsolationLevel::ReadUncommitted | TransactionIsolationLevel::ReadCommitted => {
            MongoTransactionOptions::builder()
                .read_concern(ReadConcern::local())
                .build()
        }
        TransactionIsolationLevel::RepeatableRead => MongoTransactionOptions::builder()
            .read_concern(ReadConcern::majority())
            .build(),
        TransactionIsolationLevel::Serializable => MongoTransactionOptions::builder()
            .read_concern(ReadConcern::snapshot())
            .write_concern(WriteConcern::builder().w(Acknowledgment::Majority).build())
            .build(),
    };
    mongo_options.max_commit_time = Some(options.timeout);
    mongo_options
}

struct MongoTransaction {
    id: Uuid,
    session: ClientSession,
    database: mongodb::Database,
    finished: bool,
    query_hook: Option<QueryHook>,
}

impl MongoTransaction {
    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection::<Document>(name)
    }

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
}

#[async_trait]
impl StoreTransaction for MongoTransaction {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn insert(&mut self, collection: &str, id: &str, document: Value) -> Result<()> {
        self.ensure_active()?;
        let started = Instant::now();
        let coll = self.collection(collection);

        let result = async {
            let document = to_document(id, document)?;
            coll.insert_one_with_session(document, None, &mut self.session)
                .await?;
            Ok::<_, AppError>(())
        }
        .await;

        self.record("insert", Some(collection), started, result.is_ok());
        result
    }

    async fn find(&mut self, collection: &str, id: &str) -> Result<Option<Value>> {
        self.ensure_active()?;
        let started = Instant::now();
        let coll = self.collection(collection);

        let result = coll
            .find_one_with_session(doc! {"_id": id}, None, &mut self.session)
            .await
            .map(|found| found.map(to_value))
            .map_err(AppError::from);

        self.record("find", Some(collection), started, result.is_ok());
        result
    }

    async fn delete(&mut self, collection: &str, id: &str) -> Result<bool> {
        self.ensure_active()?;
        let started = Instant::now();
        let coll = self.collection(collection);

        let result = coll
            .delete_one_with_session(doc! {"_id": id}, None, &mut self.session)
            .await
            .map(|outcome| outcome.deleted_count > 0)
            .map_err(AppError::from);

        self.record("delete", Some(collection), started, result.is_ok());
        result
    }

    async fn delete_all(&mut self, collection: &str) -> Result<u64> {
        self.ensure_active()?;
        let started = Instant::now();
        let coll = self.collection(collection);

        let result = coll
            .delete_many_with_session(doc! {}, None, &mut self.session)
            .await
            .map(|outcome| outcome.deleted_count)
            .map_err(AppError::from);

        self.record("delete_all", Some(collection), started, result.is_ok());
        result
    }

    async fn count(&mut self, collection: &str) -> Result<u64> {
        self.ensure_active()?;
        let started = Instant::now();
        let coll = self.collection(collection);

        let result = coll
            .count_documents_with_session(doc! {}, None, &mut self.session)
            .await
            .map_err(AppError::from);

        self.record("count", Some(collection), started, result.is_ok());
        result
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.finished = true;
        let started = Instant::now();

        let result = self.session.commit_transaction().await.map_err(AppError::from);
        if result.is_err() {
            if let Err(abort_err) = self.session.abort_transaction().await {
                debug!(transaction_id = %self.id, "Abort after failed commit: {}", abort_err);
            }
        }

        self.record("commit", None, started, result.is_ok());
        result
    }

    async fn rollback(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.finished = true;
        let started = Instant::now();

        let result = self.session.abort_transaction().await.map_err(AppError::from);
        if result.is_err() {
            warn!(transaction_id = %self.id, "MongoDB refused to abort transaction");
        }

        self.record("rollback", None, started, result.is_ok());
        result
    }
}

fn to_document(id: &str, value: Value) -> Result<Document> {
    let mut document = mongodb::bson::to_document(&value)
        .map_err(|e| AppError::SerializationError(format!("BSON error: {}", e)))?;
    document.insert("_id", id);
    Ok(document)
}

fn to_value(mut document: Document) -> Value {
    document.remove("_id");
    Bson::Document(document).into_relaxed_extjson()
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        let message = err.to_string();

        let kind = match err.kind.as_ref() {
            ErrorKind::Io(io_err) => io_error_kind(io_err.kind()),
            ErrorKind::ServerSelection { .. } => StoreErrorKind::TimedOut,
            ErrorKind::DnsResolve { .. } => StoreErrorKind::HostNotFound,
            ErrorKind::ConnectionPoolCleared { .. } => StoreErrorKind::ConnectionReset,
            ErrorKind::Authentication { .. } => StoreErrorKind::Authentication,
            ErrorKind::Write(WriteFailure::WriteError(write_error))
                if write_error.code == DUPLICATE_KEY_CODE =>
            {
                return AppError::DuplicateKey(message);
            }
            ErrorKind::Command(command_error) if command_error.code == DUPLICATE_KEY_CODE => {
                return AppError::DuplicateKey(message);
            }
            ErrorKind::Write(WriteFailure::WriteError(write_error))
                if write_error.code == DOCUMENT_VALIDATION_FAILURE_CODE =>
            {
                StoreErrorKind::Integrity
            }
            ErrorKind::InvalidArgument { .. } => return AppError::ConfigError(message),
            _ => StoreErrorKind::Other,
        };

        AppError::StoreError { kind, message }
    }
}

fn io_error_kind(kind: io::ErrorKind) -> StoreErrorKind {
    match kind {
        io::ErrorKind::ConnectionRefused => StoreErrorKind::ConnectionRefused,
        io::ErrorKind::TimedOut => StoreErrorKind::TimedOut,
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe => {
            StoreErrorKind::ConnectionReset
        }
        io::ErrorKind::UnexpectedEof => StoreErrorKind::ConnectionTerminated,
        _ => StoreErrorKind::Other,
    }
}
