use crate::error::{sanitize_message, AppError};
use crate::infrastructure::database::health_monitor::MetricsRecorder;
use crate::infrastructure::database::store::{StoreClient, StoreTransaction};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransactionIsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl FromStr for TransactionIsolationLevel {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized: String = value
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "readuncommitted" => Ok(TransactionIsolationLevel::ReadUncommitted),
            "readcommitted" => Ok(TransactionIsolationLevel::ReadCommitted),
            "repeatableread" => Ok(TransactionIsolationLevel::RepeatableRead),
            "serializable" => Ok(TransactionIsolationLevel::Serializable),
            _ => Err(AppError::ConfigError(format!(
                "Unknown transaction isolation level '{}'",
                value
            ))),
        }
    }
}

/// Fully resolved options for one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionOptions {
    pub timeout: Duration,
    pub isolation_level: TransactionIsolationLevel,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            isolation_level: TransactionIsolationLevel::ReadCommitted,
        }
    }
}

/// Per-call overrides merged over the executor defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionOverrides {
    pub timeout: Option<Duration>,
    pub isolation_level: Option<TransactionIsolationLevel>,
}

impl TransactionOverrides {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn isolation_level(mut self, level: TransactionIsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    pub fn merge(&self, defaults: &TransactionOptions) -> TransactionOptions {
        TransactionOptions {
            timeout: self.timeout.unwrap_or(defaults.timeout),
            isolation_level: self.isolation_level.unwrap_or(defaults.isolation_level),
        }
    }
}

/// Runs units of work inside store transactions.
///
/// Cheap to clone; every clone shares the store and the health metrics of the
/// connection manager that created it.
#[derive(Clone)]
pub struct TransactionExecutor {
    store: Arc<dyn StoreClient>,
    metrics: Arc<MetricsRecorder>,
    defaults: TransactionOptions,
}

impl TransactionExecutor {
    pub(crate) fn new(
        store: Arc<dyn StoreClient>,
        metrics: Arc<MetricsRecorder>,
        defaults: TransactionOptions,
    ) -> Self {
        Self {
            store,
            metrics,
            defaults,
        }
    }

    pub fn defaults(&self) -> &TransactionOptions {
        &self.defaults
    }

    /// Run `work` with the default options.
    pub async fn run<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut dyn StoreTransaction) -> BoxFuture<'t, Result<T, E>> + Send,
        T: Send,
        E: From<AppError> + Display + Send,
    {
        self.run_with_options(TransactionOverrides::default(), work).await
    }

    /// Run `work` inside one transaction.
    ///
    /// The work's own error is returned untouched so callers can match on it;
    /// only the log line and the metrics see the sanitized text. Store
    /// failures and timeouts are converted through `E: From<AppError>`.
    pub async fn run_with_options<T, E, F>(&self, overrides: TransactionOverrides, work: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut dyn StoreTransaction) -> BoxFuture<'t, Result<T, E>> + Send,
        T: Send,
        E: From<AppError> + Display + Send,
    {
        let options = overrides.merge(&self.defaults);
        let start_time = Instant::now();

        let mut transaction = match self.store.begin_transaction(&options).await {
            Ok(transaction) => transaction,
            Err(e) => {
                self.record_failure(None, e.to_string()).await;
                return Err(E::from(e));
            }
        };
        let transaction_id = transaction.id();

        debug!(
            transaction_id = %transaction_id,
            isolation_level = ?options.isolation_level,
            timeout_ms = options.timeout.as_millis() as u64,
            "Started transaction"
        );

        let outcome = tokio::time::timeout(options.timeout, work(transaction.as_mut())).await;

        match outcome {
            Ok(Ok(value)) => match transaction.commit().await {
                Ok(()) => {
                    debug!(
                        transaction_id = %transaction_id,
                        duration_ms = start_time.elapsed().as_millis() as u64,
                        "Transaction committed"
                    );
                    Ok(value)
                }
                Err(e) => {
                    self.record_failure(Some(transaction_id), e.to_string()).await;
                    Err(E::from(e))
                }
            },
            Ok(Err(err)) => {
                Self::abort(transaction.as_mut()).await;
                self.record_failure(Some(transaction_id), err.to_string()).await;
                Err(err)
            }
            Err(_) => {
                Self::abort(transaction.as_mut()).await;
                let err = AppError::TransactionTimeout {
                    timeout_ms: options.timeout.as_millis() as u64,
                };
                self.record_failure(Some(transaction_id), err.to_string()).await;
                Err(E::from(err))
            }
        }
    }

    async fn abort(transaction: &mut dyn StoreTransaction) {
        if let Err(e) = transaction.rollback().await {
            warn!(
                transaction_id = %transaction.id(),
                error = %sanitize_message(&e.to_string()),
                "Failed to roll back transaction"
            );
        }
    }

    async fn record_failure(&self, transaction_id: Option<Uuid>, message: String) {
        let sanitized = sanitize_message(&message);
        error!(
            transaction_id = ?transaction_id,
            error = %sanitized,
            "Transaction failed"
        );
        self.metrics.record_error(sanitized).await;
    }
}
