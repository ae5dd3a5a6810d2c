use crate::config::Environment;
use crate::domain::{default_records, RESET_ORDER};
use crate::error::{AppError, Result};
use crate::infrastructure::database::transaction_manager::TransactionExecutor;
use tracing::{debug, info, warn};

/// Destructive and seeding operations, gated by the active environment.
#[derive(Clone)]
pub struct MaintenanceGuard {
    environment: Environment,
    executor: TransactionExecutor,
}

impl MaintenanceGuard {
    pub fn new(environment: Environment, executor: TransactionExecutor) -> Self {
        Self {
            environment,
            executor,
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Delete every document, children before parents, in one transaction.
    ///
    /// Only allowed in the test environment. Returns the number of deleted
    /// documents.
    pub async fn reset_all(&self) -> Result<u64> {
        self.ensure_allowed("reset_all", &[Environment::Test])?;

        warn!(environment = %self.environment, "🧹 Resetting all database collections");

        let deleted = self
            .executor
            .run(|tx| {
                Box::pin(async move {
                    let mut total = 0;
                    for collection in RESET_ORDER {
                        let removed = tx.delete_all(collection).await?;
                        debug!(collection, removed, "Cleared collection");
                        total += removed;
                    }
                    Ok::<_, AppError>(total)
                })
            })
            .await?;

        info!(deleted, "✅ Database reset complete");
        Ok(deleted)
    }

    /// Insert the default records that are not present yet.
    ///
    /// Allowed in development and test. Returns how many records were
    /// actually inserted, so a second call reports 0.
    pub async fn seed_defaults(&self) -> Result<usize> {
        self.ensure_allowed("seed_defaults", &[Environment::Development, Environment::Test])?;

        let records = default_records()?;
        let total = records.len();

        let inserted = self
            .executor
            .run(|tx| {
                Box::pin(async move {
                    let mut inserted = 0;
                    for record in records {
                        if tx.find(record.collection, &record.id).await?.is_some() {
                            debug!(collection = record.collection, id = %record.id, "Seed record already present");
                            continue;
                        }
                        tx.insert(record.collection, &record.id, record.document).await?;
                        inserted += 1;
                    }
                    Ok::<_, AppError>(inserted)
                })
            })
            .await?;

        info!(inserted, skipped = total - inserted, "🌱 Seeded default records");
        Ok(inserted)
    }

    fn ensure_allowed(&self, operation: &'static str, allowed: &[Environment]) -> Result<()> {
        if allowed.contains(&self.environment) {
            return Ok(());
        }

        warn!(
            operation,
            environment = %self.environment,
            "Refusing maintenance operation"
        );
        Err(AppError::MaintenanceForbidden {
            operation,
            environment: self.environment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::health_monitor::MetricsRecorder;
    use crate::infrastructure::database::{InMemoryStore, StoreClient, TransactionOptions};
    use std::sync::Arc;

    async fn guard(environment: Environment) -> (Arc<InMemoryStore>, MaintenanceGuard) {
        let store = Arc::new(InMemoryStore::new());
        store.connect().await.unwrap();
        let executor = TransactionExecutor::new(
            store.clone() as Arc<dyn StoreClient>,
            Arc::new(MetricsRecorder::new()),
            TransactionOptions::default(),
        );
        (store, MaintenanceGuard::new(environment, executor))
    }

    #[tokio::test]
    async fn test_reset_refused_outside_test() {
        for environment in [Environment::Development, Environment::Staging, Environment::Production] {
            let (store, guard) = guard(environment).await;
            let calls = store.call_count();

            let err = guard.reset_all().await.unwrap_err();

            assert!(matches!(err, AppError::MaintenanceForbidden { operation: "reset_all", .. }));
            assert_eq!(store.call_count(), calls);
        }
    }

    #[tokio::test]
    async fn test_seed_refused_in_production() {
        let (store, guard) = guard(Environment::Production).await;
        let calls = store.call_count();

        let err = guard.seed_defaults().await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "seed_defaults is not permitted in the production environment"
        );
        assert_eq!(store.call_count(), calls);
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let (store, guard) = guard(Environment::Development).await;

        let first = guard.seed_defaults().await.unwrap();
        let second = guard.seed_defaults().await.unwrap();

        assert_eq!(first, default_records().unwrap().len());
        assert_eq!(second, 0);
        assert_eq!(store.documents("users").await.len(), 2);
    }

    #[tokio::test]
    async fn test_reset_clears_seeded_data() {
        let (store, guard) = guard(Environment::Test).await;
        let seeded = guard.seed_defaults().await.unwrap();

        let deleted = guard.reset_all().await.unwrap();

        assert_eq!(deleted as usize, seeded);
        for collection in RESET_ORDER {
            assert!(store.documents(collection).await.is_empty());
        }
    }
}
