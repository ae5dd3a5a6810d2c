mod common;

use common::TestDatabase;
use project_store::config::Environment;
use project_store::domain::{default_records, RESET_ORDER};
use project_store::AppError;

#[tokio::test]
async fn test_reset_forbidden_outside_test_without_touching_store() {
    for environment in [Environment::Development, Environment::Staging, Environment::Production] {
        let db = TestDatabase::connected(environment).await;
        db.manager.maintenance().seed_defaults().await.ok();
        let calls = db.store.call_count();

        let err = db.manager.maintenance().reset_all().await.unwrap_err();

        assert!(matches!(err, AppError::MaintenanceForbidden { .. }));
        assert!(err.to_string().contains("not permitted"));
        assert_eq!(db.store.call_count(), calls);
        db.manager.stop().await;
    }
}

#[tokio::test]
async fn test_seed_forbidden_in_staging_and_production() {
    for environment in [Environment::Staging, Environment::Production] {
        let db = TestDatabase::connected(environment).await;
        let calls = db.store.call_count();

        let err = db.manager.maintenance().seed_defaults().await.unwrap_err();

        assert!(matches!(
            err,
            AppError::MaintenanceForbidden {
                operation: "seed_defaults",
                ..
            }
        ));
        assert_eq!(db.store.call_count(), calls);
        db.manager.stop().await;
    }
}

#[tokio::test]
async fn test_seed_twice_inserts_once() {
    let db = TestDatabase::connected(Environment::Development).await;
    let guard = db.manager.maintenance();

    let first = guard.seed_defaults().await.unwrap();
    let second = guard.seed_defaults().await.unwrap();

    assert_eq!(first, default_records().unwrap().len());
    assert_eq!(second, 0);
}

#[tokio::test]
async fn test_seed_fills_only_missing_records() {
    let db = TestDatabase::connected(Environment::Test).await;
    let guard = db.manager.maintenance();
    let total = guard.seed_defaults().await.unwrap();

    db.manager
        .transactions()
        .run(|tx| {
            Box::pin(async move {
                tx.delete("project_tasks", "seed-task-apollo-2").await?;
                Ok::<_, AppError>(())
            })
        })
        .await
        .unwrap();

    assert_eq!(guard.seed_defaults().await.unwrap(), 1);
    let stored: usize = {
        let mut n = 0;
        for collection in RESET_ORDER {
            n += db.store.documents(collection).await.len();
        }
        n
    };
    assert_eq!(stored, total);
}

#[tokio::test]
async fn test_reset_in_test_environment_empties_everything() {
    let db = TestDatabase::connected(Environment::Test).await;
    let guard = db.manager.maintenance();
    guard.seed_defaults().await.unwrap();

    let deleted = guard.reset_all().await.unwrap();

    assert_eq!(deleted as usize, default_records().unwrap().len());
    for collection in RESET_ORDER {
        assert!(db.store.documents(collection).await.is_empty());
    }
    assert_eq!(guard.reset_all().await.unwrap(), 0);
}
