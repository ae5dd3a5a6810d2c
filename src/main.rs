use anyhow::Context;
use project_store::config::DatabaseSettings;
use project_store::infrastructure::database::{
    tracing_query_hook, ConnectionManager, InMemoryStore, MongoStoreClient, StoreClient,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn build_store(settings: &DatabaseSettings) -> Arc<dyn StoreClient> {
    let hook = settings.log_queries.then(tracing_query_hook);

    if settings.uses_memory_store() {
        let store = InMemoryStore::new();
        return match hook {
            Some(hook) => Arc::new(store.with_query_hook(hook)),
            None => Arc::new(store),
        };
    }

    let store = MongoStoreClient::new(
        settings.url.clone(),
        settings.database_name.clone(),
        settings.connect_timeout(),
    );
    match hook {
        Some(hook) => Arc::new(store.with_query_hook(hook)),
        None => Arc::new(store),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = DatabaseSettings::from_env().context("Failed to load database settings")?;
    info!(?settings, "Loaded database settings");

    let store = build_store(&settings);
    let manager = ConnectionManager::new(store, settings);

    manager
        .start()
        .await
        .context("Database connection manager failed to start")?;

    let metrics = manager.health_metrics().await;
    info!("📊 Health: {}", serde_json::to_string(&metrics)?);

    shutdown_signal().await;

    manager.stop().await;
    Ok(())
}
