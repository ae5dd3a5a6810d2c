use crate::config::DatabaseSettings;
use crate::error::{sanitize, sanitize_message, AppError, Result, RetryAttempt, RetryPolicy, StoreErrorKind};
use crate::infrastructure::database::health_monitor::{
    ConnectionStatus, HealthMetrics, HealthMonitor, HealthStatus, LivenessProbe, MetricsRecorder,
};
use crate::infrastructure::database::maintenance::MaintenanceGuard;
use crate::infrastructure::database::store::StoreClient;
use crate::infrastructure::database::transaction_manager::TransactionExecutor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Lifecycle of the shared store connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Degraded,
    /// Startup gave up after exhausting its attempts
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Owns the single process-wide store connection.
///
/// Only this type opens or closes the connection and only it (together with
/// the executors it hands out) writes the health metrics.
pub struct ConnectionManager {
    store: Arc<dyn StoreClient>,
    settings: DatabaseSettings,
    retry_policy: RetryPolicy,
    state: Arc<RwLock<ConnectionState>>,
    metrics: Arc<MetricsRecorder>,
    monitor: HealthMonitor,
    last_attempts: Mutex<Vec<RetryAttempt>>,
    connect_lock: tokio::sync::Mutex<()>,
}

impl ConnectionManager {
    pub fn new(store: Arc<dyn StoreClient>, settings: DatabaseSettings) -> Self {
        let retry_policy = settings.retry_policy();
        let monitor = HealthMonitor::new(settings.health_check_interval());

        Self {
            store,
            settings,
            retry_policy,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            metrics: Arc::new(MetricsRecorder::new()),
            monitor,
            last_attempts: Mutex::new(Vec::new()),
            connect_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn monitor(&self) -> &HealthMonitor {
        &self.monitor
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Validate settings and connect. Call before accepting traffic.
    pub async fn start(&self) -> Result<()> {
        self.settings.validate()?;
        info!(
            environment = %self.settings.environment,
            store = self.store.name(),
            "🚀 Starting database connection manager..."
        );
        self.connect().await?;
        info!("✅ Database connection manager started");
        Ok(())
    }

    /// Disconnect. Call after the process stopped accepting traffic.
    pub async fn stop(&self) {
        info!("🛑 Stopping database connection manager...");
        self.disconnect().await;
        info!("✅ Database connection manager stopped");
    }

    /// Connect with retries.
    ///
    /// Attempts run strictly one after another. A non-retriable error ends the
    /// loop at once; the returned error only reports the attempt count.
    /// Concurrent callers wait for the sequence in flight and share its result
    /// once it has connected.
    pub async fn connect(&self) -> Result<()> {
        let _sequence = self.connect_lock.lock().await;
        {
            let mut state = self.state.write().await;
            if matches!(*state, ConnectionState::Connected | ConnectionState::Degraded) {
                debug!("Database already connected");
                return Ok(());
            }
            *state = ConnectionState::Connecting;
        }

        info!(store = self.store.name(), "🔄 Connecting to database...");

        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempts = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match self.try_connect().await {
                Ok(latency) => {
                    let status = self
                        .metrics
                        .record_probe(latency, self.settings.healthy_threshold())
                        .await;
                    *self.state.write().await = if status == HealthStatus::Healthy {
                        ConnectionState::Connected
                    } else {
                        ConnectionState::Degraded
                    };
                    self.store_attempts(attempts);

                    info!(
                        attempt,
                        response_time_ms = latency.as_millis() as u64,
                        "✅ Successfully connected to database!"
                    );

                    if self.settings.environment.is_production() && self.settings.health_check_enabled {
                        self.monitor.start(self.probe());
                    }
                    return Ok(());
                }
                Err(e) => e,
            };

            let retriable = self.retry_policy.is_retriable(&error);
            let delay = (retriable && attempt < max_attempts).then(|| self.retry_policy.next_delay(attempt));
            let record = RetryAttempt {
                attempt_number: attempt,
                error: sanitize(&error),
                delay_ms: delay.map(|d| d.as_millis() as u64),
            };

            warn!(
                attempt,
                max_attempts,
                retriable,
                delay_ms = ?record.delay_ms,
                error = %record.error,
                "⚠️ Database connection attempt failed"
            );

            let final_error = record.error.to_string();
            attempts.push(record);

            match delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => {
                    *self.state.write().await = ConnectionState::Failed;
                    self.metrics.mark_unhealthy().await;
                    self.metrics.record_error(final_error.clone()).await;
                    self.store_attempts(attempts);

                    error!(
                        attempts = attempt,
                        error = %final_error,
                        "❌ Failed to connect to database"
                    );
                    return Err(AppError::ConnectionError { attempts: attempt });
                }
            }
        }
    }

    /// Stop monitoring and release the connection. Never fails.
    pub async fn disconnect(&self) {
        self.monitor.stop().await;

        if let Err(e) = self.store.disconnect().await {
            error!(
                error = %sanitize_message(&e.to_string()),
                "Failed to disconnect from database cleanly"
            );
        }

        *self.state.write().await = ConnectionState::Disconnected;
        self.metrics.mark_unhealthy().await;
        info!("Database disconnected");
    }

    /// Probe once and update the metrics. True only for a fast, successful probe.
    pub async fn is_healthy(&self) -> bool {
        self.probe().check().await == HealthStatus::Healthy
    }

    /// Lightweight probe for liveness endpoints. Never fails.
    pub async fn connection_status(&self) -> ConnectionStatus {
        self.probe().connection_status().await
    }

    pub async fn health_metrics(&self) -> HealthMetrics {
        self.metrics.snapshot().await
    }

    /// Attempts made by the most recent `connect` call.
    pub fn last_connect_attempts(&self) -> Vec<RetryAttempt> {
        self.last_attempts
            .lock()
            .map(|attempts| attempts.clone())
            .unwrap_or_default()
    }

    pub fn transactions(&self) -> TransactionExecutor {
        TransactionExecutor::new(
            Arc::clone(&self.store),
            Arc::clone(&self.metrics),
            self.settings.transaction_defaults(),
        )
    }

    pub fn maintenance(&self) -> MaintenanceGuard {
        MaintenanceGuard::new(self.settings.environment, self.transactions())
    }

    /// One physical attempt: connect, then ping. Returns the ping latency.
    async fn try_connect(&self) -> Result<Duration> {
        let timeout = self.settings.connect_timeout();

        let attempt = async {
            self.store.connect().await?;
            let started = Instant::now();
            match self.store.ping().await {
                Ok(()) => Ok(started.elapsed()),
                Err(e) => {
                    if let Err(cleanup) = self.store.disconnect().await {
                        debug!(
                            error = %sanitize_message(&cleanup.to_string()),
                            "Cleanup after failed probe did not succeed"
                        );
                    }
                    Err(e)
                }
            }
        };

        match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(AppError::store(
                StoreErrorKind::TimedOut,
                format!("connection attempt timed out after {}ms", timeout.as_millis()),
            )),
        }
    }

    fn probe(&self) -> LivenessProbe {
        LivenessProbe {
            store: Arc::clone(&self.store),
            metrics: Arc::clone(&self.metrics),
            state: Arc::clone(&self.state),
            threshold: self.settings.healthy_threshold(),
        }
    }

    fn store_attempts(&self, attempts: Vec<RetryAttempt>) {
        if let Ok(mut last) = self.last_attempts.lock() {
            *last = attempts;
        }
    }
}
