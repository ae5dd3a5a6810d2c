use crate::error::sanitize_message;
use crate::infrastructure::database::connection_manager::ConnectionState;
use crate::infrastructure::database::store::StoreClient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Process-wide connection health, as exposed to `/health` style consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub last_successful_probe: Option<DateTime<Utc>>,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

impl Default for HealthMetrics {
    fn default() -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            response_time_ms: 0,
            last_successful_probe: None,
            error_count: 0,
            last_error: None,
            last_error_at: None,
        }
    }
}

/// Result of a lightweight liveness check. Never carries an unsanitized error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub response_time_ms: u64,
    pub last_check: DateTime<Utc>,
    pub error: Option<String>,
}

/// Single writer for [`HealthMetrics`]. Readers only ever get a copy.
#[derive(Debug, Default)]
pub(crate) struct MetricsRecorder {
    inner: RwLock<HealthMetrics>,
}

impl MetricsRecorder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn snapshot(&self) -> HealthMetrics {
        self.inner.read().await.clone()
    }

    /// Record a successful probe and return the status it implies.
    pub(crate) async fn record_probe(&self, latency: Duration, threshold: Duration) -> HealthStatus {
        let status = if latency < threshold {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        let mut metrics = self.inner.write().await;
        metrics.status = status;
        metrics.response_time_ms = latency.as_millis() as u64;
        metrics.last_successful_probe = Some(Utc::now());
        status
    }

    pub(crate) async fn record_probe_failure(&self, latency: Duration, sanitized_error: String) {
        let mut metrics = self.inner.write().await;
        metrics.status = HealthStatus::Unhealthy;
        metrics.response_time_ms = latency.as_millis() as u64;
        Self::push_error(&mut metrics, sanitized_error);
    }

    /// Count a failure that did not come from a probe. Status is left alone.
    pub(crate) async fn record_error(&self, sanitized_error: String) {
        let mut metrics = self.inner.write().await;
        Self::push_error(&mut metrics, sanitized_error);
    }

    pub(crate) async fn mark_unhealthy(&self) {
        self.inner.write().await.status = HealthStatus::Unhealthy;
    }

    fn push_error(metrics: &mut HealthMetrics, sanitized_error: String) {
        metrics.error_count += 1;
        metrics.last_error = Some(sanitized_error);
        metrics.last_error_at = Some(Utc::now());
    }
}

/// Everything a probe needs, bundled so the background task can own a copy.
#[derive(Clone)]
pub(crate) struct LivenessProbe {
    pub(crate) store: Arc<dyn StoreClient>,
    pub(crate) metrics: Arc<MetricsRecorder>,
    pub(crate) state: Arc<RwLock<ConnectionState>>,
    pub(crate) threshold: Duration,
}

impl LivenessProbe {
    /// Ping the store, update the metrics and the connection state.
    pub(crate) async fn check(&self) -> HealthStatus {
        let started = Instant::now();
        let result = self.store.ping().await;
        let latency = started.elapsed();

        let status = match result {
            Ok(()) => self.metrics.record_probe(latency, self.threshold).await,
            Err(e) => {
                let sanitized = sanitize_message(&e.to_string());
                debug!(error = %sanitized, "Liveness probe failed");
                self.metrics.record_probe_failure(latency, sanitized).await;
                HealthStatus::Unhealthy
            }
        };

        let mut state = self.state.write().await;
        if matches!(*state, ConnectionState::Connected | ConnectionState::Degraded) {
            *state = if status == HealthStatus::Healthy {
                ConnectionState::Connected
            } else {
                ConnectionState::Degraded
            };
        }

        status
    }

    /// Ping without touching the shared metrics.
    pub(crate) async fn connection_status(&self) -> ConnectionStatus {
        let started = Instant::now();
        let result = self.store.ping().await;
        let response_time_ms = started.elapsed().as_millis() as u64;

        ConnectionStatus {
            is_connected: result.is_ok(),
            response_time_ms,
            last_check: Utc::now(),
            error: result.err().map(|e| sanitize_message(&e.to_string())),
        }
    }
}

struct MonitorTask {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// Periodic liveness probing on a background task.
pub struct HealthMonitor {
    interval: Duration,
    task: Mutex<Option<MonitorTask>>,
}

impl HealthMonitor {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            task: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.lock_task()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Spawn the probe loop. Starting a running monitor is a no-op.
    pub(crate) fn start(&self, probe: LivenessProbe) {
        let mut task = self.lock_task();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            warn!("Database health monitoring is already running");
            return;
        }

        info!(
            interval_ms = self.interval.as_millis() as u64,
            "🚀 Starting database health monitoring..."
        );

        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(Self::monitor_loop(
            probe,
            self.interval,
            Arc::clone(&shutdown),
        ));
        *task = Some(MonitorTask { shutdown, handle });
    }

    /// Cancel the loop and wait for it to exit. No probe runs after this returns.
    pub async fn stop(&self) {
        let task = self.lock_task().take();
        let Some(task) = task else {
            return;
        };

        info!("🛑 Stopping database health monitoring...");
        task.shutdown.notify_one();
        if let Err(e) = task.handle.await {
            if !e.is_cancelled() {
                error!("Health monitor task ended abnormally: {}", e);
            }
        }
        info!("✅ Database health monitoring stopped");
    }

    async fn monitor_loop(probe: LivenessProbe, period: Duration, shutdown: Arc<Notify>) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                _ = ticker.tick() => {
                    let status = probe.check().await;
                    let metrics = probe.metrics.snapshot().await;
                    match status {
                        HealthStatus::Healthy => info!(
                            response_time_ms = metrics.response_time_ms,
                            error_count = metrics.error_count,
                            "Database health check: healthy"
                        ),
                        HealthStatus::Degraded => warn!(
                            response_time_ms = metrics.response_time_ms,
                            threshold_ms = probe.threshold.as_millis() as u64,
                            "Database health check: degraded"
                        ),
                        HealthStatus::Unhealthy => error!(
                            error_count = metrics.error_count,
                            last_error = metrics.last_error.as_deref().unwrap_or("-"),
                            "Database health check: unhealthy"
                        ),
                    }
                }
            }
        }
    }

    fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<MonitorTask>> {
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.lock_task().take() {
            task.handle.abort();
        }
    }
}
