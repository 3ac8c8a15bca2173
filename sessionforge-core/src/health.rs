//! Credential health monitoring.
//!
//! The [`HealthMonitor`] periodically checks how old the current session
//! credentials are and renews them before they expire, so the first
//! user-visible call after a long idle period does not have to.
//!
//! Status progresses `missing → healthy → warning → critical` as credentials
//! age; any successful renewal moves it straight back to `healthy`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::credentials::CredentialStore;

/// Health of the current session credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// No credentials could be resolved.
    Missing,
    /// Credentials are fresh, or their age is unknown.
    Healthy,
    /// Credentials are old but still expected to work.
    Warning,
    /// Credentials are close to their expected expiry.
    Critical,
}

/// What happened to renewal during a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalOutcome {
    NotAttempted,
    Renewed,
    Failed,
}

/// Result of one health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    /// Assessment of the credentials found at the start of the check.
    pub status: HealthStatus,
    /// Age of those credentials, if known.
    pub age: Option<chrono::Duration>,
    pub renewal: RenewalOutcome,
}

/// Health monitor thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Seconds between checks.
    pub interval_secs: u64,
    /// Age in seconds after which credentials are reported as `warning`
    /// and proactively renewed.
    pub warning_after_secs: u64,
    /// Age in seconds after which credentials are reported as `critical`.
    pub critical_after_secs: u64,
    /// Minimum seconds between two renewal attempts.
    pub renewal_cooldown_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30 * 60,
            warning_after_secs: 6 * 60 * 60,
            critical_after_secs: 10 * 60 * 60,
            renewal_cooldown_secs: 60 * 60,
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn renewal_cooldown(&self) -> Duration {
        Duration::from_secs(self.renewal_cooldown_secs)
    }

    /// Classify credentials of the given age.
    pub fn classify(&self, age: Option<chrono::Duration>) -> HealthStatus {
        let Some(age) = age else {
            return HealthStatus::Healthy;
        };
        let secs = age.num_seconds().max(0) as u64;
        if secs >= self.critical_after_secs {
            HealthStatus::Critical
        } else if secs >= self.warning_after_secs {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }
}

#[derive(Debug)]
struct MonitorState {
    status: HealthStatus,
    last_renewal_attempt: Option<Instant>,
}

/// Periodic, detached credential freshness check.
pub struct HealthMonitor {
    store: Arc<CredentialStore>,
    config: HealthConfig,
    state: Mutex<MonitorState>,
    renewals: Mutex<watch::Receiver<Option<DateTime<Utc>>>>,
}

impl HealthMonitor {
    pub fn new(store: Arc<CredentialStore>, config: HealthConfig) -> Self {
        let renewals = Mutex::new(store.subscribe_renewals());
        Self {
            store,
            config,
            state: Mutex::new(MonitorState {
                status: HealthStatus::Missing,
                last_renewal_attempt: None,
            }),
            renewals,
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Status as of the most recent check or renewal.
    ///
    /// Renewals made through the store by anyone else (an API client
    /// recovering from an auth failure, a manual `renew`) count too.
    pub fn status(&self) -> HealthStatus {
        if self.observe_renewals() {
            self.record_renewal();
        }
        self.state.lock().status
    }

    /// Run one check: assess credential age and renew if due.
    ///
    /// When nothing is stored, extraction is attempted under the same
    /// cooldown as proactive renewal.
    pub async fn check(&self) -> HealthReport {
        // The assessment below supersedes any renewal seen so far.
        self.observe_renewals();

        let Some(pair) = self.store.resolve_stored().await else {
            self.state.lock().status = HealthStatus::Missing;
            tracing::warn!("Health check: no session credentials available");
            let renewal = if self.cooldown_elapsed() {
                self.attempt_renewal().await
            } else {
                RenewalOutcome::NotAttempted
            };
            return HealthReport {
                status: HealthStatus::Missing,
                age: None,
                renewal,
            };
        };

        let age = pair.age_at(Utc::now());
        let status = self.config.classify(age);
        self.state.lock().status = status;

        match status {
            HealthStatus::Healthy => {
                tracing::debug!(source = %pair.source(), "Health check: credentials healthy")
            }
            _ => tracing::warn!(
                source = %pair.source(),
                age_hours = age.map(|a| a.num_hours()).unwrap_or_default(),
                status = ?status,
                "Health check: credentials ageing"
            ),
        }

        let renewal = if status != HealthStatus::Healthy && self.cooldown_elapsed() {
            self.attempt_renewal().await
        } else {
            RenewalOutcome::NotAttempted
        };

        HealthReport {
            status,
            age,
            renewal,
        }
    }

    /// Record a renewal that happened outside the monitor.
    pub fn record_renewal(&self) {
        self.state.lock().status = HealthStatus::Healthy;
    }

    /// Start checking on the configured interval in a detached task.
    ///
    /// The first check runs immediately. The task ends when the returned
    /// handle is stopped or dropped.
    pub fn spawn(self: Arc<Self>) -> MonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let interval = self.config.interval();

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            tracing::info!(interval_secs = interval.as_secs(), "Credential health monitor started");

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        tracing::debug!("Credential health monitor shutdown signal received");
                        break;
                    }
                    _ = ticker.tick() => {
                        let report = self.check().await;
                        tracing::debug!(status = ?report.status, renewal = ?report.renewal, "Health check complete");
                    }
                }
            }

            tracing::info!("Credential health monitor stopped");
        });

        MonitorHandle {
            shutdown: Some(shutdown_tx),
            join: Some(join),
        }
    }

    /// Consume a pending renewal notification, if any.
    fn observe_renewals(&self) -> bool {
        let mut renewals = self.renewals.lock();
        match renewals.has_changed() {
            Ok(true) => {
                if let Some(at) = *renewals.borrow_and_update() {
                    tracing::debug!(renewed_at = %at, "Observed credential renewal");
                }
                true
            }
            _ => false,
        }
    }

    fn cooldown_elapsed(&self) -> bool {
        let state = self.state.lock();
        state
            .last_renewal_attempt
            .map(|at| at.elapsed() >= self.config.renewal_cooldown())
            .unwrap_or(true)
    }

    async fn attempt_renewal(&self) -> RenewalOutcome {
        if !self.store.is_renewal_available() {
            tracing::debug!("Credential renewal unavailable on this host");
            return RenewalOutcome::NotAttempted;
        }

        self.state.lock().last_renewal_attempt = Some(Instant::now());

        match self.store.renew().await {
            Some(_) => {
                tracing::info!("Proactive credential renewal succeeded");
                self.record_renewal();
                RenewalOutcome::Renewed
            }
            None => {
                tracing::warn!("Proactive credential renewal failed");
                RenewalOutcome::Failed
            }
        }
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish()
    }
}

/// Owner of a running monitor task.
///
/// Dropping the handle aborts the task, so a forgotten monitor never keeps
/// the runtime busy past shutdown.
#[derive(Debug)]
pub struct MonitorHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Signal the task to stop and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                if !e.is_cancelled() {
                    tracing::error!("Credential health monitor task failed: {}", e);
                }
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map(JoinHandle::is_finished).unwrap_or(true)
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}
