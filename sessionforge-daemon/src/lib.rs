//! Sessionforge Daemon Library
//!
//! Wires the core components together from a [`DaemonConfig`] and exposes
//! them for testing and embedding in other applications.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use sessionforge_core::client::{ApiError, Transport};
use sessionforge_core::{ApiClient, CredentialStore, HealthMonitor, HttpTransport, Params};

pub mod config;

pub use config::{ApiConfig, DaemonConfig, load_config, load_config_from};

/// Assembled daemon components.
pub struct Daemon {
    store: Arc<CredentialStore>,
    client: Arc<ApiClient>,
    monitor: Arc<HealthMonitor>,
}

impl Daemon {
    /// Build every component from configuration.
    pub fn from_config(config: &DaemonConfig) -> Result<Self> {
        let store = Arc::new(CredentialStore::from_config(
            config.credentials.clone(),
            &config.probe,
        ));
        let transport = HttpTransport::new(&config.api.base_url, config.api.timeout())
            .context("Failed to create web API transport")?;

        Ok(Self::with_transport(config, store, Arc::new(transport)))
    }

    /// Build the daemon around an existing store and transport.
    pub fn with_transport(
        config: &DaemonConfig,
        store: Arc<CredentialStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let client = Arc::new(
            ApiClient::new(store.clone(), transport).with_max_attempts(config.api.max_attempts),
        );
        let monitor = Arc::new(HealthMonitor::new(store.clone(), config.health.clone()));

        Self {
            store,
            client,
            monitor,
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    /// Check that the current session is accepted by calling `auth.test`.
    pub async fn validate_session(&self) -> Result<Value, ApiError> {
        self.client.call_default("auth.test", &Params::new()).await
    }

    /// Validate the session, then run the health monitor until `shutdown` resolves.
    ///
    /// A failed validation is logged, not fatal: the monitor may still
    /// recover the session later.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        match self.validate_session().await {
            Ok(identity) => {
                let user = identity.get("user").and_then(Value::as_str).unwrap_or("unknown");
                let team = identity.get("team").and_then(Value::as_str).unwrap_or("unknown");
                tracing::info!(user, team, "Session validated");
            }
            Err(e) => {
                let failure = e.to_failure();
                tracing::warn!(
                    kind = ?failure.kind,
                    remediation = %failure.remediation,
                    "Session validation failed: {}",
                    failure.message
                );
            }
        }

        let handle = self.monitor.clone().spawn();
        tracing::info!("Daemon running");

        shutdown.await;
        tracing::info!("Shutdown signal received, stopping health monitor...");

        handle.stop().await;

        tracing::info!(status = ?self.monitor.status(), "Daemon stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("store", &self.store)
            .field("client", &self.client)
            .field("monitor", &self.monitor)
            .finish()
    }
}
