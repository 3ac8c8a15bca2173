//! Credential resolution, persistence and renewal.
//!
//! [`CredentialStore`] resolves a usable [`CredentialPair`] from four sources,
//! in strict priority order, on every request:
//!
//! 1. Environment variables
//! 2. The credential file
//! 3. The platform secure store
//! 4. On-demand extraction through the [`CredentialProbe`]
//!
//! Extraction is single-flight: a [`RenewalGuard`] owned by the store makes
//! sure at most one probe run is in flight, and callers arriving while one is
//! running get `None` immediately instead of queueing.
//!
//! # Example
//!
//! ```rust,ignore
//! use sessionforge_core::{CredentialStore, CredentialStoreConfig};
//!
//! let store = CredentialStore::from_config(CredentialStoreConfig::default(), &probe_config);
//! if let Some(pair) = store.resolve(false).await {
//!     println!("using credentials from {}", pair.source());
//! }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::atomic::atomic_write;
use crate::model::{CredentialPair, CredentialRecord, CredentialSource, normalize_cookie};
use crate::probe::{CredentialProbe, ProbeConfig, create_probe};
use crate::store::{DEFAULT_SERVICE_NAME, Secret, SecretStore, create_secure_store};

/// Default environment variable holding the session token.
pub const DEFAULT_TOKEN_ENV: &str = "SLACK_TOKEN";

/// Default environment variable holding the session cookie.
pub const DEFAULT_COOKIE_ENV: &str = "SLACK_COOKIE";

/// Secure-store key under which the credential record is kept.
pub const SECURE_STORE_KEY: &str = "session";

/// Error type for credential persistence.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Reading or writing the credential file failed.
    #[error("credential file I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serializing the credential record failed.
    #[error("credential serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The probe returned credentials that do not look like session credentials.
    #[error("extracted credentials rejected: {reason}")]
    InvalidExtractedCredential { reason: String },
}

/// Credential store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialStoreConfig {
    /// Path of the JSON credential file.
    pub file: PathBuf,

    /// Environment variable holding the token.
    pub token_env: String,

    /// Environment variable holding the cookie.
    pub cookie_env: String,

    /// Whether to use the platform secure store where one exists.
    pub use_secure_store: bool,

    /// Service name for secure-store entries.
    pub service_name: String,
}

impl Default for CredentialStoreConfig {
    fn default() -> Self {
        Self {
            file: default_credential_path(),
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            cookie_env: DEFAULT_COOKIE_ENV.to_string(),
            use_secure_store: true,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

/// Default location of the credential file.
///
/// `~/.config/sessionforge/credentials.json` on Linux, the platform
/// equivalent elsewhere.
pub fn default_credential_path() -> PathBuf {
    directories::ProjectDirs::from("com", "raibid-labs", "sessionforge")
        .map(|dirs| dirs.config_dir().join("credentials.json"))
        .unwrap_or_else(|| PathBuf::from(".sessionforge").join("credentials.json"))
}

/// Single-flight guard for credential extraction.
///
/// [`try_acquire`](Self::try_acquire) never waits: it either hands out a
/// [`RenewalPermit`] or returns `None` because a renewal is already running.
/// The permit releases the guard when dropped, on every exit path.
#[derive(Debug, Default)]
pub struct RenewalGuard {
    in_flight: AtomicBool,
}

impl RenewalGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the guard if nobody holds it.
    pub fn try_acquire(&self) -> Option<RenewalPermit<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RenewalPermit { guard: self })
    }

    /// Whether a renewal currently holds the guard.
    pub fn is_held(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Proof of holding the [`RenewalGuard`]; releases it on drop.
#[derive(Debug)]
pub struct RenewalPermit<'a> {
    guard: &'a RenewalGuard,
}

impl Drop for RenewalPermit<'_> {
    fn drop(&mut self) {
        self.guard.in_flight.store(false, Ordering::Release);
    }
}

/// Multi-source credential resolver with single-flight renewal.
pub struct CredentialStore {
    config: CredentialStoreConfig,
    secure_store: Arc<dyn SecretStore>,
    probe: Arc<dyn CredentialProbe>,
    renewal: RenewalGuard,
    // write time of the most recent successful renewal
    renewed: watch::Sender<Option<DateTime<Utc>>>,
}

impl CredentialStore {
    /// Create a store from explicit collaborators.
    pub fn new(
        config: CredentialStoreConfig,
        secure_store: Arc<dyn SecretStore>,
        probe: Arc<dyn CredentialProbe>,
    ) -> Self {
        Self {
            config,
            secure_store,
            probe,
            renewal: RenewalGuard::new(),
            renewed: watch::channel(None).0,
        }
    }

    /// Create a store, selecting the secure store and probe for this platform.
    pub fn from_config(config: CredentialStoreConfig, probe: &ProbeConfig) -> Self {
        let secure_store = create_secure_store(config.use_secure_store, &config.service_name);
        let probe = create_probe(probe);
        Self::new(config, secure_store, probe)
    }

    /// Path of the credential file.
    pub fn credential_file(&self) -> &Path {
        &self.config.file
    }

    /// Whether renewal through extraction is possible on this host.
    pub fn is_renewal_available(&self) -> bool {
        self.probe.is_available()
    }

    /// Whether a renewal is currently running.
    pub fn is_renewing(&self) -> bool {
        self.renewal.is_held()
    }

    /// Subscribe to successful renewals, whoever triggered them.
    ///
    /// The channel carries the write time of the latest renewed pair.
    pub fn subscribe_renewals(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.renewed.subscribe()
    }

    /// Resolve a usable credential pair.
    ///
    /// Sources are consulted in priority order and the first usable pair
    /// wins. With `force_renewal`, the stored sources are skipped and
    /// extraction is attempted directly.
    pub async fn resolve(&self, force_renewal: bool) -> Option<CredentialPair> {
        if !force_renewal {
            if let Some(pair) = self.resolve_stored().await {
                return Some(pair);
            }
        }

        if !self.probe.is_available() {
            tracing::debug!("No stored credentials and extraction unavailable");
            return None;
        }

        self.renew().await
    }

    /// Resolve from environment, file or secure store, never extracting.
    pub async fn resolve_stored(&self) -> Option<CredentialPair> {
        if let Some(pair) = self.from_environment() {
            return Some(pair);
        }
        if let Some(pair) = self.from_file() {
            return Some(pair);
        }
        self.from_secure_store().await
    }

    /// Extract, validate and persist fresh credentials.
    ///
    /// Returns `None` without waiting if another renewal is in flight, or if
    /// extraction fails or yields malformed credentials.
    pub async fn renew(&self) -> Option<CredentialPair> {
        let Some(_permit) = self.renewal.try_acquire() else {
            tracing::debug!("Credential renewal already in progress, not waiting");
            return None;
        };

        tracing::info!("Renewing session credentials");

        let extracted = match self.probe.extract().await {
            Ok(extracted) => extracted,
            Err(e) => {
                tracing::warn!("Credential extraction failed: {}", e);
                return None;
            }
        };

        let pair = match validate_extracted(
            extracted.token.expose(),
            extracted.cookie.expose(),
        ) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!("{}", e);
                return None;
            }
        };

        if let Err(e) = self.persist(&pair).await {
            // The fresh pair is still usable for this process.
            tracing::error!("Failed to persist renewed credentials: {}", e);
        }

        self.renewed.send_replace(pair.updated_at());
        tracing::info!("Session credentials renewed");
        Some(pair)
    }

    /// Persist a pair to the credential file and, best effort, the secure store.
    pub async fn persist(&self, pair: &CredentialPair) -> Result<(), CredentialError> {
        let record = pair.to_record();
        let json = serde_json::to_string_pretty(&record)?;

        atomic_write(&self.config.file, json.as_bytes())?;
        tracing::debug!(path = %self.config.file.display(), "Credentials written to file");

        if self.secure_store.is_available() {
            self.write_secure_store(&json).await;
        }

        Ok(())
    }

    /// Remove persisted credentials from the file and the secure store.
    pub async fn clear(&self) -> Result<(), CredentialError> {
        match fs::remove_file(&self.config.file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self.secure_store.delete(SECURE_STORE_KEY).await {
            tracing::warn!("Failed to clear secure store entry: {}", e);
        }

        tracing::info!("Persisted credentials cleared");
        Ok(())
    }

    async fn write_secure_store(&self, json: &str) {
        // The keychain cannot replace an item atomically: delete first.
        if let Err(e) = self.secure_store.delete(SECURE_STORE_KEY).await {
            tracing::warn!("Failed to remove previous secure store entry: {}", e);
        }
        match self.secure_store.set(SECURE_STORE_KEY, &Secret::new(json)).await {
            Ok(()) => tracing::debug!("Credentials written to secure store"),
            Err(e) => tracing::warn!("Failed to write credentials to secure store: {}", e),
        }
    }

    fn from_environment(&self) -> Option<CredentialPair> {
        let token = std::env::var(&self.config.token_env).ok()?;
        let cookie = std::env::var(&self.config.cookie_env).ok()?;

        let pair = CredentialPair::new(
            token,
            normalize_cookie(&cookie),
            CredentialSource::Environment,
            None,
        )?;
        tracing::trace!("Using credentials from environment");
        Some(pair)
    }

    fn from_file(&self) -> Option<CredentialPair> {
        let path = &self.config.file;
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to read credential file: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<CredentialRecord>(&contents) {
            Ok(record) => record.into_pair(CredentialSource::File),
            Err(e) => {
                tracing::warn!(path = %path.display(), "Ignoring malformed credential file: {}", e);
                None
            }
        }
    }

    async fn from_secure_store(&self) -> Option<CredentialPair> {
        if !self.secure_store.is_available() {
            return None;
        }

        let secret = match self.secure_store.get(SECURE_STORE_KEY).await {
            Ok(secret) => secret?,
            Err(e) => {
                tracing::warn!("Secure store lookup failed: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<CredentialRecord>(secret.expose()) {
            Ok(record) => record.into_pair(CredentialSource::SecureStore),
            Err(e) => {
                tracing::warn!("Ignoring malformed secure store entry: {}", e);
                None
            }
        }
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("file", &self.config.file)
            .field("secure_store", &self.secure_store.is_available())
            .field("renewal_available", &self.probe.is_available())
            .finish()
    }
}

/// Check extracted credentials against the platform's credential shape.
fn validate_extracted(token: &str, cookie: &str) -> Result<CredentialPair, CredentialError> {
    let pair = CredentialPair::new(
        token,
        normalize_cookie(cookie),
        CredentialSource::Extracted,
        Some(Utc::now()),
    )
    .ok_or_else(|| CredentialError::InvalidExtractedCredential {
        reason: "token or cookie is empty".to_string(),
    })?;

    if !pair.has_expected_shape() {
        return Err(CredentialError::InvalidExtractedCredential {
            reason: "token or cookie does not match the expected prefix".to_string(),
        });
    }

    Ok(pair)
}
