//! Secure secret storage abstraction.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`SecretStore`] - Capability trait for platform secret storage backends
//! - [`MemoryStore`] - In-memory implementation for testing
//! - [`UnavailableStore`] - Always-unavailable implementation for unsupported platforms
//! - [`KeyringStore`] - macOS keychain implementation (with `keyring-store` feature)
//! - [`create_secure_store`] - Selects the backend once, at startup
//!
//! The secure store is a secondary persistence target for the session
//! credentials. Every consumer treats it as best effort: a failing backend is
//! logged and skipped, never propagated.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

mod memory;
mod unavailable;
#[cfg(feature = "keyring-store")]
mod keyring;

pub use memory::MemoryStore;
pub use unavailable::UnavailableStore;
#[cfg(feature = "keyring-store")]
pub use keyring::KeyringStore;

/// Service name used for secure-store entries.
pub const DEFAULT_SERVICE_NAME: &str = "sessionforge";

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the buffer is zeroed when the secret is dropped.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret holds an empty (or whitespace-only) value.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Error type for secure store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Access to the secret was denied.
    #[error("access denied to secret: {key}")]
    AccessDenied { key: String },

    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// No secure store exists on this platform.
    #[error("secure store not available: {message}")]
    Unavailable { message: String },
}

/// Abstraction over platform secret storage.
///
/// Implementations include:
/// - [`MemoryStore`] - In-memory storage for testing
/// - [`UnavailableStore`] - Placeholder on platforms without a secure store
/// - [`KeyringStore`] (with `keyring-store` feature) - macOS keychain
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Whether this backend can actually persist secrets.
    fn is_available(&self) -> bool {
        true
    }

    /// Retrieve a secret by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError>;

    /// Store a secret at the given key.
    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError>;

    /// Delete a secret by key.
    ///
    /// Returns `Ok(())` even if the key didn't exist.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Select the secure store backend for this process.
///
/// The keychain is only used on macOS, and only when `enabled` is set and the
/// `keyring-store` feature is compiled in. Every other combination yields an
/// [`UnavailableStore`], so callers never branch on the platform themselves.
pub fn create_secure_store(enabled: bool, service_name: &str) -> Arc<dyn SecretStore> {
    if !enabled {
        tracing::debug!("Secure store disabled by configuration");
        return Arc::new(UnavailableStore::new("disabled by configuration"));
    }

    #[cfg(all(feature = "keyring-store", target_os = "macos"))]
    {
        match KeyringStore::try_new(service_name) {
            Ok(store) => {
                tracing::info!("Using macOS keychain as secure credential store");
                return Arc::new(store);
            }
            Err(e) => {
                tracing::warn!("Keychain unavailable ({}), continuing without secure store", e);
            }
        }
    }

    #[cfg(not(all(feature = "keyring-store", target_os = "macos")))]
    tracing::debug!(
        service = service_name,
        "No secure store on this platform, credentials persist to file only"
    );

    Arc::new(UnavailableStore::new("not supported on this platform"))
}
