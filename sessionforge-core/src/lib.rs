//! # Sessionforge Core
//!
//! Session credential lifecycle and resilient web API access for a chat
//! platform whose private API is authenticated with a browser session token
//! and cookie.
//!
//! This crate provides:
//! - Atomic persistence for every piece of on-disk state
//! - A credential store resolving credentials from environment, file,
//!   secure store and on-demand extraction, with single-flight renewal
//! - An API client that retries through network errors, rate limits and
//!   expired credentials
//! - Bounded LRU/TTL caches for secondary lookups
//! - A health monitor that renews ageing credentials proactively
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sessionforge_core::{ApiClient, CredentialStore, CredentialStoreConfig, HttpTransport, Params, ProbeConfig};
//!
//! async fn whoami() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(CredentialStore::from_config(
//!         CredentialStoreConfig::default(),
//!         &ProbeConfig::default(),
//!     ));
//!     let transport = Arc::new(HttpTransport::new(sessionforge_core::client::DEFAULT_BASE_URL,
//!         sessionforge_core::client::DEFAULT_REQUEST_TIMEOUT)?);
//!     let client = ApiClient::new(store, transport);
//!     let identity = client.call_default("auth.test", &Params::new()).await?;
//!     println!("{}", identity["user"]);
//!     Ok(())
//! }
//! ```

pub mod atomic;
pub mod cache;
pub mod client;
pub mod credentials;
pub mod error;
pub mod health;
pub mod model;
pub mod probe;
pub mod store;

// Re-export commonly used types at crate root
pub use atomic::atomic_write;

pub use cache::{BoundedCache, DiscoveryCache};

pub use client::{
    ApiClient,
    ApiError,
    ApiResponse,
    CallContext,
    HttpTransport,
    NameResolver,
    Params,
    RetryContext,
    Transport,
};

pub use credentials::{
    CredentialError,
    CredentialStore,
    CredentialStoreConfig,
    RenewalGuard,
};

pub use error::SessionforgeError;

pub use health::{
    HealthConfig,
    HealthMonitor,
    HealthReport,
    HealthStatus,
    MonitorHandle,
};

pub use model::{
    CredentialPair,
    CredentialSource,
};

pub use probe::{
    CommandProbe,
    CredentialProbe,
    ProbeConfig,
    ProbeError,
};

pub use store::{
    MemoryStore,
    Secret,
    SecretStore,
    StoreError,
    create_secure_store,
};

#[cfg(feature = "keyring-store")]
pub use store::KeyringStore;
