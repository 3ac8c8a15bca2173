//! Top-level error types for Sessionforge.

use thiserror::Error;

use crate::client::ApiError;
use crate::credentials::CredentialError;
use crate::probe::ProbeError;
use crate::store::StoreError;

/// Top-level error type encompassing all Sessionforge errors.
#[derive(Debug, Error)]
pub enum SessionforgeError {
    /// Error from secure store operations.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error from credential persistence.
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Error from the extraction probe.
    #[error("probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Error from a web API call.
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}
