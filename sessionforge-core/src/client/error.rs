//! Errors surfaced by the API client.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of one logical API call.
///
/// Transient classes (`RateLimited`, `TransientNetworkError`) only appear
/// after the retry budget is spent; `AuthExpired` only after renewal failed.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No credential source produced a usable pair.
    #[error("no session credentials available")]
    NoCredentials,

    /// The session was rejected and could not be renewed.
    #[error("session credentials rejected ({code}): {hint}")]
    AuthExpired { code: String, hint: String },

    /// Renewal produced new credentials, but the platform rejected those too.
    #[error("renewed session credentials were rejected ({code})")]
    RenewedCredentialsRejected { code: String },

    /// Still rate limited after every retry.
    #[error("rate limited after {attempts} retries")]
    RateLimited { attempts: u32 },

    /// A transient network failure persisted through every retry.
    #[error("network error after {attempts} retries: {message}")]
    TransientNetworkError { message: String, attempts: u32 },

    /// The request could not be sent and retrying would not help.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The platform rejected the call itself.
    #[error("remote error: {code}")]
    RemoteError { code: String },
}

/// Coarse classification of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoCredentials,
    AuthExpired,
    RenewedCredentialsRejected,
    RateLimited,
    TransientNetworkError,
    Transport,
    RemoteError,
}

/// Serializable failure report for a dispatcher to hand back to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub remediation: String,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoCredentials => ErrorKind::NoCredentials,
            Self::AuthExpired { .. } => ErrorKind::AuthExpired,
            Self::RenewedCredentialsRejected { .. } => ErrorKind::RenewedCredentialsRejected,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::TransientNetworkError { .. } => ErrorKind::TransientNetworkError,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::RemoteError { .. } => ErrorKind::RemoteError,
        }
    }

    /// Human-readable next step for whoever sees the failure.
    pub fn remediation(&self) -> String {
        match self {
            Self::NoCredentials => "Provide session credentials via SLACK_TOKEN/SLACK_COOKIE, \
                 the credential file, or run credential extraction"
                .to_string(),
            Self::AuthExpired { hint, .. } => hint.clone(),
            Self::RenewedCredentialsRejected { .. } => "Freshly extracted credentials were refused; \
                 sign in to the workspace in the browser again, then retry"
                .to_string(),
            Self::RateLimited { .. } => "Wait before issuing more requests".to_string(),
            Self::TransientNetworkError { .. } => {
                "Check network connectivity and retry".to_string()
            }
            Self::Transport { .. } => "Check the API base URL configuration".to_string(),
            Self::RemoteError { .. } => {
                "The platform rejected the request; check the operation and its parameters"
                    .to_string()
            }
        }
    }

    /// Structured report of this failure.
    pub fn to_failure(&self) -> ApiFailure {
        ApiFailure {
            kind: self.kind(),
            message: self.to_string(),
            remediation: self.remediation(),
        }
    }
}
