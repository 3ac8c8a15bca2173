//! Resilient web API client.
//!
//! [`ApiClient::call`] performs one named operation and absorbs the failure
//! classes that recovery can fix:
//!
//! - transient network errors: exponential backoff, bounded retries
//! - rate limiting: server-suggested backoff scaled by attempt, bounded retries
//! - rejected credentials: one renewal through the [`CredentialStore`], then
//!   exactly one more try
//!
//! Anything else comes back as a structured [`ApiError`].
//!
//! # Example
//!
//! ```rust,ignore
//! use sessionforge_core::client::{ApiClient, Params};
//!
//! let client = ApiClient::new(store, transport);
//! let identity = client.call_default("auth.test", &Params::new()).await?;
//! println!("connected as {}", identity["user"]);
//! ```

use std::sync::Arc;

use serde_json::Value;

use crate::credentials::CredentialStore;
use crate::model::CredentialPair;

mod error;
mod names;
mod retry;
mod transport;

pub use error::{ApiError, ApiFailure, ErrorKind};
pub use names::{DEFAULT_NAME_CACHE_CAPACITY, DEFAULT_NAME_CACHE_TTL, NameResolver};
pub use retry::{BackoffPolicy, DEFAULT_MAX_ATTEMPTS, RetryContext};
pub use transport::{
    ApiResponse, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT, HttpTransport, Params, Transport,
    TransportError,
};

/// Per-call options.
#[derive(Debug, Clone, Copy)]
pub struct CallContext {
    /// Renew and retry once when the platform rejects the credentials.
    pub retry_on_auth_failure: bool,
    pub retry: RetryContext,
}

impl CallContext {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            retry_on_auth_failure: true,
            retry: RetryContext::new(max_attempts),
        }
    }

    /// Same context with auth-failure renewal disabled.
    pub fn without_auth_retry(mut self) -> Self {
        self.retry_on_auth_failure = false;
        self
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

/// Web API client that retries through credential, network and rate-limit failures.
pub struct ApiClient {
    credentials: Arc<CredentialStore>,
    transport: Arc<dyn Transport>,
    backoff: BackoffPolicy,
    max_attempts: u32,
}

impl ApiClient {
    pub fn new(credentials: Arc<CredentialStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            credentials,
            transport,
            backoff: BackoffPolicy::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Call `operation` with the client's default context.
    pub async fn call_default(&self, operation: &str, params: &Params) -> Result<Value, ApiError> {
        self.call(operation, params, CallContext::new(self.max_attempts))
            .await
    }

    /// Call `operation`, retrying sequentially until it succeeds or a
    /// failure cannot be recovered.
    pub async fn call(
        &self,
        operation: &str,
        params: &Params,
        context: CallContext,
    ) -> Result<Value, ApiError> {
        let mut context = context;
        // After a renewal the fresh pair is used for the rest of the chain,
        // even if a higher-priority source still holds the stale one.
        let mut renewed: Option<CredentialPair> = None;

        loop {
            let credentials = match &renewed {
                Some(pair) => Some(pair.clone()),
                None => self.credentials.resolve(false).await,
            };
            let Some(credentials) = credentials else {
                tracing::warn!(operation, "No credentials available for call");
                return Err(ApiError::NoCredentials);
            };

            let attempt = context.retry.attempt;
            let outcome = self.transport.send(operation, params, &credentials).await;

            match outcome {
                Ok(ApiResponse::Ok(body)) => {
                    if attempt > 0 || renewed.is_some() {
                        tracing::info!(operation, retries = attempt, "Call recovered");
                    }
                    return Ok(body);
                }

                Err(e) if e.is_transient() => {
                    if !context.retry.can_retry() {
                        tracing::error!(operation, retries = attempt, "Network error, giving up: {}", e);
                        return Err(ApiError::TransientNetworkError {
                            message: e.message().to_string(),
                            attempts: attempt,
                        });
                    }
                    let delay = self.backoff.network_delay(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        max = context.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after network error: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    context.retry = context.retry.next();
                }

                Err(e) => {
                    tracing::error!(operation, "Request could not be sent: {}", e);
                    return Err(ApiError::Transport {
                        message: e.message().to_string(),
                    });
                }

                Ok(ApiResponse::RateLimited { retry_after }) => {
                    if !context.retry.can_retry() {
                        tracing::error!(operation, retries = attempt, "Still rate limited, giving up");
                        return Err(ApiError::RateLimited { attempts: attempt });
                    }
                    let delay = self.backoff.rate_limit_delay(retry_after, attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        max = context.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    context.retry = context.retry.next();
                }

                Ok(ApiResponse::AuthFailed { code }) => {
                    if renewed.is_some() {
                        tracing::error!(operation, code = %code, "Renewed credentials rejected");
                        return Err(ApiError::RenewedCredentialsRejected { code });
                    }
                    if !context.retry_on_auth_failure {
                        return Err(ApiError::AuthExpired {
                            hint: self.renewal_hint(),
                            code,
                        });
                    }

                    tracing::warn!(operation, code = %code, source = %credentials.source(), "Credentials rejected, renewing");
                    match self.credentials.renew().await {
                        Some(pair) => {
                            context.retry_on_auth_failure = false;
                            renewed = Some(pair);
                        }
                        None => {
                            tracing::error!(operation, "Credential renewal failed");
                            return Err(ApiError::AuthExpired {
                                hint: self.renewal_hint(),
                                code,
                            });
                        }
                    }
                }

                Ok(ApiResponse::Failed { code }) => {
                    tracing::debug!(operation, code = %code, "Remote error");
                    return Err(ApiError::RemoteError { code });
                }
            }
        }
    }

    fn renewal_hint(&self) -> String {
        if self.credentials.is_renewal_available() {
            "Automatic renewal did not produce new credentials; make sure the browser \
             is signed in to the workspace and can be automated, then retry"
                .to_string()
        } else {
            "Automatic renewal needs the credential extraction probe (macOS with a \
             signed-in browser); otherwise update SLACK_TOKEN/SLACK_COOKIE or the \
             credential file"
                .to_string()
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("backoff", &self.backoff)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}
