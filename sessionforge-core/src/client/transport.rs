//! Wire transport for the chat platform's web API.
//!
//! A [`Transport`] performs exactly one request and classifies the outcome
//! into an [`ApiResponse`]; retrying is the client's job.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{COOKIE, RETRY_AFTER};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::model::CredentialPair;

/// Default web API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://slack.com/api/";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error codes meaning the session itself is no longer accepted.
const AUTH_ERROR_CODES: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "token_expired",
    "token_revoked",
    "account_inactive",
];

/// Error codes meaning the caller is being throttled.
const RATE_LIMIT_CODES: &[&str] = &["ratelimited", "rate_limited"];

/// Form parameters of one operation.
pub type Params = BTreeMap<String, String>;

/// Outcome of a request that reached the platform.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// `ok: true`; carries the whole response body.
    Ok(Value),
    /// HTTP 429 or a rate-limit error code.
    RateLimited { retry_after: Option<Duration> },
    /// The session credentials were refused.
    AuthFailed { code: String },
    /// Any other application-level error.
    Failed { code: String },
}

impl ApiResponse {
    /// Classify a response from its status, `Retry-After` value and body.
    pub fn classify(status: u16, retry_after: Option<Duration>, body: Option<Value>) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS.as_u16() {
            return Self::RateLimited { retry_after };
        }

        if let Some(body) = body {
            if body.get("ok").and_then(Value::as_bool) == Some(true) {
                return Self::Ok(body);
            }

            if let Some(code) = body.get("error").and_then(Value::as_str) {
                if RATE_LIMIT_CODES.contains(&code) {
                    return Self::RateLimited { retry_after };
                }
                if AUTH_ERROR_CODES.contains(&code) {
                    return Self::AuthFailed {
                        code: code.to_string(),
                    };
                }
                return Self::Failed {
                    code: code.to_string(),
                };
            }
        }

        if status == StatusCode::UNAUTHORIZED.as_u16() {
            return Self::AuthFailed {
                code: "http_401".to_string(),
            };
        }

        Self::Failed {
            code: if (200..300).contains(&status) {
                "invalid_response".to_string()
            } else {
                format!("http_{}", status)
            },
        }
    }
}

/// A request that never produced a response.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    transient: bool,
}

impl TransportError {
    /// A failure worth retrying (connection refused, timeout, reset, ...).
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }

    /// A failure retrying cannot fix (bad URL, client misconfiguration, ...).
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        // Connect, timeout, send and body failures are transient; builder,
        // redirect and decode failures are not.
        let transient = e.is_connect() || e.is_timeout() || e.is_request() || e.is_body();
        Self {
            message: e.to_string(),
            transient,
        }
    }
}

/// Sends one named operation with the given credentials.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        operation: &str,
        params: &Params,
        credentials: &CredentialPair,
    ) -> Result<ApiResponse, TransportError>;
}

/// HTTP transport: `POST {base_url}{operation}` with form-encoded params.
///
/// The token is sent as a bearer token and the cookie as `d=<cookie>`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| TransportError::permanent(format!("invalid base URL {}: {}", base, e)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::permanent(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        operation: &str,
        params: &Params,
        credentials: &CredentialPair,
    ) -> Result<ApiResponse, TransportError> {
        let url = self.base_url.join(operation).map_err(|e| {
            TransportError::permanent(format!("invalid operation {}: {}", operation, e))
        })?;

        let response = self
            .client
            .post(url)
            .bearer_auth(credentials.token().expose())
            .header(COOKIE, format!("d={}", credentials.secret().expose()))
            .form(params)
            .send()
            .await?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        // The request was delivered; losing the body mid-read is a network fault.
        let text = response.text().await.map_err(|e| {
            TransportError::transient(format!("failed to read response body: {}", e))
        })?;
        let body = serde_json::from_str::<Value>(&text).ok();

        tracing::trace!(operation, status, "web API response received");
        Ok(ApiResponse::classify(status, retry_after, body))
    }
}
