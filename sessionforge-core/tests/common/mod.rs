//! Shared test doubles for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sessionforge_core::client::{ApiResponse, Params, Transport, TransportError};
use sessionforge_core::probe::{CredentialProbe, ExtractedCredentials, ProbeError};
use sessionforge_core::store::{MemoryStore, Secret, SecretStore};
use sessionforge_core::{CredentialPair, CredentialStore, CredentialStoreConfig};

/// Probe returning a fixed result after an optional delay, counting runs.
pub struct FakeProbe {
    calls: AtomicUsize,
    delay: Duration,
    result: Mutex<Option<(String, String)>>,
}

impl FakeProbe {
    pub fn returning(token: &str, cookie: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            result: Mutex::new(Some((token.to_string(), cookie.to_string()))),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            result: Mutex::new(None),
        })
    }

    pub fn slow(token: &str, cookie: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            result: Mutex::new(Some((token.to_string(), cookie.to_string()))),
        })
    }

    /// Make later extractions return the given pair.
    pub fn succeed(&self, token: &str, cookie: &str) {
        *self.result.lock() = Some((token.to_string(), cookie.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProbe for FakeProbe {
    fn is_available(&self) -> bool {
        true
    }

    async fn extract(&self) -> Result<ExtractedCredentials, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self.result.lock().clone();
        match result {
            Some((token, cookie)) => Ok(ExtractedCredentials {
                token: Secret::new(token),
                cookie: Secret::new(cookie),
            }),
            None => Err(ProbeError::Failed {
                status: "exit status: 1".to_string(),
                stderr: "browser not signed in".to_string(),
            }),
        }
    }
}

/// Transport replaying scripted outcomes and recording the tokens it saw.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<ApiResponse, TransportError>>>,
    tokens: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<ApiResponse, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            tokens: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        _operation: &str,
        _params: &Params,
        credentials: &CredentialPair,
    ) -> Result<ApiResponse, TransportError> {
        self.tokens
            .lock()
            .push(credentials.token().expose().to_string());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(ApiResponse::Ok(serde_json::json!({"ok": true}))))
    }
}

pub fn ok() -> Result<ApiResponse, TransportError> {
    Ok(ApiResponse::Ok(serde_json::json!({"ok": true, "user": "agent"})))
}

pub fn rate_limited(secs: u64) -> Result<ApiResponse, TransportError> {
    Ok(ApiResponse::RateLimited {
        retry_after: Some(Duration::from_secs(secs)),
    })
}

pub fn auth_failed() -> Result<ApiResponse, TransportError> {
    Ok(ApiResponse::AuthFailed {
        code: "invalid_auth".to_string(),
    })
}

pub fn connection_reset() -> Result<ApiResponse, TransportError> {
    Err(TransportError::transient("connection reset by peer"))
}

/// Config pointing at a temp directory and test-unique environment variables.
pub fn test_config(dir: &Path, env_prefix: &str) -> CredentialStoreConfig {
    CredentialStoreConfig {
        file: dir.join("credentials.json"),
        token_env: format!("{}_TOKEN", env_prefix),
        cookie_env: format!("{}_COOKIE", env_prefix),
        use_secure_store: true,
        service_name: "sessionforge-test".to_string(),
    }
}

pub fn build_store(
    config: CredentialStoreConfig,
    secure: Arc<MemoryStore>,
    probe: Arc<dyn CredentialProbe>,
) -> Arc<CredentialStore> {
    Arc::new(CredentialStore::new(config, secure, probe))
}

pub fn write_credential_file(path: &Path, token: &str, cookie: &str, updated_at: DateTime<Utc>) {
    let json = serde_json::json!({
        "token": token,
        "cookie": cookie,
        "updated_at": updated_at.to_rfc3339(),
    });
    std::fs::write(path, json.to_string()).unwrap();
}

pub async fn seed_secure_store(store: &MemoryStore, token: &str, cookie: &str) {
    let json = serde_json::json!({"token": token, "cookie": cookie, "updated_at": null});
    store
        .set("session", &Secret::new(json.to_string()))
        .await
        .unwrap();
}

pub fn set_env(key: &str, value: &str) {
    // SAFETY: each test uses its own variable names
    unsafe { std::env::set_var(key, value) };
}

pub fn remove_env(key: &str) {
    // SAFETY: each test uses its own variable names
    unsafe { std::env::remove_var(key) };
}
