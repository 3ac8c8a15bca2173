//! Integration tests for the resilient API client.
//!
//! Time is paused so backoff delays can be asserted without waiting.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::*;
use sessionforge_core::client::{
    ApiClient, ApiError, ApiResponse, BackoffPolicy, CallContext, ErrorKind, NameResolver,
    Params, TransportError,
};
use sessionforge_core::probe::UnavailableProbe;
use sessionforge_core::store::MemoryStore;
use tempfile::TempDir;

fn client_with(
    store: Arc<sessionforge_core::CredentialStore>,
    transport: Arc<ScriptedTransport>,
) -> ApiClient {
    ApiClient::new(store, transport).with_backoff(BackoffPolicy::default().without_jitter())
}

fn stored_credentials(temp: &TempDir, prefix: &str) -> Arc<sessionforge_core::CredentialStore> {
    let config = test_config(temp.path(), prefix);
    write_credential_file(&config.file, "xoxc-stored", "xoxd-stored", Utc::now());
    build_store(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(UnavailableProbe::new("test")),
    )
}

#[tokio::test(start_paused = true)]
async fn test_rate_limits_back_off_then_succeed() {
    let temp = TempDir::new().unwrap();
    let store = stored_credentials(&temp, "SF_API_RATE_OK");
    let transport = ScriptedTransport::new(vec![
        rate_limited(1),
        rate_limited(1),
        rate_limited(1),
        ok(),
    ]);
    let client = client_with(store, transport.clone());

    let started = tokio::time::Instant::now();
    let body = client.call_default("auth.test", &Params::new()).await.unwrap();

    assert_eq!(body["user"], "agent");
    assert_eq!(transport.calls(), 4);
    // 1s, 2s and 3s: the suggested delay scaled by the attempt number.
    assert!(started.elapsed() >= Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_exhaustion() {
    let temp = TempDir::new().unwrap();
    let store = stored_credentials(&temp, "SF_API_RATE_FAIL");
    let transport = ScriptedTransport::new(vec![
        rate_limited(1),
        rate_limited(1),
        rate_limited(1),
        rate_limited(1),
    ]);
    let client = client_with(store, transport.clone());

    let err = client
        .call_default("conversations.history", &Params::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::RateLimited { attempts: 3 }));
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(transport.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_delay_is_capped() {
    let temp = TempDir::new().unwrap();
    let store = stored_credentials(&temp, "SF_API_RATE_CAP");
    let transport = ScriptedTransport::new(vec![rate_limited(600), ok()]);
    let client = client_with(store, transport.clone());

    let started = tokio::time::Instant::now();
    client.call_default("auth.test", &Params::new()).await.unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(30));
    assert!(elapsed < Duration::from_secs(31));
}

#[tokio::test(start_paused = true)]
async fn test_network_errors_retry_then_succeed() {
    let temp = TempDir::new().unwrap();
    let store = stored_credentials(&temp, "SF_API_NET_OK");
    let transport = ScriptedTransport::new(vec![connection_reset(), connection_reset(), ok()]);
    let client = client_with(store, transport.clone());

    let started = tokio::time::Instant::now();
    client.call_default("auth.test", &Params::new()).await.unwrap();

    assert_eq!(transport.calls(), 3);
    // 1s then 2s of exponential backoff.
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_network_error_exhaustion() {
    let temp = TempDir::new().unwrap();
    let store = stored_credentials(&temp, "SF_API_NET_FAIL");
    let transport = ScriptedTransport::new(vec![
        connection_reset(),
        connection_reset(),
        connection_reset(),
        connection_reset(),
    ]);
    let client = client_with(store, transport.clone()).with_max_attempts(3);

    let err = client
        .call_default("auth.test", &Params::new())
        .await
        .unwrap_err();

    match err {
        ApiError::TransientNetworkError { message, attempts } => {
            assert!(message.contains("connection reset"));
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(transport.calls(), 4);
}

#[tokio::test]
async fn test_permanent_transport_error_is_not_retried() {
    let temp = TempDir::new().unwrap();
    let store = stored_credentials(&temp, "SF_API_PERMANENT");
    let transport = ScriptedTransport::new(vec![Err(TransportError::permanent(
        "builder error: invalid header value",
    ))]);
    let client = client_with(store, transport.clone());

    let err = client
        .call_default("auth.test", &Params::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Transport { .. }));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_auth_failure_renews_and_retries_once() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path(), "SF_API_RENEW_OK");
    write_credential_file(&config.file, "xoxc-old", "xoxd-old", Utc::now());
    let probe = FakeProbe::returning("xoxc-new", "xoxd-new");
    let store = build_store(config.clone(), Arc::new(MemoryStore::new()), probe.clone());
    let transport = ScriptedTransport::new(vec![auth_failed(), ok()]);
    let client = client_with(store, transport.clone());

    client.call_default("auth.test", &Params::new()).await.unwrap();

    assert_eq!(transport.tokens(), vec!["xoxc-old", "xoxc-new"]);
    assert_eq!(probe.calls(), 1);

    let persisted = std::fs::read_to_string(&config.file).unwrap();
    assert!(persisted.contains("xoxc-new"));
}

#[tokio::test]
async fn test_auth_failure_with_failed_renewal() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path(), "SF_API_RENEW_FAIL");
    write_credential_file(&config.file, "xoxc-old", "xoxd-old", Utc::now());
    let probe = FakeProbe::failing();
    let store = build_store(config, Arc::new(MemoryStore::new()), probe.clone());
    let transport = ScriptedTransport::new(vec![auth_failed()]);
    let client = client_with(store, transport.clone());

    let err = client
        .call_default("auth.test", &Params::new())
        .await
        .unwrap_err();

    match &err {
        ApiError::AuthExpired { code, hint } => {
            assert_eq!(code, "invalid_auth");
            assert!(!hint.is_empty());
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::AuthExpired);
    assert_eq!(transport.calls(), 1);
    assert_eq!(probe.calls(), 1);
}

#[tokio::test]
async fn test_renewed_credentials_rejected() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path(), "SF_API_RENEW_REJECTED");
    write_credential_file(&config.file, "xoxc-old", "xoxd-old", Utc::now());
    let probe = FakeProbe::returning("xoxc-new", "xoxd-new");
    let store = build_store(config, Arc::new(MemoryStore::new()), probe.clone());
    let transport = ScriptedTransport::new(vec![auth_failed(), auth_failed(), ok()]);
    let client = client_with(store, transport.clone());

    let err = client
        .call_default("auth.test", &Params::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::RenewedCredentialsRejected { .. }));
    assert_eq!(transport.calls(), 2);
    assert_eq!(probe.calls(), 1);
}

#[tokio::test]
async fn test_auth_retry_disabled() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path(), "SF_API_NO_AUTH_RETRY");
    write_credential_file(&config.file, "xoxc-old", "xoxd-old", Utc::now());
    let probe = FakeProbe::returning("xoxc-new", "xoxd-new");
    let store = build_store(config, Arc::new(MemoryStore::new()), probe.clone());
    let transport = ScriptedTransport::new(vec![auth_failed()]);
    let client = client_with(store, transport.clone());

    let err = client
        .call("auth.test", &Params::new(), CallContext::default().without_auth_retry())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::AuthExpired { .. }));
    assert_eq!(probe.calls(), 0);
}

#[tokio::test]
async fn test_renewed_pair_shadows_stale_environment() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path(), "SF_API_STALE_ENV");
    set_env(&config.token_env, "xoxc-env-stale");
    set_env(&config.cookie_env, "xoxd-env-stale");
    let probe = FakeProbe::returning("xoxc-new", "xoxd-new");
    let store = build_store(config.clone(), Arc::new(MemoryStore::new()), probe);
    let transport = ScriptedTransport::new(vec![auth_failed(), rate_limited(0), ok()]);
    let client = client_with(store, transport.clone());

    client.call_default("auth.test", &Params::new()).await.unwrap();

    assert_eq!(
        transport.tokens(),
        vec!["xoxc-env-stale", "xoxc-new", "xoxc-new"]
    );

    remove_env(&config.token_env);
    remove_env(&config.cookie_env);
}

#[tokio::test]
async fn test_remote_error_is_returned_verbatim() {
    let temp = TempDir::new().unwrap();
    let store = stored_credentials(&temp, "SF_API_REMOTE");
    let transport = ScriptedTransport::new(vec![Ok(ApiResponse::Failed {
        code: "channel_not_found".to_string(),
    })]);
    let client = client_with(store, transport.clone());

    let err = client
        .call_default("conversations.info", &Params::new())
        .await
        .unwrap_err();

    match &err {
        ApiError::RemoteError { code } => assert_eq!(code, "channel_not_found"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.to_failure().kind, ErrorKind::RemoteError);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_no_credentials() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path(), "SF_API_NONE");
    let store = build_store(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(UnavailableProbe::new("test")),
    );
    let transport = ScriptedTransport::new(vec![]);
    let client = client_with(store, transport.clone());

    let err = client
        .call_default("auth.test", &Params::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::NoCredentials));
    assert!(!err.remediation().is_empty());
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_name_resolver_caches_lookups() {
    let temp = TempDir::new().unwrap();
    let store = stored_credentials(&temp, "SF_API_NAMES");
    let transport = ScriptedTransport::new(vec![
        Ok(ApiResponse::Ok(serde_json::json!({
            "ok": true,
            "user": {"id": "U1", "name": "jdoe", "profile": {"display_name": "jane"}}
        }))),
        Ok(ApiResponse::Failed {
            code: "user_not_found".to_string(),
        }),
    ]);
    let resolver = NameResolver::new(Arc::new(client_with(store, transport.clone())));

    assert_eq!(resolver.display_name("U1").await, "jane");
    assert_eq!(resolver.display_name("U1").await, "jane");
    assert_eq!(transport.calls(), 1);

    // Failed lookups fall back to the identifier and are cached too.
    assert_eq!(resolver.display_name("U404").await, "U404");
    assert_eq!(resolver.display_name("U404").await, "U404");
    assert_eq!(transport.calls(), 2);
    assert_eq!(resolver.cached(), 2);
}
