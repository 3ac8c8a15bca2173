//! Integration tests for daemon startup validation and shutdown.

use std::path::Path;

use sessionforge_core::client::ApiError;
use sessionforge_daemon::{Daemon, DaemonConfig};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(dir: &Path, server: &MockServer, env_prefix: &str) -> DaemonConfig {
    let mut config = DaemonConfig::default();
    config.credentials.file = dir.join("credentials.json");
    config.credentials.token_env = format!("{}_TOKEN", env_prefix);
    config.credentials.cookie_env = format!("{}_COOKIE", env_prefix);
    config.credentials.use_secure_store = false;
    config.probe.command = None;
    config.api.base_url = format!("{}/api", server.uri());
    config.api.timeout_secs = 5;
    config
}

fn write_credentials(path: &Path) {
    let json = serde_json::json!({
        "token": "xoxc-daemon",
        "cookie": "xoxd-daemon",
        "updated_at": chrono::Utc::now().to_rfc3339(),
    });
    std::fs::write(path, json.to_string()).unwrap();
}

#[tokio::test]
async fn test_validate_session_calls_auth_test() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth.test"))
        .and(header("authorization", "Bearer xoxc-daemon"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({"ok": true, "user": "agent", "team": "acme"}),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path(), &server, "SFD_VALIDATE");
    write_credentials(&config.credentials.file);

    let daemon = Daemon::from_config(&config).unwrap();
    let identity = daemon.validate_session().await.unwrap();

    assert_eq!(identity["user"], "agent");
    assert!(!daemon.store().is_renewal_available());
}

#[tokio::test]
async fn test_validate_session_without_credentials() {
    let server = MockServer::start().await;

    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path(), &server, "SFD_MISSING");

    let daemon = Daemon::from_config(&config).unwrap();
    let err = daemon.validate_session().await.unwrap_err();

    assert!(matches!(err, ApiError::NoCredentials));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_run_until_stops_cleanly() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth.test"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"ok": false, "error": "invalid_auth"})),
        )
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path(), &server, "SFD_RUN");
    write_credentials(&config.credentials.file);

    let daemon = Daemon::from_config(&config).unwrap();
    let monitor = daemon.monitor().clone();

    // Validation fails, which must not stop the daemon from running.
    daemon
        .run_until(tokio::time::sleep(std::time::Duration::from_millis(50)))
        .await
        .unwrap();

    assert_eq!(monitor.status(), sessionforge_core::HealthStatus::Healthy);
}

#[test]
fn test_invalid_base_url_is_rejected() {
    let mut config = DaemonConfig::default();
    config.api.base_url = "not a url".to_string();
    config.credentials.use_secure_store = false;

    assert!(Daemon::from_config(&config).is_err());
}
