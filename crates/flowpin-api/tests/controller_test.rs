#![allow(clippy::unwrap_used)]
// Integration tests for `SessionManager`, `DeviceController` and
// `PublicIpClient` using wiremock.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use flowpin_api::{DeviceController, Endpoints, Error, PublicIpClient, SessionManager, SessionSettings};

const TOKEN: &str = "tok-123";
const LOGIN: &str = "/v2.1/user/login";

// ── Helpers ─────────────────────────────────────────────────────────

fn session_for(base: &str, session_timeout: Duration) -> SessionManager {
    SessionManager::new(
        reqwest::Client::new(),
        Url::parse(base).unwrap(),
        "admin".into(),
        SecretString::from("hunter2".to_owned()),
        SessionSettings {
            session_timeout,
            ..SessionSettings::default()
        },
    )
    .unwrap()
}

async fn setup() -> (MockServer, DeviceController) {
    let server = MockServer::start().await;
    mount_login(&server).await;
    let base = format!("{}/v2.1", server.uri());
    let session = session_for(&base, Duration::from_secs(3600));
    (server, DeviceController::new(session, Endpoints::default()))
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .respond_with(ResponseTemplate::new(200).insert_header("x-auth-token", TOKEN))
        .mount(server)
        .await;
}

async fn count(server: &MockServer, p: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == p)
        .count()
}

// ── Session tests ───────────────────────────────────────────────────

#[tokio::test]
async fn test_login_sends_credentials_and_reads_token_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .and(body_partial_json(json!({
            "username": "admin",
            "password": "hunter2",
            "sessionTimeout": 3_600_000,
        })))
        .respond_with(ResponseTemplate::new(200).insert_header("x-auth-token", TOKEN))
        .expect(1)
        .mount(&server)
        .await;

    let session = session_for(&format!("{}/v2.1", server.uri()), Duration::from_secs(3600));
    let token = session.token().await.unwrap();

    assert_eq!(token.expose_secret(), TOKEN);
    assert!(session.expires_at().await.is_some());
}

#[tokio::test]
async fn test_token_is_reused_while_valid() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    let session = session_for(&format!("{}/v2.1", server.uri()), Duration::from_secs(3600));

    for _ in 0..3 {
        session.token().await.unwrap();
    }

    assert_eq!(count(&server, LOGIN).await, 1);
}

#[tokio::test]
async fn test_token_refreshes_after_half_lifetime() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    // 400ms requested lifetime: trusted for 200ms.
    let session = session_for(&format!("{}/v2.1", server.uri()), Duration::from_millis(400));

    session.token().await.unwrap();
    session.token().await.unwrap();
    assert_eq!(count(&server, LOGIN).await, 1);

    tokio::time::sleep(Duration::from_millis(250)).await;
    session.token().await.unwrap();
    assert_eq!(count(&server, LOGIN).await, 2);
}

#[tokio::test]
async fn test_login_failure_is_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .mount(&server)
        .await;

    let session = session_for(&format!("{}/v2.1", server.uri()), Duration::from_secs(3600));
    let result = session.token().await;

    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_login_without_token_header_is_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let session = session_for(&format!("{}/v2.1", server.uri()), Duration::from_secs(3600));
    let result = session.token().await;

    match result {
        Err(Error::Authentication { ref message }) => {
            assert!(message.contains("x-auth-token"), "got: {message}");
        }
        other => panic!("expected Authentication error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_controller_is_authentication_error() {
    let session = session_for("http://127.0.0.1:1/v2.1", Duration::from_secs(3600));
    let result = session.token().await;
    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}

// ── Backup tests ────────────────────────────────────────────────────

#[tokio::test]
async fn test_create_backup_returns_id_and_sends_token() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v2.1/devices/dev-1/backups"))
        .and(header("x-auth-token", TOKEN))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "bk-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let id = client.create_backup("dev-1").await.unwrap();
    assert_eq!(id, "bk-1");
}

#[tokio::test]
async fn test_create_backup_missing_id_is_controller_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v2.1/devices/dev-1/backups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&server)
        .await;

    let result = client.create_backup("dev-1").await;
    assert!(
        matches!(
            result,
            Err(Error::Controller {
                operation: "create_backup",
                ..
            })
        ),
        "got: {result:?}"
    );
}

#[tokio::test]
async fn test_get_backup_downloads_bytes() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v2.1/devices/dev-1/backups/bk-1"))
        .and(query_param("replaceUnmsKey", "false"))
        .and(header("x-auth-token", TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x1f, 0x8b, 0x08]))
        .mount(&server)
        .await;

    let bytes = client.get_backup("dev-1", "bk-1").await.unwrap();
    assert_eq!(bytes, vec![0x1f, 0x8b, 0x08]);
}

#[tokio::test]
async fn test_delete_backup_reports_result() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/v2.1/devices/dev-1/backups/bk-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": true })))
        .mount(&server)
        .await;

    assert!(client.delete_backup("dev-1", "bk-1").await.unwrap());
}

#[tokio::test]
async fn test_upload_backup_is_multipart() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v2.1/devices/dev-1/backups/upload"))
        .and(header_exists("content-type"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "bk-2" })))
        .mount(&server)
        .await;

    let id = client.upload_backup("dev-1", b"archive".to_vec()).await.unwrap();
    assert_eq!(id, "bk-2");

    let requests = server.received_requests().await.unwrap();
    let upload = requests
        .iter()
        .find(|r| r.url.path() == "/v2.1/devices/dev-1/backups/upload")
        .unwrap();
    let content_type = upload.headers.get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("multipart/form-data"), "got {content_type}");
    assert!(String::from_utf8_lossy(&upload.body).contains("archive"));
}

#[tokio::test]
async fn test_apply_backup_false_result_is_not_an_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v2.1/devices/dev-1/backups/bk-2/apply"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": false })))
        .mount(&server)
        .await;

    assert!(!client.apply_backup("dev-1", "bk-2").await.unwrap());
}

#[tokio::test]
async fn test_reboot_device() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v2.1/devices/dev-1/restart"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": true })))
        .mount(&server)
        .await;

    assert!(client.reboot_device("dev-1").await.unwrap());
}

// ── Error tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_server_error_is_controller_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v2.1/devices/dev-1/restart"))
        .respond_with(ResponseTemplate::new(500).set_body_string("device offline"))
        .mount(&server)
        .await;

    match client.reboot_device("dev-1").await {
        Err(Error::Controller { operation, ref message }) => {
            assert_eq!(operation, "reboot_device");
            assert!(message.contains("device offline"), "got: {message}");
        }
        other => panic!("expected Controller error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_rejected_token_forces_fresh_login() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v2.1/devices/dev-1/restart"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let first = client.reboot_device("dev-1").await;
    assert!(matches!(first, Err(Error::Authentication { .. })), "got: {first:?}");

    let _ = client.reboot_device("dev-1").await;
    assert_eq!(count(&server, LOGIN).await, 2);
}

// ── Readiness tests ─────────────────────────────────────────────────

#[tokio::test]
async fn test_check_ready_on_200() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v2.1/devices/dev-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "identification": {} })))
        .mount(&server)
        .await;

    assert!(client.check_ready("dev-1").await.unwrap());
}

#[tokio::test]
async fn test_check_ready_not_yet_on_other_status() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v2.1/devices/dev-1"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    assert!(!client.check_ready("dev-1").await.unwrap());
}

// ── Public IP tests ─────────────────────────────────────────────────

#[tokio::test]
async fn test_public_ip_trims_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ip"))
        .respond_with(ResponseTemplate::new(200).set_body_string("203.0.113.9\n"))
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/ip", server.uri())).unwrap();
    let client = PublicIpClient::with_client(reqwest::Client::new(), url);

    assert_eq!(client.current().await.unwrap().to_string(), "203.0.113.9");
}

#[tokio::test]
async fn test_public_ip_rejects_garbage() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ip"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>rate limited</html>"))
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/ip", server.uri())).unwrap();
    let client = PublicIpClient::with_client(reqwest::Client::new(), url);

    assert!(matches!(
        client.current().await,
        Err(Error::InvalidAddress { .. })
    ));
}
