//! API client integration tests using wiremock
//!
//! Verifies the retry contract of `src/api.rs`: one re-authentication and
//! retry on `401`, no retry on anything else.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use brightspace_auth::api::ApiClient;
use brightspace_auth::auth::{Authenticator, SecretStore, TokenSource};
use brightspace_auth::config::{ApiConfig, TlsConfig};
use brightspace_auth::error::{BrightspaceError, Result};

mod common;

const WHOAMI_PATH: &str = "/d2l/api/lp/1.43/users/whoami";

/// Hands out `tokens` in order, repeating the last one.
struct SequenceTokens {
    tokens: Vec<&'static str>,
    calls: AtomicUsize,
}

impl SequenceTokens {
    fn new(tokens: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            tokens: tokens.to_vec(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for SequenceTokens {
    async fn access_token(&self) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let idx = n.min(self.tokens.len() - 1);
        Ok(self.tokens[idx].to_string())
    }
}

fn api_config(root: &str) -> ApiConfig {
    ApiConfig {
        root: root.to_string(),
        ..ApiConfig::default()
    }
}

fn whoami_body() -> serde_json::Value {
    serde_json::json!({
        "Identifier": "169",
        "FirstName": "Ada",
        "LastName": "Lovelace",
        "UniqueName": "alovelace",
        "Pronouns": "she/her"
    })
}

#[tokio::test]
async fn test_unauthorized_is_retried_once_with_new_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WHOAMI_PATH))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(WHOAMI_PATH))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(whoami_body()))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = SequenceTokens::new(&["stale", "fresh"]);
    let client = ApiClient::new(&api_config(&server.uri()), tokens.clone()).unwrap();

    let me = client.whoami().await.unwrap();

    assert_eq!(me.first_name, "Ada");
    assert_eq!(me.pronouns.as_deref(), Some("she/her"));
    assert_eq!(tokens.calls(), 2);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    server.verify().await;
}

#[tokio::test]
async fn test_second_unauthorized_is_not_retried_again() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WHOAMI_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("nope"))
        .expect(2)
        .mount(&server)
        .await;

    let tokens = SequenceTokens::new(&["a", "b"]);
    let client = ApiClient::new(&api_config(&server.uri()), tokens.clone()).unwrap();

    let err = client.whoami().await.unwrap_err();

    match err.downcast_ref::<BrightspaceError>() {
        Some(BrightspaceError::UpstreamApi { status, body }) => {
            assert_eq!(*status, 401);
            assert_eq!(body, "nope");
        }
        other => panic!("expected UpstreamApi, got {:?}", other),
    }
    assert_eq!(tokens.calls(), 2);
    server.verify().await;
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/d2l/api/lp/1.43/enrollments/myenrollments/"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = SequenceTokens::new(&["only"]);
    let client = ApiClient::new(&api_config(&server.uri()), tokens.clone()).unwrap();

    let err = client
        .get_json("/d2l/api/lp/1.43/enrollments/myenrollments/")
        .await
        .unwrap_err();

    match err.downcast_ref::<BrightspaceError>() {
        Some(BrightspaceError::UpstreamApi { status, body }) => {
            assert_eq!(*status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("expected UpstreamApi, got {:?}", other),
    }
    assert_eq!(tokens.calls(), 1);
    server.verify().await;
}

#[tokio::test]
async fn test_truncated_error_body_is_reported() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Promises 100 bytes of body, sends 7, then hangs up.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        let _ = socket
            .write_all(b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 100\r\n\r\npartial")
            .await;
        let _ = socket.shutdown().await;
    });

    let tokens = SequenceTokens::new(&["only"]);
    let client = ApiClient::new(&api_config(&format!("http://{}", addr)), tokens).unwrap();

    let err = client.whoami().await.unwrap_err();

    match err.downcast_ref::<BrightspaceError>() {
        Some(BrightspaceError::UpstreamApi { status, body }) => {
            assert_eq!(*status, 500);
            assert!(
                body.starts_with("<failed to read response body:"),
                "unexpected body: {}",
                body
            );
        }
        other => panic!("expected UpstreamApi, got {:?}", other),
    }
}

#[tokio::test]
async fn test_whoami_with_refreshing_authenticator() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/core/connect/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "live-token",
            "refresh_token": "r-next"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(WHOAMI_PATH))
        .and(header("authorization", "Bearer live-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(whoami_body()))
        .expect(1)
        .mount(&server)
        .await;

    let (store, secrets, _dir) = common::memory_store();
    secrets.set("refresh_token", "r-stored").unwrap();
    let mut config = common::test_config(
        &server.uri(),
        TlsConfig {
            cert_file: "/nonexistent/cert.pem".into(),
            key_file: "/nonexistent/key.pem".into(),
        },
    );
    config.api.root = server.uri();
    let auth = Arc::new(Authenticator::new(&config, store).unwrap());
    let client = ApiClient::new(&config.api, auth).unwrap();

    let me = client.whoami().await.unwrap();

    assert_eq!(me.unique_name, "alovelace");
    assert_eq!(secrets.get("refresh_token").unwrap().as_deref(), Some("r-next"));
    server.verify().await;
}
