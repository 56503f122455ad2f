use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use brightspace_auth::auth::{CredentialStore, MemorySecretStore};
use brightspace_auth::config::{Config, TlsConfig};

/// Self-signed certificate and key for `localhost`/`127.0.0.1`, written to a
/// temporary directory that lives as long as the returned guard.
#[allow(dead_code)]
pub fn self_signed_tls() -> (TempDir, TlsConfig) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string(), "127.0.0.1".to_string()])
            .expect("failed to generate certificate");

    let cert_file = temp_dir.path().join("localhost.pem");
    let key_file = temp_dir.path().join("localhost-key.pem");
    fs::write(&cert_file, cert.pem()).expect("failed to write certificate");
    fs::write(&key_file, key_pair.serialize_pem()).expect("failed to write key");

    (
        temp_dir,
        TlsConfig {
            cert_file,
            key_file,
        },
    )
}

/// A loopback port that was free a moment ago.
#[allow(dead_code)]
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .expect("failed to find a free port")
        .port()
}

/// HTTPS client that trusts the self-signed listener certificate.
#[allow(dead_code)]
pub fn https_client() -> reqwest::Client {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .expect("failed to build client")
}

/// Config pointing the token endpoint at `auth_base` and the redirect at a
/// fresh loopback port.
#[allow(dead_code)]
pub fn test_config(auth_base: &str, tls: TlsConfig) -> Config {
    let mut config = Config::default();
    config.oauth.auth_base = auth_base.to_string();
    config.oauth.client_id = "client-123".to_string();
    config.oauth.redirect_uri = format!("https://127.0.0.1:{}/callback", free_port());
    config.oauth.callback_timeout_seconds = 10;
    config.tls = tls;
    config
}

/// Credential store over an in-memory vault, with the snapshot in a tempdir.
#[allow(dead_code)]
pub fn memory_store() -> (CredentialStore, Arc<MemorySecretStore>, TempDir) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let secrets = Arc::new(MemorySecretStore::new());
    let store = CredentialStore::new(secrets.clone(), temp_dir.path().join("session"));
    (store, secrets, temp_dir)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("brightspace-auth.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
