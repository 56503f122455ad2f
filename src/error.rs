//! Error types for brightspace-auth
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for brightspace-auth operations
///
/// Each variant maps to one failure kind of the login and token lifecycle:
/// configuration problems, provider-side denials, token endpoint failures,
/// transport failures, and resource API failures.
#[derive(Error, Debug)]
pub enum BrightspaceError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The loopback listener cannot start without a certificate and key
    #[error(
        "Missing TLS certificate or key for the local redirect listener \
         (cert: {cert}, key: {key}).\n\
         Generate a locally trusted pair with mkcert, for example:\n  \
         brew install mkcert nss   # or your platform's package manager\n  \
         mkcert -install\n  \
         mkcert -key-file {key} -cert-file {cert} localhost 127.0.0.1 ::1",
        cert = .cert_file.display(),
        key = .key_file.display()
    )]
    MissingTlsMaterial {
        /// Expected certificate path
        cert_file: PathBuf,
        /// Expected private key path
        key_file: PathBuf,
    },

    /// The identity provider redirected back with an `error` parameter
    #[error("Authorization denied: {error}{}", .description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    AuthorizationDenied {
        /// OAuth error code, e.g. `access_denied`
        error: String,
        /// Optional `error_description` sent by the provider
        description: Option<String>,
    },

    /// The `state` echoed on the redirect differs from the one sent
    #[error("State mismatch in authorization redirect")]
    StateMismatch,

    /// No redirect arrived before the configured deadline
    #[error("Timed out after {0}s waiting for the authorization redirect")]
    CallbackTimeout(u64),

    /// The wait for the authorization redirect was cancelled
    #[error("Authorization was cancelled")]
    Cancelled,

    /// The redirect listener could not be started or failed while serving
    #[error("Redirect listener error: {0}")]
    Callback(String),

    /// Non-2xx response from the token endpoint
    #[error("Token request failed with status {status}: {body}")]
    TokenRequestFailed {
        /// HTTP status code returned by the token endpoint
        status: u16,
        /// Response body, parsed as JSON when possible
        body: ResponseBody,
    },

    /// Non-2xx (other than a retried 401) response from the resource API
    #[error("API request failed with status {status}: {body}")]
    UpstreamApi {
        /// HTTP status code returned by the API
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Network or timeout failures talking to the token or resource endpoint
    #[error("Transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// OS credential vault errors (the vault may need unlocking)
    #[error("Secret store error: {0}")]
    SecretStore(#[from] keyring::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Body of a failed token endpoint response
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Body parsed as JSON
    Json(serde_json::Value),
    /// Body that was not valid JSON
    Text(String),
}

impl ResponseBody {
    /// Parses `text` as JSON, falling back to the raw text.
    pub fn from_text(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(text),
        }
    }
}

impl fmt::Display for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Result type alias for brightspace-auth operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type.
/// Callers that need to branch on a failure kind use
/// `err.downcast_ref::<BrightspaceError>()`.
pub type Result<T> = anyhow::Result<T>;
