//! Configuration management for brightspace-auth
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//!
//! The resulting [`Config`] is built once at start-up and passed by reference
//! into each component; nothing below reads the process environment after
//! [`Config::load`] returns.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{BrightspaceError, Result};

/// Main configuration structure for brightspace-auth
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Brightspace resource API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// OAuth2 client and identity provider settings
    #[serde(default)]
    pub oauth: OAuthConfig,

    /// TLS material for the loopback redirect listener
    #[serde(default)]
    pub tls: TlsConfig,

    /// Where credentials and the session snapshot are kept
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Brightspace resource API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Root URL of the Brightspace instance, e.g. `https://school.brightspace.com`
    #[serde(default = "default_api_root")]
    pub root: String,

    /// Learning Platform (`lp`) API version used for `whoami`
    #[serde(default = "default_api_version")]
    pub version: String,

    /// Timeout applied to each resource API request (seconds)
    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,
}

fn default_api_root() -> String {
    "https://elearning.delta.edu".to_string()
}

fn default_api_version() -> String {
    "1.43".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            root: default_api_root(),
            version: default_api_version(),
            timeout_seconds: default_request_timeout(),
        }
    }
}

/// OAuth2 client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Identity provider base URL; endpoints are derived from it unless
    /// overridden below
    #[serde(default = "default_auth_base")]
    pub auth_base: String,

    /// Explicit authorization endpoint (defaults to `{auth_base}/oauth2/auth`)
    #[serde(default)]
    pub authorization_endpoint: Option<String>,

    /// Explicit token endpoint (defaults to `{auth_base}/core/connect/token`)
    #[serde(default)]
    pub token_endpoint: Option<String>,

    /// Registered client identifier
    #[serde(default)]
    pub client_id: String,

    /// Client secret for confidential clients; public PKCE clients leave it unset
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Space-delimited scope string
    #[serde(default = "default_scopes")]
    pub scopes: String,

    /// Redirect URI registered with the provider; the listener binds its
    /// host and port and serves its path
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// How long to wait for the browser redirect (seconds, 0 waits forever)
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_seconds: u64,

    /// Timeout applied to token endpoint requests (seconds)
    #[serde(default = "default_request_timeout")]
    pub token_timeout_seconds: u64,
}

fn default_auth_base() -> String {
    "https://auth.brightspace.com".to_string()
}

fn default_scopes() -> String {
    "core:*:* users:userdata:read".to_string()
}

fn default_redirect_uri() -> String {
    "https://localhost:3001/callback".to_string()
}

fn default_callback_timeout() -> u64 {
    300
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            auth_base: default_auth_base(),
            authorization_endpoint: None,
            token_endpoint: None,
            client_id: String::new(),
            client_secret: None,
            scopes: default_scopes(),
            redirect_uri: default_redirect_uri(),
            callback_timeout_seconds: default_callback_timeout(),
            token_timeout_seconds: default_request_timeout(),
        }
    }
}

impl OAuthConfig {
    /// Authorization endpoint, derived from `auth_base` unless overridden
    pub fn authorization_url(&self) -> String {
        self.authorization_endpoint
            .clone()
            .unwrap_or_else(|| format!("{}/oauth2/auth", self.auth_base.trim_end_matches('/')))
    }

    /// Token endpoint, derived from `auth_base` unless overridden
    pub fn token_url(&self) -> String {
        self.token_endpoint.clone().unwrap_or_else(|| {
            format!(
                "{}/core/connect/token",
                self.auth_base.trim_end_matches('/')
            )
        })
    }

    /// Client secret, treating an empty string as absent
    pub fn secret(&self) -> Option<&str> {
        self.client_secret.as_deref().filter(|s| !s.is_empty())
    }

    /// Deadline for the browser redirect, `None` when disabled
    pub fn callback_timeout(&self) -> Option<Duration> {
        (self.callback_timeout_seconds > 0)
            .then(|| Duration::from_secs(self.callback_timeout_seconds))
    }

    /// Timeout for token endpoint requests
    pub fn token_timeout(&self) -> Duration {
        Duration::from_secs(self.token_timeout_seconds)
    }
}

/// TLS material used by the loopback HTTPS listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM certificate for the loopback host
    #[serde(default = "default_cert_file")]
    pub cert_file: PathBuf,

    /// PEM private key matching `cert_file`
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,
}

fn default_cert_file() -> PathBuf {
    PathBuf::from("localhost+2.pem")
}

fn default_key_file() -> PathBuf {
    PathBuf::from("localhost+2-key.pem")
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_file: default_cert_file(),
            key_file: default_key_file(),
        }
    }
}

/// Credential storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Application identifier; keyring service name and data directory name
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Override for the directory holding `session.json`
    #[serde(default)]
    pub session_dir: Option<PathBuf>,
}

fn default_app_name() -> String {
    "d2l-desktop-automation".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            session_dir: None,
        }
    }
}

/// Loads variables from a `.env` file into the process environment.
///
/// `None` searches the current directory and its parents. Variables already
/// set in the environment are not overridden. A missing file is not an error.
fn load_dotenv(path: Option<&Path>) {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path).map(|()| path.to_path_buf()),
        None => dotenvy::dotenv(),
    };
    match loaded {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("Ignoring .env file: {}", e),
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error; defaults are used and the
    /// environment fills in the rest. A `.env` file, when present, supplies
    /// variables the process environment does not already set.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        load_dotenv(None);
        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BrightspaceError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| BrightspaceError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(root) = std::env::var("D2L_ROOT") {
            self.api.root = root;
        }

        if let Ok(version) = std::env::var("D2L_API_VERSION") {
            self.api.version = version;
        }

        if let Ok(auth_base) = std::env::var("D2L_AUTH_BASE") {
            self.oauth.auth_base = auth_base;
        }

        if let Ok(auth_url) = std::env::var("D2L_AUTH_URL") {
            self.oauth.authorization_endpoint = Some(auth_url);
        }

        if let Ok(token_url) = std::env::var("D2L_TOKEN_URL") {
            self.oauth.token_endpoint = Some(token_url);
        }

        if let Ok(client_id) = std::env::var("D2L_CLIENT_ID") {
            self.oauth.client_id = client_id;
        }

        if let Ok(client_secret) = std::env::var("D2L_CLIENT_SECRET") {
            self.oauth.client_secret = Some(client_secret);
        }

        if let Ok(scopes) = std::env::var("D2L_SCOPES") {
            self.oauth.scopes = scopes;
        }

        if let Ok(redirect_uri) = std::env::var("D2L_REDIRECT_URI") {
            self.oauth.redirect_uri = redirect_uri;
        }

        if let Ok(timeout) = std::env::var("D2L_CALLBACK_TIMEOUT") {
            match timeout.parse() {
                Ok(secs) => self.oauth.callback_timeout_seconds = secs,
                Err(_) => tracing::warn!(
                    "Ignoring D2L_CALLBACK_TIMEOUT={:?}: not a number of seconds",
                    timeout
                ),
            }
        }

        if let Ok(cert_file) = std::env::var("TLS_CERT_FILE") {
            self.tls.cert_file = PathBuf::from(cert_file);
        }

        if let Ok(key_file) = std::env::var("TLS_KEY_FILE") {
            self.tls.key_file = PathBuf::from(key_file);
        }

        if let Ok(app_name) = std::env::var("APP_NAME") {
            self.storage.app_name = app_name;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(timeout) = cli.callback_timeout {
            self.oauth.callback_timeout_seconds = timeout;
        }
        if let Some(dir) = &cli.session_dir {
            self.storage.session_dir = Some(dir.clone());
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`BrightspaceError::Config`] naming the first invalid setting
    pub fn validate(&self) -> Result<()> {
        if self.oauth.client_id.trim().is_empty() {
            return Err(BrightspaceError::Config(
                "client_id is required (set D2L_CLIENT_ID)".to_string(),
            )
            .into());
        }

        let redirect = self.redirect_url()?;
        if redirect.scheme() != "https" {
            return Err(BrightspaceError::Config(format!(
                "redirect_uri must use https for the loopback listener: {}",
                self.oauth.redirect_uri
            ))
            .into());
        }
        if redirect.host_str().is_none() {
            return Err(BrightspaceError::Config(format!(
                "redirect_uri has no host: {}",
                self.oauth.redirect_uri
            ))
            .into());
        }

        for (name, value) in [
            ("authorization endpoint", self.oauth.authorization_url()),
            ("token endpoint", self.oauth.token_url()),
            ("api root", self.api.root.clone()),
        ] {
            Url::parse(&value).map_err(|e| {
                BrightspaceError::Config(format!("invalid {name} URL {value:?}: {e}"))
            })?;
        }

        if self.oauth.token_timeout_seconds == 0 {
            return Err(BrightspaceError::Config(
                "token_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.api.timeout_seconds == 0 {
            return Err(BrightspaceError::Config(
                "api.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.storage.app_name.trim().is_empty() {
            return Err(BrightspaceError::Config("app_name cannot be empty".to_string()).into());
        }

        Ok(())
    }

    /// Parsed redirect URI
    ///
    /// # Errors
    ///
    /// Returns [`BrightspaceError::Config`] when the URI does not parse
    pub fn redirect_url(&self) -> Result<Url> {
        Url::parse(&self.oauth.redirect_uri).map_err(|e| {
            BrightspaceError::Config(format!(
                "invalid redirect_uri {:?}: {}",
                self.oauth.redirect_uri, e
            ))
            .into()
        })
    }
}
