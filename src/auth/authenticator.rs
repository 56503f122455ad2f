//! Access token acquisition
//!
//! [`Authenticator::get_access_token`] renews silently with the stored
//! refresh token when it can and otherwise runs the browser flow:
//!
//! 1. Generate a PKCE pair and a `state` nonce.
//! 2. Start the loopback redirect listener.
//! 3. Open the authorization URL in the user's browser.
//! 4. Wait for the redirect, check `state`, and exchange the code.
//! 5. Persist the token response and return the access token.
//!
//! Expiry is handled reactively: callers that get a `401` ask for a new
//! token. `expires_in` is recorded in the session snapshot only.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::callback::{RedirectListener, RedirectResult};
use super::pkce;
use super::token_client::{Grant, TokenClient};
use super::token_store::CredentialStore;
use crate::config::{Config, OAuthConfig, TlsConfig};
use crate::error::{BrightspaceError, Result};

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Opens a URL for the user.
pub trait BrowserLauncher: Send + Sync {
    /// Opens `url`, returning an error if no browser could be started.
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Opens URLs in the system's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        open::that(url)
    }
}

/// Something that can hand out a usable access token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Returns an access token, obtaining a new one if necessary.
    async fn access_token(&self) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Authenticator
// ---------------------------------------------------------------------------

/// Obtains access tokens: refresh first, browser sign-in as fallback.
pub struct Authenticator {
    oauth: OAuthConfig,
    tls: TlsConfig,
    redirect_url: Url,
    token_client: TokenClient,
    store: CredentialStore,
    browser: Arc<dyn BrowserLauncher>,
    cancel: CancellationToken,
}

impl Authenticator {
    /// Creates an authenticator for `config` persisting through `store`.
    ///
    /// Uses the system browser and a cancellation token that never fires;
    /// see [`with_browser`](Self::with_browser) and
    /// [`with_cancellation`](Self::with_cancellation).
    ///
    /// # Errors
    ///
    /// Returns [`BrightspaceError::Config`] if the redirect URI does not
    /// parse, or [`BrightspaceError::Http`] if the HTTP client cannot be
    /// built.
    pub fn new(config: &Config, store: CredentialStore) -> Result<Self> {
        Ok(Self {
            oauth: config.oauth.clone(),
            tls: config.tls.clone(),
            redirect_url: config.redirect_url()?,
            token_client: TokenClient::new(&config.oauth)?,
            store,
            browser: Arc::new(SystemBrowser),
            cancel: CancellationToken::new(),
        })
    }

    /// Replaces the browser launcher.
    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    /// Sets the token that aborts a pending browser sign-in.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The credential store tokens are persisted to.
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Returns an access token.
    ///
    /// A stored refresh token is tried first. Any failure of that attempt
    /// falls through to the browser flow rather than being returned.
    ///
    /// # Errors
    ///
    /// Returns whatever [`authorize_interactive`](Self::authorize_interactive)
    /// returns, or a persistence error after a successful refresh.
    pub async fn get_access_token(&self) -> Result<String> {
        if let Some(access_token) = self.try_refresh().await? {
            return Ok(access_token);
        }
        self.authorize_interactive().await
    }

    /// Attempts a silent refresh with the stored refresh token.
    ///
    /// Returns `Ok(None)` when there is no stored token, when the vault
    /// cannot be read, or when the token endpoint rejects the refresh.
    ///
    /// # Errors
    ///
    /// Only persistence failures after a successful refresh are returned.
    pub async fn try_refresh(&self) -> Result<Option<String>> {
        let refresh_token = match self.store.load_refresh_token() {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!("No stored refresh token");
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(
                    "Could not read the stored refresh token (the credential vault may be locked): {:#}",
                    e
                );
                return Ok(None);
            }
        };

        let grant = Grant::RefreshToken {
            refresh_token: &refresh_token,
        };
        match self.token_client.exchange(&grant).await {
            Ok(tokens) => {
                self.store.save_tokens(&tokens)?;
                tracing::info!("Renewed access token with stored refresh token");
                Ok(Some(tokens.access_token))
            }
            Err(e) => {
                tracing::warn!("Token refresh failed, falling back to browser sign-in: {:#}", e);
                Ok(None)
            }
        }
    }

    /// Runs the browser sign-in and returns the new access token.
    ///
    /// # Errors
    ///
    /// - [`BrightspaceError::MissingTlsMaterial`] before anything is opened
    ///   if the listener's certificate or key is missing.
    /// - [`BrightspaceError::AuthorizationDenied`] if the provider redirects
    ///   with an error.
    /// - [`BrightspaceError::StateMismatch`] if the echoed `state` differs.
    /// - [`BrightspaceError::CallbackTimeout`] or
    ///   [`BrightspaceError::Cancelled`] if no redirect arrives.
    /// - [`BrightspaceError::TokenRequestFailed`] if the code exchange fails.
    pub async fn authorize_interactive(&self) -> Result<String> {
        let pkce_pair = pkce::generate();
        let state = pkce::generate_state();

        let pending = RedirectListener::start(&self.redirect_url, &self.tls).await?;

        let auth_url = self.build_authorization_url(&pkce_pair.challenge, &state)?;
        tracing::info!(listener = %pending.local_addr(), "Waiting for browser sign-in");
        if let Err(e) = self.browser.open(auth_url.as_str()) {
            tracing::warn!("Could not open a browser: {}", e);
            eprintln!(
                "Open the following URL in your browser to sign in to Brightspace:\n{}",
                auth_url
            );
        }

        let redirect = pending
            .wait(&self.cancel, self.oauth.callback_timeout())
            .await?;

        let code = match redirect {
            RedirectResult::Error { error, description } => {
                return Err(BrightspaceError::AuthorizationDenied { error, description }.into());
            }
            RedirectResult::Code {
                code,
                state: returned,
            } => {
                if returned.as_deref() != Some(state.as_str()) {
                    tracing::warn!("Redirect state did not match the authorization request");
                    return Err(BrightspaceError::StateMismatch.into());
                }
                code
            }
        };

        let tokens = self
            .token_client
            .exchange(&Grant::AuthorizationCode {
                code: &code,
                redirect_uri: &self.oauth.redirect_uri,
                code_verifier: &pkce_pair.verifier,
            })
            .await?;
        self.store.save_tokens(&tokens)?;
        tracing::info!("Signed in to Brightspace");

        Ok(tokens.access_token)
    }

    /// Builds the URL the browser is sent to for one authorization attempt.
    ///
    /// # Errors
    ///
    /// Returns [`BrightspaceError::Config`] if the authorization endpoint is
    /// not a valid URL.
    pub fn build_authorization_url(&self, code_challenge: &str, state: &str) -> Result<Url> {
        let endpoint = self.oauth.authorization_url();
        let mut url = Url::parse(&endpoint).map_err(|e| {
            BrightspaceError::Config(format!("invalid authorization endpoint URL: {e}"))
        })?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.oauth.client_id)
            .append_pair("redirect_uri", &self.oauth.redirect_uri)
            .append_pair("scope", &self.oauth.scopes)
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", pkce::CHALLENGE_METHOD);

        Ok(url)
    }
}

#[async_trait]
impl TokenSource for Authenticator {
    async fn access_token(&self) -> Result<String> {
        self.get_access_token().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token_store::MemorySecretStore;
    use std::collections::HashMap;

    fn authenticator() -> Authenticator {
        let mut config = Config::default();
        config.oauth.client_id = "client-123".to_string();
        let store = CredentialStore::new(
            Arc::new(MemorySecretStore::new()),
            std::env::temp_dir().join("brightspace-auth-unit"),
        );
        Authenticator::new(&config, store).unwrap()
    }

    #[test]
    fn test_build_authorization_url_carries_pkce_and_state() {
        let url = authenticator()
            .build_authorization_url("challenge-xyz", "state-abc")
            .unwrap();
        assert_eq!(url.path(), "/oauth2/auth");

        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["client_id"], "client-123");
        assert_eq!(query["redirect_uri"], "https://localhost:3001/callback");
        assert_eq!(query["scope"], "core:*:* users:userdata:read");
        assert_eq!(query["state"], "state-abc");
        assert_eq!(query["code_challenge"], "challenge-xyz");
        assert_eq!(query["code_challenge_method"], "S256");
    }

    #[test]
    fn test_build_authorization_url_rejects_bad_endpoint() {
        let mut auth = authenticator();
        auth.oauth.authorization_endpoint = Some("not a url".to_string());
        assert!(auth.build_authorization_url("c", "s").is_err());
    }

    #[tokio::test]
    async fn test_try_refresh_without_stored_token_returns_none() {
        assert_eq!(authenticator().try_refresh().await.unwrap(), None);
    }
}
