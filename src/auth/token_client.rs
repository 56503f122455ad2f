//! Token endpoint client
//!
//! Performs the two grants this crate needs against the identity provider's
//! token endpoint: `authorization_code` (with the PKCE verifier) and
//! `refresh_token`. Both go through [`TokenClient::exchange`].
//!
//! Failures are reported, never retried here; the retry policy lives in
//! [`Authenticator`](super::authenticator::Authenticator).

use serde::{Deserialize, Serialize};

use crate::config::OAuthConfig;
use crate::error::{BrightspaceError, ResponseBody, Result};

// ---------------------------------------------------------------------------
// TokenSet
// ---------------------------------------------------------------------------

/// A token endpoint response.
///
/// Only `access_token` is required. Any fields the provider adds beyond the
/// RFC 6749 set are kept in `extra` so the session snapshot holds the full
/// response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Bearer token for API requests
    pub access_token: String,

    /// Long-lived credential for silent renewal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Usually `"Bearer"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Access token lifetime in seconds; recorded, not acted upon
    #[serde(
        default,
        deserialize_with = "lenient_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_in: Option<u64>,

    /// Space-separated scopes granted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Provider-specific fields
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TokenSet {
    /// Builds a token set holding only an access token and optional refresh token.
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            token_type: None,
            expires_in: None,
            scope: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Accepts a lifetime sent as an integer, a float or a numeric string.
///
/// Anything else (negative, non-numeric, `null`) reads as `None` rather than
/// failing the whole token response.
fn lenient_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let seconds = match value {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Some(serde_json::Value::String(s)) => {
            let s = s.trim();
            s.parse::<u64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && *f >= 0.0)
                    .map(|f| f as u64)
            })
        }
        _ => None,
    };
    Ok(seconds)
}

// ---------------------------------------------------------------------------
// Grant
// ---------------------------------------------------------------------------

/// Grant-specific parameters for a token request.
#[derive(Debug, Clone, Copy)]
pub enum Grant<'a> {
    /// Exchange an authorization code obtained through the browser redirect.
    AuthorizationCode {
        /// The `code` query parameter from the redirect
        code: &'a str,
        /// Must equal the `redirect_uri` sent in the authorization request
        redirect_uri: &'a str,
        /// The PKCE verifier whose challenge was sent with the request
        code_verifier: &'a str,
    },

    /// Renew an access token silently.
    RefreshToken {
        /// The stored refresh token
        refresh_token: &'a str,
    },
}

impl Grant<'_> {
    /// The `grant_type` form value.
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::RefreshToken { .. } => "refresh_token",
        }
    }

    /// Form fields for the POST body, in the order they are sent.
    fn form_fields<'s>(&'s self, client_id: &'s str) -> Vec<(&'static str, &'s str)> {
        let mut fields = vec![("grant_type", self.grant_type())];
        match *self {
            Self::AuthorizationCode {
                code,
                redirect_uri,
                code_verifier,
            } => {
                fields.push(("code", code));
                fields.push(("redirect_uri", redirect_uri));
                fields.push(("code_verifier", code_verifier));
            }
            Self::RefreshToken { refresh_token } => {
                fields.push(("refresh_token", refresh_token));
            }
        }
        fields.push(("client_id", client_id));
        fields
    }
}

// ---------------------------------------------------------------------------
// TokenClient
// ---------------------------------------------------------------------------

/// Client for the identity provider's token endpoint.
#[derive(Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: Option<String>,
}

impl std::fmt::Debug for TokenClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenClient")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl TokenClient {
    /// Creates a client for the endpoint and credentials in `oauth`.
    ///
    /// Every request is bounded by `oauth.token_timeout_seconds`.
    ///
    /// # Errors
    ///
    /// Returns [`BrightspaceError::Http`] if the HTTP client cannot be built.
    pub fn new(oauth: &OAuthConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(oauth.token_timeout())
            .build()
            .map_err(BrightspaceError::Http)?;

        Ok(Self {
            http,
            token_url: oauth.token_url(),
            client_id: oauth.client_id.clone(),
            client_secret: oauth.secret().map(str::to_string),
        })
    }

    /// Token endpoint this client posts to.
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Sends a form-encoded token request for `grant`.
    ///
    /// The client secret, when configured, is sent as HTTP Basic credentials;
    /// public PKCE clients send `client_id` in the body only.
    ///
    /// # Errors
    ///
    /// - [`BrightspaceError::TokenRequestFailed`] on any non-2xx status,
    ///   carrying the status and body (JSON when it parses).
    /// - [`BrightspaceError::Http`] on network failures and timeouts.
    /// - [`BrightspaceError::Serialization`] when a 2xx body is not a token
    ///   response.
    pub async fn exchange(&self, grant: &Grant<'_>) -> Result<TokenSet> {
        let fields = grant.form_fields(&self.client_id);
        tracing::debug!(
            grant_type = grant.grant_type(),
            token_url = %self.token_url,
            confidential = self.client_secret.is_some(),
            "Requesting tokens"
        );

        let mut request = self
            .http
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&fields);
        if let Some(secret) = &self.client_secret {
            request = request.basic_auth(&self.client_id, Some(secret));
        }

        let resp = request.send().await.map_err(BrightspaceError::Http)?;
        let status = resp.status();
        let text = resp.text().await.map_err(BrightspaceError::Http)?;

        if !status.is_success() {
            let body = ResponseBody::from_text(text);
            tracing::warn!(
                grant_type = grant.grant_type(),
                status = status.as_u16(),
                body = %body,
                "Token request failed"
            );
            return Err(BrightspaceError::TokenRequestFailed {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let tokens: TokenSet = serde_json::from_str(&text).map_err(BrightspaceError::Serialization)?;
        tracing::debug!(
            grant_type = grant.grant_type(),
            has_refresh_token = tokens.refresh_token.is_some(),
            expires_in = ?tokens.expires_in,
            "Token request succeeded"
        );
        Ok(tokens)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
