//! Authenticated Brightspace API requests
//!
//! [`ApiClient`] attaches a bearer token from a [`TokenSource`] to each
//! request. A `401` is answered by asking the source for a new token and
//! retrying once; every other failure is returned as is.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::TokenSource;
use crate::config::ApiConfig;
use crate::error::{BrightspaceError, Result};

/// The signed-in user, as returned by the Learning Platform `whoami` route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WhoAmI {
    /// Brightspace user identifier
    pub identifier: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Login name
    pub unique_name: String,
    /// Preferred pronouns, when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pronouns: Option<String>,
}

/// Client for the Brightspace REST API.
pub struct ApiClient {
    http: reqwest::Client,
    root: String,
    version: String,
    tokens: Arc<dyn TokenSource>,
}

impl ApiClient {
    /// Creates a client for the instance in `api`, authenticating with `tokens`.
    ///
    /// # Errors
    ///
    /// Returns [`BrightspaceError::Http`] if the HTTP client cannot be built.
    pub fn new(api: &ApiConfig, tokens: Arc<dyn TokenSource>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(api.timeout_seconds))
            .build()
            .map_err(BrightspaceError::Http)?;
        Ok(Self {
            http,
            root: api.root.trim_end_matches('/').to_string(),
            version: api.version.clone(),
            tokens,
        })
    }

    /// Fetches the signed-in user.
    pub async fn whoami(&self) -> Result<WhoAmI> {
        self.get(&format!("/d2l/api/lp/{}/users/whoami", self.version))
            .await
    }

    /// GETs `path` and deserializes the JSON response into `T`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let value = self.get_json(path).await?;
        serde_json::from_value(value).map_err(|e| BrightspaceError::Serialization(e).into())
    }

    /// GETs `path` (relative to the instance root) as JSON.
    ///
    /// # Errors
    ///
    /// - [`BrightspaceError::UpstreamApi`] on a non-2xx response, including
    ///   a second `401`.
    /// - [`BrightspaceError::Http`] on network failures and timeouts.
    /// - Any error from the token source.
    pub async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.root, path);

        let token = self.tokens.access_token().await?;
        let mut resp = self.send(&url, &token).await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            tracing::info!(path, "Access token rejected, re-authenticating");
            let token = self.tokens.access_token().await?;
            resp = self.send(&url, &token).await?;
        }

        let status = resp.status();
        if !status.is_success() {
            let body = error_body(resp).await;
            tracing::warn!(path, status = status.as_u16(), "API request failed");
            return Err(BrightspaceError::UpstreamApi {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        resp.json()
            .await
            .map_err(|e| BrightspaceError::Http(e).into())
    }

    async fn send(&self, url: &str, token: &str) -> Result<reqwest::Response> {
        tracing::debug!(url, "GET");
        self.http
            .get(url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| BrightspaceError::Http(e).into())
    }
}

/// Body text of a failed response, or a note saying why it could not be read.
async fn error_body(resp: reqwest::Response) -> String {
    match resp.text().await {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to read error response body");
            format!("<failed to read response body: {}>", e)
        }
    }
}
