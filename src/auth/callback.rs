//! Loopback HTTPS redirect listener
//!
//! Captures the browser redirect that carries the authorization code. The
//! listener binds the host and port of the configured redirect URI, serves
//! only that URI's path, and hands exactly one [`RedirectResult`] to the
//! waiting [`PendingRedirect`]. Once a result is delivered the server shuts
//! down; a request racing the shutdown gets `410 Gone`.
//!
//! Other paths get `404` and the listener keeps waiting, as does a request to
//! the redirect path that carries neither `code` nor `error`.

use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::TlsConfig;
use crate::error::{BrightspaceError, Result};

/// Grace period for the in-flight response when the listener stops.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const SUCCESS_PAGE: &str = "<!DOCTYPE html>
<html>
<head><title>Signed in</title></head>
<body style=\"font-family: system-ui; text-align: center; padding-top: 80px;\">
<h2>Signed in to Brightspace</h2>
<p>You can close this window and return to the app.</p>
</body>
</html>";

const ERROR_PAGE: &str = "<!DOCTYPE html>
<html>
<head><title>Authorization error</title></head>
<body style=\"font-family: system-ui; text-align: center; padding-top: 80px;\">
<h2>Authorization error</h2>
<p>The sign-in was not completed. Return to the app for details.</p>
</body>
</html>";

// ---------------------------------------------------------------------------
// RedirectResult
// ---------------------------------------------------------------------------

/// What the browser redirect delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectResult {
    /// The provider issued an authorization code.
    Code {
        /// The `code` query parameter
        code: String,
        /// The echoed `state` query parameter, if any
        state: Option<String>,
    },

    /// The provider redirected with an `error` parameter.
    Error {
        /// The `error` query parameter
        error: String,
        /// The `error_description` query parameter, if any
        description: Option<String>,
    },
}

impl RedirectResult {
    fn from_query(params: &HashMap<String, String>) -> Option<Self> {
        if let Some(error) = params.get("error") {
            return Some(Self::Error {
                error: error.clone(),
                description: params.get("error_description").cloned(),
            });
        }
        params
            .get("code")
            .filter(|code| !code.is_empty())
            .map(|code| Self::Code {
                code: code.clone(),
                state: params.get("state").cloned(),
            })
    }
}

// ---------------------------------------------------------------------------
// RedirectListener
// ---------------------------------------------------------------------------

struct ListenerState {
    sender: Mutex<Option<oneshot::Sender<RedirectResult>>>,
}

/// Single-use HTTPS listener for the authorization redirect.
pub struct RedirectListener;

impl RedirectListener {
    /// Starts listening for the redirect to `redirect_uri`.
    ///
    /// The socket is bound before this returns, so the browser may be sent to
    /// the authorization URL as soon as it does.
    ///
    /// # Errors
    ///
    /// - [`BrightspaceError::MissingTlsMaterial`] if the certificate or key
    ///   file does not exist.
    /// - [`BrightspaceError::Callback`] if the TLS material cannot be loaded,
    ///   the redirect URI has no host, or the address cannot be bound.
    pub async fn start(redirect_uri: &Url, tls: &TlsConfig) -> Result<PendingRedirect> {
        ensure_tls_material(tls)?;

        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let tls_config = RustlsConfig::from_pem_file(&tls.cert_file, &tls.key_file)
            .await
            .map_err(|e| {
                BrightspaceError::Callback(format!("Failed to load TLS certificate: {}", e))
            })?;

        let addr = bind_address(redirect_uri)?;
        let listener = std::net::TcpListener::bind(addr).map_err(|e| {
            BrightspaceError::Callback(format!(
                "Failed to bind redirect listener on {}: {}. \
                 Make sure no other process is using this port.",
                addr, e
            ))
        })?;
        listener
            .set_nonblocking(true)
            .map_err(BrightspaceError::Io)?;
        let local_addr = listener.local_addr().map_err(BrightspaceError::Io)?;

        let (tx, rx) = oneshot::channel();
        let app = redirect_router(redirect_uri.path(), tx);

        let handle = Handle::new();
        let server = axum_server::from_tcp_rustls(listener, tls_config)
            .handle(handle.clone())
            .serve(app.into_make_service());
        let server = tokio::spawn(server);

        tracing::debug!(
            addr = %local_addr,
            path = redirect_uri.path(),
            "Redirect listener started"
        );

        Ok(PendingRedirect {
            local_addr,
            rx,
            handle,
            server: Some(server),
        })
    }
}

fn ensure_tls_material(tls: &TlsConfig) -> Result<()> {
    if tls.cert_file.is_file() && tls.key_file.is_file() {
        return Ok(());
    }
    Err(BrightspaceError::MissingTlsMaterial {
        cert_file: tls.cert_file.clone(),
        key_file: tls.key_file.clone(),
    }
    .into())
}

/// Resolves the redirect URI's host and port, preferring IPv4.
fn bind_address(redirect_uri: &Url) -> Result<SocketAddr> {
    let host = redirect_uri.host_str().ok_or_else(|| {
        BrightspaceError::Callback(format!("redirect URI has no host: {}", redirect_uri))
    })?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = redirect_uri.port_or_known_default().unwrap_or(443);

    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| BrightspaceError::Callback(format!("Cannot resolve {}: {}", host, e)))?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| BrightspaceError::Callback(format!("No address for {}", host)).into())
}

fn redirect_router(path: &str, tx: oneshot::Sender<RedirectResult>) -> Router {
    let state = Arc::new(ListenerState {
        sender: Mutex::new(Some(tx)),
    });
    let path = if path.is_empty() { "/" } else { path };

    Router::new()
        .route(path, get(handle_redirect).fallback(not_found))
        .fallback(not_found)
        .with_state(state)
}

async fn handle_redirect(
    State(state): State<Arc<ListenerState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(result) = RedirectResult::from_query(&params) else {
        tracing::debug!("Redirect request without code or error; still waiting");
        return page(StatusCode::BAD_REQUEST, ERROR_PAGE);
    };

    let Some(sender) = state.sender.lock().await.take() else {
        tracing::debug!("Redirect already received; rejecting request");
        return page(StatusCode::GONE, ERROR_PAGE);
    };

    let response = match &result {
        RedirectResult::Code { .. } => page(StatusCode::OK, SUCCESS_PAGE),
        RedirectResult::Error { error, .. } => {
            tracing::warn!(error = %error, "Authorization redirect carried an error");
            page(StatusCode::BAD_REQUEST, ERROR_PAGE)
        }
    };
    let _ = sender.send(result);
    response
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, [(header::CONNECTION, "close")], "Not Found").into_response()
}

fn page(status: StatusCode, body: &'static str) -> Response {
    (status, [(header::CONNECTION, "close")], Html(body)).into_response()
}

// ---------------------------------------------------------------------------
// PendingRedirect
// ---------------------------------------------------------------------------

enum WaitOutcome {
    Received(Option<RedirectResult>),
    Cancelled,
    TimedOut,
}

/// A running listener waiting for its one redirect.
///
/// Dropping it without calling [`wait`](Self::wait) stops the server.
pub struct PendingRedirect {
    local_addr: SocketAddr,
    rx: oneshot::Receiver<RedirectResult>,
    handle: Handle,
    server: Option<JoinHandle<std::io::Result<()>>>,
}

impl PendingRedirect {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for the redirect, then stops the server.
    ///
    /// `timeout` of `None` waits until the redirect arrives or `cancel` fires.
    /// The socket is closed before this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// - [`BrightspaceError::CallbackTimeout`] if `timeout` elapses first.
    /// - [`BrightspaceError::Cancelled`] if `cancel` fires first.
    /// - [`BrightspaceError::Callback`] if the server stops on its own.
    pub async fn wait(
        mut self,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<RedirectResult> {
        let deadline = async {
            match timeout {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };

        let outcome = tokio::select! {
            received = &mut self.rx => WaitOutcome::Received(received.ok()),
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
            _ = deadline => WaitOutcome::TimedOut,
        };

        let server_error = self.stop().await;
        match outcome {
            WaitOutcome::Received(Some(result)) => {
                tracing::debug!("Redirect received; listener stopped");
                Ok(result)
            }
            WaitOutcome::Received(None) => Err(BrightspaceError::Callback(match server_error {
                Some(e) => format!("Redirect listener failed: {}", e),
                None => "Redirect listener stopped before a redirect arrived".to_string(),
            })
            .into()),
            WaitOutcome::Cancelled => {
                tracing::info!("Stopped waiting for the authorization redirect");
                Err(BrightspaceError::Cancelled.into())
            }
            WaitOutcome::TimedOut => {
                let secs = timeout.map(|d| d.as_secs()).unwrap_or_default();
                Err(BrightspaceError::CallbackTimeout(secs).into())
            }
        }
    }

    /// Shuts the server down and waits for its task, returning its error.
    async fn stop(&mut self) -> Option<String> {
        self.handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        let task = self.server.take()?;
        match task.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(e) => Some(format!("listener task failed: {}", e)),
        }
    }
}

impl Drop for PendingRedirect {
    fn drop(&mut self) {
        if self.server.is_some() {
            self.handle.shutdown();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
