//! Refresh-token and session persistence
//!
//! The refresh token is the only long-lived secret and lives in the operating
//! system's credential vault (Keychain on macOS, Secret Service on Linux,
//! Windows Credential Manager on Windows) through the [`SecretStore`] seam.
//!
//! The rest of the token response is written to `session.json` in the
//! application's data directory, without the refresh token. That file is
//! diagnostic state only; it is never read back to make an authentication
//! decision.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use super::token_client::TokenSet;
use crate::config::Config;
use crate::error::{BrightspaceError, Result};

/// Account name of the refresh token entry in the secret store.
pub const REFRESH_TOKEN_ACCOUNT: &str = "refresh_token";

/// File name of the session snapshot.
pub const SESSION_FILE: &str = "session.json";

// ---------------------------------------------------------------------------
// SecretStore
// ---------------------------------------------------------------------------

/// Key/value access to a secure secret store, scoped to one application.
///
/// `get` returns `Ok(None)` when the entry does not exist; `delete` of a
/// missing entry is a no-op.
pub trait SecretStore: Send + Sync {
    /// Reads the secret stored under `account`.
    fn get(&self, account: &str) -> Result<Option<String>>;

    /// Stores `secret` under `account`, replacing any previous value.
    fn set(&self, account: &str, secret: &str) -> Result<()>;

    /// Removes the secret stored under `account`.
    fn delete(&self, account: &str) -> Result<()>;
}

/// [`SecretStore`] backed by the OS credential vault.
///
/// Entries are keyed by `(service, account)` where the service is the
/// application name.
#[derive(Debug, Clone)]
pub struct KeyringSecretStore {
    service: String,
}

impl KeyringSecretStore {
    /// Creates a store whose entries live under `service`.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, account: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, account)
            .map_err(|e| BrightspaceError::SecretStore(e).into())
    }
}

impl SecretStore for KeyringSecretStore {
    fn get(&self, account: &str) -> Result<Option<String>> {
        match self.entry(account)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(BrightspaceError::SecretStore(e).into()),
        }
    }

    fn set(&self, account: &str, secret: &str) -> Result<()> {
        self.entry(account)?
            .set_password(secret)
            .map_err(BrightspaceError::SecretStore)?;
        Ok(())
    }

    fn delete(&self, account: &str) -> Result<()> {
        match self.entry(account)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(BrightspaceError::SecretStore(e).into()),
        }
    }
}

/// Process-local [`SecretStore`].
///
/// Nothing survives the process; used by tests and by hosts without a
/// credential vault.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory secret store lock poisoned"))
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, account: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(account).cloned())
    }

    fn set(&self, account: &str, secret: &str) -> Result<()> {
        self.lock()?.insert(account.to_string(), secret.to_string());
        Ok(())
    }

    fn delete(&self, account: &str) -> Result<()> {
        self.lock()?.remove(account);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

/// Contents of `session.json`: the last token response and when it was saved.
///
/// The refresh token never appears here; it lives in the secret store only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// When the snapshot was written
    pub saved_at: DateTime<Utc>,

    /// Whether the response carried a non-empty refresh token
    #[serde(default)]
    pub refresh_token_received: bool,

    /// The token response, minus its refresh token
    #[serde(flatten)]
    pub token: TokenSet,
}

impl SessionSnapshot {
    /// Snapshot of `tokens` taken now, with the refresh token removed.
    pub fn of(tokens: &TokenSet) -> Self {
        let refresh_token_received = tokens
            .refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty());
        let mut token = tokens.clone();
        token.refresh_token = None;
        Self {
            saved_at: Utc::now(),
            refresh_token_received,
            token,
        }
    }
}

// ---------------------------------------------------------------------------
// CredentialStore
// ---------------------------------------------------------------------------

/// Owner of the persisted refresh token and session snapshot.
#[derive(Clone)]
pub struct CredentialStore {
    secrets: Arc<dyn SecretStore>,
    session_dir: PathBuf,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("session_dir", &self.session_dir)
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    /// Creates a store over `secrets`, writing snapshots under `session_dir`.
    pub fn new(secrets: Arc<dyn SecretStore>, session_dir: impl Into<PathBuf>) -> Self {
        Self {
            secrets,
            session_dir: session_dir.into(),
        }
    }

    /// Creates the store described by `config`: the OS keyring under the
    /// application name, and the configured or per-application data
    /// directory for the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`BrightspaceError::Config`] if no data directory can be
    /// determined for this platform and none is configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let app_name = &config.storage.app_name;
        let session_dir = match &config.storage.session_dir {
            Some(dir) => dir.clone(),
            None => default_session_dir(app_name)?,
        };
        Ok(Self::new(
            Arc::new(KeyringSecretStore::new(app_name.clone())),
            session_dir,
        ))
    }

    /// Directory holding `session.json`.
    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Full path of the session snapshot.
    pub fn session_path(&self) -> PathBuf {
        self.session_dir.join(SESSION_FILE)
    }

    /// Persists a token response.
    ///
    /// The refresh token is written to the secret store when present and
    /// non-empty. A response without a refresh token leaves the stored one
    /// untouched; an explicitly empty refresh token removes it. The snapshot
    /// is always rewritten without the refresh token, creating the directory
    /// if needed.
    ///
    /// # Errors
    ///
    /// - [`BrightspaceError::SecretStore`] if the vault rejects the write
    ///   (it may need unlocking).
    /// - [`BrightspaceError::Io`] if the snapshot cannot be written.
    pub fn save_tokens(&self, tokens: &TokenSet) -> Result<()> {
        match tokens.refresh_token.as_deref() {
            Some("") => {
                tracing::debug!("Token response cleared the refresh token");
                self.secrets.delete(REFRESH_TOKEN_ACCOUNT)?;
            }
            Some(refresh_token) => {
                self.secrets.set(REFRESH_TOKEN_ACCOUNT, refresh_token)?;
                tracing::debug!("Stored refresh token");
            }
            None => {
                tracing::debug!("Token response carried no refresh token; keeping stored one");
            }
        }

        self.write_snapshot(&SessionSnapshot::of(tokens))
    }

    /// Reads the stored refresh token, `None` if never set or removed.
    ///
    /// # Errors
    ///
    /// Returns [`BrightspaceError::SecretStore`] if the vault cannot be read.
    pub fn load_refresh_token(&self) -> Result<Option<String>> {
        Ok(self
            .secrets
            .get(REFRESH_TOKEN_ACCOUNT)?
            .filter(|token| !token.is_empty()))
    }

    /// Reads the last session snapshot, `None` if none was written.
    ///
    /// For display only.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_session(&self) -> Result<Option<SessionSnapshot>> {
        let path = self.session_path();
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BrightspaceError::Io(e).into()),
        };
        let snapshot = serde_json::from_str(&contents).map_err(BrightspaceError::Serialization)?;
        Ok(Some(snapshot))
    }

    /// Removes the refresh token and the session snapshot.
    ///
    /// Missing entries are not an error.
    pub fn clear(&self) -> Result<()> {
        self.secrets.delete(REFRESH_TOKEN_ACCOUNT)?;
        match std::fs::remove_file(self.session_path()) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(BrightspaceError::Io(e).into()),
        }
        tracing::info!("Cleared stored credentials");
        Ok(())
    }

    fn write_snapshot(&self, snapshot: &SessionSnapshot) -> Result<()> {
        std::fs::create_dir_all(&self.session_dir).map_err(BrightspaceError::Io)?;
        let path = self.session_path();
        let json = serde_json::to_string_pretty(snapshot).map_err(BrightspaceError::Serialization)?;
        let mut file = owner_only_options()
            .open(&path)
            .map_err(BrightspaceError::Io)?;
        // The mode only applies on creation; tighten files left by older runs.
        restrict_permissions(&path)?;
        file.write_all(json.as_bytes()).map_err(BrightspaceError::Io)?;
        tracing::debug!(path = %path.display(), "Wrote session snapshot");
        Ok(())
    }
}

/// Per-application data directory, e.g. `~/.local/share/<app_name>` on Linux.
fn default_session_dir(app_name: &str) -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", app_name).ok_or_else(|| {
        BrightspaceError::Config("Could not determine data directory".to_string())
    })?;
    Ok(dirs.data_dir().to_path_buf())
}

fn owner_only_options() -> std::fs::OpenOptions {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(BrightspaceError::Io)?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
