//! Command handlers for the CLI
//!
//! Each handler takes the validated [`Config`] and the process-wide
//! cancellation token, builds the components it needs, and prints its result.
//!
//! - `whoami` -- Fetch the signed-in user, signing in first if needed
//! - `login`  -- Obtain and store tokens
//! - `logout` -- Forget stored credentials
//! - `status` -- Show local credential state

use tokio_util::sync::CancellationToken;

use crate::auth::{Authenticator, CredentialStore};
use crate::config::Config;
use crate::error::Result;

pub mod login;
pub mod logout;
pub mod status;
pub mod whoami;

/// Builds an authenticator over the OS keyring for `config`.
fn authenticator(config: &Config, cancel: &CancellationToken) -> Result<Authenticator> {
    let store = CredentialStore::from_config(config)?;
    Ok(Authenticator::new(config, store)?.with_cancellation(cancel.clone()))
}
