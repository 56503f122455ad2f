//! `logout` command

use colored::Colorize;

use crate::auth::CredentialStore;
use crate::config::Config;
use crate::error::Result;

/// Removes the stored refresh token and session snapshot.
pub fn run_logout(config: &Config) -> Result<()> {
    let store = CredentialStore::from_config(config)?;
    store.clear()?;
    println!("{}", "Signed out. Stored credentials removed.".green());
    Ok(())
}
