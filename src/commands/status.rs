//! `status` command

use colored::Colorize;

use crate::auth::CredentialStore;
use crate::config::Config;
use crate::error::Result;

/// Shows what is stored locally. Never contacts the provider and never
/// prints token values.
pub fn run_status(config: &Config) -> Result<()> {
    let store = CredentialStore::from_config(config)?;

    println!("{}", "Brightspace credentials".bold());
    println!("  Instance:      {}", config.api.root);
    println!("  Client ID:     {}", config.oauth.client_id);

    let refresh = match store.load_refresh_token() {
        Ok(Some(_)) => "stored".green(),
        Ok(None) => "none".yellow(),
        Err(e) => {
            tracing::warn!("Could not read the credential vault: {:#}", e);
            "unavailable (credential vault locked?)".red()
        }
    };
    println!("  Refresh token: {}", refresh);

    let session_path = store.session_path();
    match store.load_session()? {
        Some(snapshot) => {
            println!("  Session file:  {}", session_path.display());
            println!(
                "  Last saved:    {}",
                snapshot.saved_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!(
                "  Renewable:     {}",
                if snapshot.refresh_token_received { "yes" } else { "no" }
            );
            if let Some(expires_in) = snapshot.token.expires_in {
                println!("  Expires in:    {}s after save", expires_in);
            }
            if let Some(scope) = &snapshot.token.scope {
                println!("  Scope:         {}", scope);
            }
        }
        None => println!("  Session file:  {}", "none".yellow()),
    }
    Ok(())
}
