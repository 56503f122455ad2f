//! `login` command

use colored::Colorize;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::Result;

/// Obtains an access token and stores the refresh token.
///
/// With `force`, the stored refresh token is ignored and the browser flow
/// always runs.
pub async fn run_login(config: &Config, cancel: &CancellationToken, force: bool) -> Result<()> {
    let authenticator = super::authenticator(config, cancel)?;

    if force {
        println!("{}", "Opening browser for Brightspace sign-in...".cyan());
        authenticator.authorize_interactive().await?;
    } else {
        authenticator.get_access_token().await?;
    }

    println!("{}", "Signed in.".green());
    println!(
        "Session saved to {}",
        authenticator.store().session_path().display()
    );
    Ok(())
}
