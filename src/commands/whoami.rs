//! `whoami` command

use std::sync::Arc;

use colored::Colorize;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiClient, WhoAmI};
use crate::config::Config;
use crate::error::Result;

/// Prints the signed-in Brightspace user.
pub async fn run_whoami(config: &Config, cancel: &CancellationToken) -> Result<()> {
    let authenticator = Arc::new(super::authenticator(config, cancel)?);
    let client = ApiClient::new(&config.api, authenticator)?;

    let user = client.whoami().await?;
    print_user(&user);
    Ok(())
}

fn print_user(user: &WhoAmI) {
    println!();
    println!("{}", "User Information".bold());
    println!("  ID:       {}", user.identifier.cyan());
    println!("  Name:     {} {}", user.first_name, user.last_name);
    println!("  Username: {}", user.unique_name);
    println!(
        "  Pronouns: {}",
        user.pronouns.as_deref().unwrap_or("Not set")
    );
}
