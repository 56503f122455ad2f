//! brightspace-auth - desktop OAuth2 sign-in for the Brightspace API
//!
#![doc = "brightspace-auth - desktop OAuth2 sign-in for the Brightspace API"]
#![doc = "Main entry point for the brightspace-auth application."]

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use brightspace_auth::cli::{Cli, Commands};
use brightspace_auth::commands;
use brightspace_auth::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("brightspace-auth.yaml");
    let config = Config::load(config_path, &cli)?;

    // Ctrl-C aborts a pending browser sign-in
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    // Execute command
    match cli.command() {
        Commands::Whoami => {
            config.validate()?;
            tracing::debug!("Running whoami");
            commands::whoami::run_whoami(&config, &cancel).await?;
        }
        Commands::Login { force } => {
            config.validate()?;
            tracing::debug!(force, "Running login");
            commands::login::run_login(&config, &cancel, force).await?;
        }
        Commands::Logout => {
            commands::logout::run_logout(&config)?;
        }
        Commands::Status => {
            commands::status::run_status(&config)?;
        }
    }

    Ok(())
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "brightspace_auth=debug"
    } else {
        "brightspace_auth=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
