//! Command-line interface definition for brightspace-auth
//!
//! This module defines the CLI structure using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// brightspace-auth - sign in to Brightspace from the desktop
///
/// Obtains an OAuth2 access token (Authorization Code + PKCE through a
/// loopback HTTPS redirect), keeps the refresh token in the OS credential
/// vault, and calls the Brightspace API on your behalf.
#[derive(Parser, Debug, Clone)]
#[command(name = "brightspace-auth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to an optional YAML configuration file
    #[arg(short, long, env = "BRIGHTSPACE_AUTH_CONFIG", default_value = "brightspace-auth.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Seconds to wait for the browser redirect (0 waits forever)
    #[arg(long, global = true)]
    pub callback_timeout: Option<u64>,

    /// Directory for the session snapshot (defaults to the app data directory)
    #[arg(long, global = true)]
    pub session_dir: Option<PathBuf>,

    /// Command to execute (defaults to `whoami`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands for brightspace-auth
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Show the signed-in Brightspace user, signing in first if needed
    Whoami,

    /// Obtain an access token and store the refresh token
    Login {
        /// Skip the silent refresh and always run the browser flow
        #[arg(short, long)]
        force: bool,
    },

    /// Remove the stored refresh token and session snapshot
    Logout,

    /// Show what is stored locally, without contacting the provider
    Status,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Subcommand to run, falling back to `whoami`
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Whoami)
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("brightspace-auth.yaml".to_string()),
            verbose: false,
            callback_timeout: None,
            session_dir: None,
            command: None,
        }
    }
}
