//! brightspace-auth - desktop OAuth2 sign-in for the Brightspace API
//!
//! This library obtains and maintains an access token for a single desktop
//! user using the Authorization Code flow with PKCE and a loopback HTTPS
//! redirect listener, and issues authenticated requests with it.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: PKCE, redirect listener, token endpoint client, credential
//!   store, and the refresh-first authenticator
//! - `api`: Bearer-authenticated Brightspace requests with one retry on `401`
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//! - `commands`: Handlers for the CLI subcommands
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use brightspace_auth::{ApiClient, Authenticator, Config, CredentialStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("brightspace-auth.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let store = CredentialStore::from_config(&config)?;
//!     let authenticator = Arc::new(Authenticator::new(&config, store)?);
//!     let client = ApiClient::new(&config.api, authenticator)?;
//!     let me = client.whoami().await?;
//!     println!("{} {}", me.first_name, me.last_name);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use api::{ApiClient, WhoAmI};
pub use auth::{Authenticator, CredentialStore, TokenSet, TokenSource};
pub use config::Config;
pub use error::{BrightspaceError, Result};
