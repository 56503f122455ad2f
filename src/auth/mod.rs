//! OAuth2 Authorization Code + PKCE for a desktop client
//!
//! # Module Layout
//!
//! - [`authenticator`] -- Refresh-first token acquisition with browser fallback
//! - [`callback`]      -- Single-use loopback HTTPS redirect listener
//! - [`pkce`]          -- PKCE `S256` verifier/challenge and `state` generation
//! - [`token_client`]  -- Token endpoint requests for both grants
//! - [`token_store`]   -- Refresh token in the OS keyring plus session snapshot

pub mod authenticator;
pub mod callback;
pub mod pkce;
pub mod token_client;
pub mod token_store;

pub use authenticator::{Authenticator, BrowserLauncher, SystemBrowser, TokenSource};
pub use callback::{PendingRedirect, RedirectListener, RedirectResult};
pub use pkce::PkcePair;
pub use token_client::{Grant, TokenClient, TokenSet};
pub use token_store::{
    CredentialStore, KeyringSecretStore, MemorySecretStore, SecretStore, SessionSnapshot,
};
