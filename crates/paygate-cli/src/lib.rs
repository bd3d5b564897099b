//! # paygate-cli -- Gateway API Command-Line Interface
//!
//! Operator tool for smoke-testing a gateway backend with real
//! credentials. It wires the library's collaborators the way an embedder
//! would: a file-backed credential store and a navigator that tells the
//! operator to log in again.
//!
//! ## Subcommands
//!
//! - `login`: open a session and persist it
//! - `logout`: destroy the local session
//! - `whoami`: print the cached user profile
//! - `request`: issue an arbitrary request through the authenticated client
//!
//! ## Crate Policy
//!
//! - Argument parsing lives next to the handler that consumes it.
//! - Handlers delegate to `paygate-client`; no HTTP logic here.

pub mod request;
pub mod session;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use paygate_client::{ApiClient, ApiClientConfig, FileCredentialStore, Navigator, Url};
use tracing_subscriber::EnvFilter;

/// Options shared by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Backend base URL. Falls back to `PAYGATE_API_URL`, then `http://localhost:3000`.
    #[arg(long, global = true)]
    pub api_url: Option<Url>,

    /// Credential file.
    #[arg(
        long,
        global = true,
        env = "PAYGATE_CREDENTIALS",
        default_value = ".paygate/credentials.json"
    )]
    pub credentials: PathBuf,
}

/// Tells the operator the session is gone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoginHint;

impl Navigator for LoginHint {
    fn redirect_to_login(&self) {
        tracing::warn!("session expired or revoked; run `paygate login` to sign in again");
    }
}

/// Log filter for a `-v` count. Warnings, including the login hint, are
/// always shown.
pub fn log_filter(verbose: u8) -> EnvFilter {
    match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

/// Build a client from the global options. `--api-url` wins over
/// `PAYGATE_API_URL`, which is not read at all when the flag is given.
pub fn connect(global: &GlobalArgs) -> anyhow::Result<ApiClient> {
    let config = match &global.api_url {
        Some(api_url) => ApiClientConfig::from_env_with_base_url(api_url.clone()),
        None => ApiClientConfig::from_env()?,
    };
    let store = FileCredentialStore::open(&global.credentials)?;
    tracing::debug!(
        base_url = %config.base_url,
        credentials = %global.credentials.display(),
        "connecting"
    );
    Ok(ApiClient::new(config, Arc::new(store), Arc::new(LoginHint))?)
}
