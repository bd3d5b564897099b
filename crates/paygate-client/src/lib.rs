//! # paygate-client -- Authenticated client for the gateway API
//!
//! Issues HTTP requests to the mobile-money gateway backend on behalf of
//! the merchant/admin dashboard and the operator CLI:
//!
//! - attaches `Authorization: Bearer <accessToken>` to every protected
//!   request,
//! - never attaches credentials to the public auth endpoints
//!   ([`allowlist`]),
//! - absorbs the first 401 on a protected request by refreshing the access
//!   token and replaying the request once ([`Attempt`]),
//! - coalesces concurrent refreshes so an expired token costs exactly one
//!   refresh call.
//!
//! ## Collaborators
//!
//! The client owns no persistent state and no UI. Both are injected:
//!
//! - [`CredentialStore`] holds the access token, refresh token, and cached
//!   user profile ([`InMemoryCredentialStore`], [`FileCredentialStore`]).
//! - [`Navigator`] is told to show the login view when a session cannot be
//!   recovered.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use paygate_client::{ApiClient, ApiClientConfig, InMemoryCredentialStore, NoopNavigator};
//!
//! # async fn run() -> Result<(), paygate_client::ApiError> {
//! let client = ApiClient::new(
//!     ApiClientConfig::from_env()?,
//!     Arc::new(InMemoryCredentialStore::new()),
//!     Arc::new(NoopNavigator),
//! )?;
//! let transactions = client.get("/transactions").await?;
//! println!("{}", transactions.body);
//! # Ok(())
//! # }
//! ```

pub mod allowlist;
pub mod auth;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod navigation;
pub(crate) mod refresh;
pub mod request;

pub use auth::{AuthClient, AuthOutcome};
pub use client::ApiClient;
pub use config::{ApiClientConfig, ConfigError};
pub use credentials::{
    AccessToken, CredentialRecord, CredentialStore, CredentialStoreError, FileCredentialStore,
    InMemoryCredentialStore, RefreshToken, UserProfile,
};
pub use error::{ApiError, FieldError, RefreshError, UnauthorizedReason};
pub use navigation::{Navigator, NoopNavigator};
pub use request::{ApiResponse, Attempt, RequestOptions};

pub use reqwest::Method;
pub use url::Url;
