//! Gateway API client configuration.
//!
//! Configures the backend base URL and request timeout. Defaults point to a
//! local development backend. Override via environment variables or
//! explicit construction for staging/testing.

use url::Url;

/// Default base URL when `PAYGATE_API_URL` is unset.
const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for connecting to the gateway backend.
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL every request path is resolved against. May carry a path
    /// prefix (e.g. `https://api.example.com/gateway`).
    pub base_url: Url,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl ApiClientConfig {
    /// Create a configuration with the default timeout.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `PAYGATE_API_URL` (default: `http://localhost:3000`)
    /// - `PAYGATE_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::from_env_with_base_url(env_url(
            "PAYGATE_API_URL",
            DEFAULT_API_URL,
        )?))
    }

    /// Like [`from_env`](Self::from_env) with an explicit base URL;
    /// `PAYGATE_API_URL` is not consulted.
    pub fn from_env_with_base_url(base_url: Url) -> Self {
        Self {
            base_url,
            timeout_secs: env_timeout_secs(),
        }
    }

    /// Create a configuration pointing to a local mock server (for testing).
    pub fn local_mock(port: u16) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&format!("http://127.0.0.1:{port}"))
            .map_err(|e| ConfigError::InvalidUrl("localhost".to_string(), e.to_string()))?;
        Ok(Self {
            base_url,
            timeout_secs: 5,
        })
    }

    /// Reject base URLs that cannot have paths appended to them.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidUrl(
                "base_url".to_string(),
                format!("{} cannot be used as a base URL", self.base_url),
            ));
        }
        Ok(())
    }

    /// Resolve a request path against the base URL.
    ///
    /// Unlike [`Url::join`], a path prefix on the base URL is kept:
    /// `https://host/gateway` + `/payments` gives `https://host/gateway/payments`.
    pub fn endpoint_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn env_url(var: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

/// Unset, unparsable, and zero all fall back to the default.
fn env_timeout_secs() -> u64 {
    std::env::var("PAYGATE_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
}
