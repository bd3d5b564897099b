//! Typed client for the public auth endpoints.
//!
//! Base path: `/public/v1/auth`
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `/register` | Create an account |
//! | POST   | `/login` | Exchange email + password for a session |
//! | POST   | `/verify-email` | Confirm an email address with a code |
//! | POST   | `/resend-verification` | Re-send the email verification code |
//! | POST   | `/forgot-password` | Start a password reset |
//! | POST   | `/verify-reset-code` | Check a password reset code |
//! | POST   | `/reset-password` | Set a new password with a reset code |
//! | POST   | `/resend-reset-code` | Re-send the password reset code |
//!
//! All of these are on the allow-list: no credentials are attached and a
//! 401 (e.g. a wrong password) comes back as a plain [`ApiError::Api`].
//! Any response carrying both tokens establishes a session in the
//! credential store.

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::allowlist::AUTH_PREFIX;
use crate::client::ApiClient;
use crate::credentials::{AccessToken, CredentialRecord, RefreshToken, UserProfile};
use crate::error::ApiError;
use crate::request::{ApiResponse, RequestOptions};

// -- Request types -------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Email plus the one-time code sent to it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailCodeRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

#[derive(Serialize)]
struct EmailRequest<'a> {
    email: &'a str,
}

// -- Response types ------------------------------------------------------------

/// Acknowledgement body of endpoints that do not open a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub message: Option<String>,
}

/// Result of an endpoint that may open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Tokens were issued and stored.
    SignedIn { user: Option<UserProfile> },
    /// The backend accepted the call without issuing tokens (e.g. email
    /// verification still pending).
    Acknowledged(Ack),
}

impl AuthOutcome {
    pub fn is_signed_in(&self) -> bool {
        matches!(self, Self::SignedIn { .. })
    }
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionPayload {
    #[serde(default)]
    access_token: Option<AccessToken>,
    #[serde(default)]
    refresh_token: Option<RefreshToken>,
    #[serde(default)]
    user: Option<UserProfile>,
    #[serde(default)]
    message: Option<String>,
}

// -- Client --------------------------------------------------------------------

/// Client for the public auth endpoints.
#[derive(Debug, Clone)]
pub struct AuthClient {
    api: ApiClient,
}

impl AuthClient {
    pub(crate) fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Calls `POST /public/v1/auth/login`.
    pub async fn login(&self, req: &LoginRequest) -> Result<AuthOutcome, ApiError> {
        self.establish("login", req).await
    }

    /// Calls `POST /public/v1/auth/register`.
    pub async fn register(&self, req: &RegisterRequest) -> Result<AuthOutcome, ApiError> {
        self.establish("register", req).await
    }

    /// Calls `POST /public/v1/auth/verify-email`. Some deployments sign the
    /// user in on successful verification.
    pub async fn verify_email(&self, req: &EmailCodeRequest) -> Result<AuthOutcome, ApiError> {
        self.establish("verify-email", req).await
    }

    /// Calls `POST /public/v1/auth/resend-verification`.
    pub async fn resend_verification(&self, email: &str) -> Result<Ack, ApiError> {
        self.acknowledge("resend-verification", &EmailRequest { email })
            .await
    }

    /// Calls `POST /public/v1/auth/forgot-password`.
    pub async fn forgot_password(&self, email: &str) -> Result<Ack, ApiError> {
        self.acknowledge("forgot-password", &EmailRequest { email })
            .await
    }

    /// Calls `POST /public/v1/auth/verify-reset-code`.
    pub async fn verify_reset_code(&self, req: &EmailCodeRequest) -> Result<Ack, ApiError> {
        self.acknowledge("verify-reset-code", req).await
    }

    /// Calls `POST /public/v1/auth/reset-password`.
    pub async fn reset_password(&self, req: &ResetPasswordRequest) -> Result<Ack, ApiError> {
        self.acknowledge("reset-password", req).await
    }

    /// Calls `POST /public/v1/auth/resend-reset-code`.
    pub async fn resend_reset_code(&self, email: &str) -> Result<Ack, ApiError> {
        self.acknowledge("resend-reset-code", &EmailRequest { email })
            .await
    }

    async fn call<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<ApiResponse, ApiError> {
        let path = format!("{AUTH_PREFIX}/{endpoint}");
        let body = serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest {
            endpoint: format!("POST {path}"),
            reason: format!("body serialization failed: {e}"),
        })?;
        self.api
            .send(Method::POST, &path, Some(body), RequestOptions::default())
            .await
    }

    async fn acknowledge<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<Ack, ApiError> {
        json_or_default(self.call(endpoint, body).await?)
    }

    async fn establish<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<AuthOutcome, ApiError> {
        let payload: SessionPayload = json_or_default(self.call(endpoint, body).await?)?;

        let (Some(access_token), Some(refresh_token)) = (payload.access_token, payload.refresh_token)
        else {
            return Ok(AuthOutcome::Acknowledged(Ack {
                message: payload.message,
            }));
        };

        let record = CredentialRecord::new(access_token, refresh_token, payload.user.clone());
        if !record.is_complete() {
            tracing::warn!(endpoint, "auth response carried an empty token; not signing in");
            return Ok(AuthOutcome::Acknowledged(Ack {
                message: payload.message,
            }));
        }

        self.api.credential_store().store_auth_data(record)?;
        tracing::info!(endpoint, "session established");
        Ok(AuthOutcome::SignedIn { user: payload.user })
    }
}

/// Decode `T`, treating an empty body as `T::default()`.
fn json_or_default<T: serde::de::DeserializeOwned + Default>(
    resp: ApiResponse,
) -> Result<T, ApiError> {
    if resp.body.is_null() {
        return Ok(T::default());
    }
    resp.json()
}
