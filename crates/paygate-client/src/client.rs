//! Authenticated API client.
//!
//! Protected requests carry `Authorization: Bearer <accessToken>`. The
//! first 401 on a protected request is absorbed: the token is refreshed
//! (or an in-flight refresh joined) and the request replayed once. Callers
//! only ever see the replay's result.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::allowlist::REFRESH_PATH;
use crate::auth::AuthClient;
use crate::config::ApiClientConfig;
use crate::credentials::{AccessToken, CredentialStore, UserProfile};
use crate::error::{parse_validation_errors, ApiError, UnauthorizedReason};
use crate::navigation::Navigator;
use crate::refresh::RefreshCoordinator;
use crate::request::{parse_body, ApiResponse, Attempt, InFlightRequest, RequestOptions};

/// Client for the gateway backend. Cheap to clone; clones share the
/// credential store and the pending-refresh state.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    config: ApiClientConfig,
    store: Arc<dyn CredentialStore>,
    refresh: Arc<RefreshCoordinator>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.config.base_url.as_str())
            .field("timeout_secs", &self.inner.config.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client from configuration and its collaborators.
    pub fn new(
        config: ApiClientConfig,
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
                headers
            })
            .build()
            .map_err(|e| ApiError::Network {
                endpoint: "client_init".into(),
                source: e,
            })?;

        let refresh = Arc::new(RefreshCoordinator::new(
            http.clone(),
            config.endpoint_url(REFRESH_PATH),
            Arc::clone(&store),
            navigator,
        ));

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                config,
                store,
                refresh,
            }),
        })
    }

    /// Access the public auth endpoints (login, registration, password reset).
    pub fn auth(&self) -> AuthClient {
        AuthClient::new(self.clone())
    }

    pub fn config(&self) -> &ApiClientConfig {
        &self.inner.config
    }

    pub fn credential_store(&self) -> &Arc<dyn CredentialStore> {
        &self.inner.store
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.store.load().is_some()
    }

    /// Cached profile of the signed-in user.
    pub fn current_user(&self) -> Option<UserProfile> {
        self.inner.store.user()
    }

    /// Destroy the local session. Does not trigger a login redirect.
    pub fn logout(&self) -> Result<(), ApiError> {
        self.inner.store.clear_auth_data()?;
        self.inner.refresh.reset();
        tracing::info!("logged out");
        Ok(())
    }

    /// Issue a request and return the parsed 2xx body.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        self.dispatch(InFlightRequest::new(method, path, body, options))
            .await
    }

    /// Issue a request and decode the 2xx body into `T`.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.send(method, path, body, options).await?.json()
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.send(Method::GET, path, None, RequestOptions::default())
            .await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get(path).await?.json()
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse, ApiError> {
        let body = encode_body(&Method::POST, path, body)?;
        self.send(Method::POST, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse, ApiError> {
        let body = encode_body(&Method::PUT, path, body)?;
        self.send(Method::PUT, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse, ApiError> {
        let body = encode_body(&Method::PATCH, path, body)?;
        self.send(Method::PATCH, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.send(Method::DELETE, path, None, RequestOptions::default())
            .await
    }

    async fn dispatch(&self, request: InFlightRequest) -> Result<ApiResponse, ApiError> {
        let endpoint = request.endpoint();
        let protected = request.is_protected();
        let mut token = if protected {
            self.inner.store.access_token()
        } else {
            None
        };
        let mut attempt = Attempt::Initial;

        loop {
            tracing::debug!(
                endpoint = %endpoint,
                ?attempt,
                authenticated = token.is_some(),
                "sending request"
            );
            let (status, body) = self.execute(&request, &endpoint, token.as_ref()).await?;

            if status != StatusCode::UNAUTHORIZED || !protected {
                return into_result(endpoint, status, body);
            }

            let Some(next) = attempt.next() else {
                tracing::warn!(endpoint = %endpoint, "rejected again after token refresh; ending session");
                self.inner.refresh.end_session();
                return Err(ApiError::Unauthorized {
                    endpoint,
                    reason: UnauthorizedReason::ReplayRejected,
                });
            };

            match self.inner.refresh.recover(token.as_ref()).await {
                Ok(fresh) => {
                    token = Some(fresh);
                    attempt = next;
                }
                Err(reason) => return Err(ApiError::Unauthorized { endpoint, reason }),
            }
        }
    }

    async fn execute(
        &self,
        request: &InFlightRequest,
        endpoint: &str,
        token: Option<&AccessToken>,
    ) -> Result<(StatusCode, Value), ApiError> {
        let url = self.inner.config.endpoint_url(&request.path);

        let mut headers = request.options.headers.clone();
        if let Some(token) = token {
            let value = token
                .header_value()
                .map_err(|e| ApiError::InvalidRequest {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                })?;
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = self
            .inner
            .http
            .request(request.method.clone(), &url)
            .headers(headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let network = |source| ApiError::Network {
            endpoint: endpoint.to_string(),
            source,
        };
        let resp = builder.send().await.map_err(network)?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(network)?;
        Ok((status, parse_body(&bytes)))
    }
}

fn encode_body<B: Serialize + ?Sized>(
    method: &Method,
    path: &str,
    body: &B,
) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest {
        endpoint: format!("{method} {path}"),
        reason: format!("body serialization failed: {e}"),
    })
}

/// Map a final response onto the error taxonomy.
fn into_result(endpoint: String, status: StatusCode, body: Value) -> Result<ApiResponse, ApiError> {
    if status.is_success() {
        return Ok(ApiResponse {
            status,
            body,
            endpoint,
        });
    }

    tracing::debug!(endpoint = %endpoint, status = status.as_u16(), "request failed");
    Err(match status {
        StatusCode::NOT_FOUND => ApiError::NotFound { endpoint, body },
        StatusCode::BAD_REQUEST => match parse_validation_errors(&body) {
            Some(errors) => ApiError::Validation {
                endpoint,
                errors,
                body,
            },
            None => ApiError::Api {
                endpoint,
                status: 400,
                body,
            },
        },
        _ => ApiError::Api {
            endpoint,
            status: status.as_u16(),
            body,
        },
    })
}
