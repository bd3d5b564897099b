//! Request and response values.
//!
//! An [`InFlightRequest`] is everything needed to issue a request again:
//! the body is serialized once, up front, so a replay after a token
//! refresh sends exactly the same bytes.

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::allowlist;
use crate::error::ApiError;

/// Per-call overrides.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Never attach credentials and never refresh on 401.
    pub skip_auth: bool,
    /// Extra headers sent with the request (and with its replay).
    pub headers: HeaderMap,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    pub fn header(
        mut self,
        name: reqwest::header::HeaderName,
        value: reqwest::header::HeaderValue,
    ) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Position of a request in the 401 recovery protocol.
///
/// A request starts as `Initial`. The first 401 moves it to `Replay`; a
/// `Replay` has no successor, so a second 401 is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Initial,
    Replay,
}

impl Attempt {
    /// The attempt to make after a 401, if one is allowed.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Initial => Some(Self::Replay),
            Self::Replay => None,
        }
    }
}

/// A request retained for at most one replay.
#[derive(Debug, Clone)]
pub struct InFlightRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub options: RequestOptions,
}

impl InFlightRequest {
    pub fn new(
        method: Method,
        path: impl Into<String>,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            body,
            options,
        }
    }

    /// Whether credentials are attached and a 401 may start a refresh.
    pub fn is_protected(&self) -> bool {
        !self.options.skip_auth && !allowlist::is_public_path(&self.path)
    }

    /// `"METHOD /path"` label used in errors and logs.
    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    /// Parsed body. `Null` when empty, a JSON string when the body was not JSON.
    pub body: Value,
    pub(crate) endpoint: String,
}

impl ApiResponse {
    /// Decode the body into `T`.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        serde_json::from_value(self.body).map_err(|e| ApiError::Deserialization {
            endpoint: self.endpoint,
            source: e,
        })
    }
}

/// Parse a response body leniently.
pub(crate) fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
