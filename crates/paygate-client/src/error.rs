//! Gateway API client error types.
//!
//! Every variant carries the endpoint (`"GET /transactions"`) that produced
//! it so failures can be attributed without re-deriving request context.

use serde_json::Value;

/// Errors from gateway API calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never reached the backend or no response arrived.
    #[error("network error calling {endpoint}: {source}")]
    Network {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The backend returned a non-2xx status not covered by a more
    /// specific variant.
    #[error("{endpoint} returned {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: Value,
    },
    /// The backend rejected the input with field-level errors (HTTP 400).
    #[error("{endpoint} rejected the request with {} validation error(s)", .errors.len())]
    Validation {
        endpoint: String,
        errors: Vec<FieldError>,
        body: Value,
    },
    /// HTTP 404.
    #[error("{endpoint} returned 404: {body}")]
    NotFound { endpoint: String, body: Value },
    /// Terminal authentication failure. Credentials have been cleared and
    /// the navigator told to show the login view.
    #[error("unauthorized calling {endpoint}: {reason}")]
    Unauthorized {
        endpoint: String,
        reason: UnauthorizedReason,
    },
    /// A 2xx body could not be decoded into the requested type.
    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        endpoint: String,
        source: serde_json::Error,
    },
    /// The request could not be built.
    #[error("invalid request to {endpoint}: {reason}")]
    InvalidRequest { endpoint: String, reason: String },
    /// Credential store could not be written.
    #[error("credential store error: {0}")]
    Credentials(#[from] super::credentials::CredentialStoreError),
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
}

impl ApiError {
    /// HTTP status associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Validation { .. } => Some(400),
            Self::NotFound { .. } => Some(404),
            Self::Unauthorized { .. } => Some(401),
            _ => None,
        }
    }

    /// Whether this error ended the authenticated session.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Why an authenticated request could not be recovered after a 401.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UnauthorizedReason {
    /// No refresh token was stored.
    #[error("no refresh token available")]
    MissingRefreshToken,
    /// The refresh call itself failed.
    #[error("token refresh failed: {0}")]
    RefreshFailed(#[from] RefreshError),
    /// The request was replayed once with a fresh token and got 401 again.
    #[error("request rejected again after token refresh")]
    ReplayRejected,
}

/// Outcome of a failed refresh call.
///
/// `Clone` because a single refresh outcome is delivered to every request
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    /// The refresh endpoint returned a non-2xx status.
    #[error("refresh endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
    /// The refresh endpoint could not be reached.
    #[error("refresh endpoint unreachable: {0}")]
    Network(String),
    /// The refresh endpoint answered 2xx without a usable access token.
    #[error("malformed refresh response: {0}")]
    Malformed(String),
    /// The session was cleared or replaced (logout, new login) while the
    /// refresh was in flight.
    #[error("session ended or replaced during refresh")]
    CredentialsCleared,
    /// The refresh task did not run to completion.
    #[error("refresh task aborted: {0}")]
    Aborted(String),
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Offending field, when the backend names one.
    pub field: Option<String>,
    pub message: String,
}

/// Extract field errors from a 400 body, if it has a recognised shape.
///
/// Accepted shapes:
/// - `{"errors": [{"field": "email", "message": "..."}]}`
/// - `{"errors": {"email": "..." | ["...", "..."]}}`
/// - `{"message": ["email must be an email", ...]}`
pub(crate) fn parse_validation_errors(body: &Value) -> Option<Vec<FieldError>> {
    match body.get("errors") {
        Some(Value::Array(items)) => {
            let errors: Vec<FieldError> = items
                .iter()
                .filter_map(|item| {
                    let message = item.get("message")?.as_str()?.to_string();
                    let field = item
                        .get("field")
                        .or_else(|| item.get("property"))
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    Some(FieldError { field, message })
                })
                .collect();
            return (!errors.is_empty()).then_some(errors);
        }
        Some(Value::Object(map)) => {
            let mut errors = Vec::new();
            for (field, messages) in map {
                match messages {
                    Value::String(message) => errors.push(FieldError {
                        field: Some(field.clone()),
                        message: message.clone(),
                    }),
                    Value::Array(list) => {
                        errors.extend(list.iter().filter_map(Value::as_str).map(|m| FieldError {
                            field: Some(field.clone()),
                            message: m.to_string(),
                        }))
                    }
                    _ => {}
                }
            }
            return (!errors.is_empty()).then_some(errors);
        }
        _ => {}
    }

    let messages = body.get("message")?.as_array()?;
    let errors: Vec<FieldError> = messages
        .iter()
        .filter_map(Value::as_str)
        .map(|m| FieldError {
            field: None,
            message: m.to_string(),
        })
        .collect();
    (!errors.is_empty()).then_some(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_field_error_array() {
        let body = json!({
            "errors": [
                {"field": "email", "message": "must be an email"},
                {"field": "amount", "message": "must be positive"}
            ]
        });
        let errors = parse_validation_errors(&body).unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field.as_deref(), Some("email"));
        assert_eq!(errors[1].message, "must be positive");
    }

    #[test]
    fn parses_field_error_map() {
        let body = json!({"errors": {"msisdn": ["is required", "must be numeric"], "currency": "unsupported"}});
        let errors = parse_validation_errors(&body).unwrap();
        assert_eq!(errors.len(), 3);
        assert!(errors
            .iter()
            .any(|e| e.field.as_deref() == Some("currency") && e.message == "unsupported"));
    }

    #[test]
    fn parses_message_list() {
        let body = json!({"statusCode": 400, "message": ["password is too short"], "error": "Bad Request"});
        let errors = parse_validation_errors(&body).unwrap();
        assert_eq!(errors, vec![FieldError { field: None, message: "password is too short".into() }]);
    }

    #[test]
    fn plain_message_is_not_structured() {
        let body = json!({"statusCode": 400, "message": "Insufficient balance"});
        assert!(parse_validation_errors(&body).is_none());
        assert!(parse_validation_errors(&Value::Null).is_none());
    }

    #[test]
    fn status_code_per_variant() {
        let err = ApiError::NotFound {
            endpoint: "GET /payments/1".into(),
            body: Value::Null,
        };
        assert_eq!(err.status_code(), Some(404));

        let err = ApiError::Unauthorized {
            endpoint: "GET /payments".into(),
            reason: UnauthorizedReason::MissingRefreshToken,
        };
        assert_eq!(err.status_code(), Some(401));
        assert!(err.is_unauthorized());
    }
}
