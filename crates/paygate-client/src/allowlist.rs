//! Unauthenticated endpoint allow-list.
//!
//! Requests to these paths establish or re-establish credentials. They
//! never carry an `Authorization` header and a 401 from them never starts
//! a token refresh.

/// Prefix shared by every public auth endpoint.
pub const AUTH_PREFIX: &str = "/public/v1/auth";

/// Token refresh endpoint.
pub const REFRESH_PATH: &str = "/public/v1/auth/refresh";

/// All paths exempt from credential attachment.
pub const PUBLIC_AUTH_PATHS: [&str; 9] = [
    "/public/v1/auth/register",
    "/public/v1/auth/login",
    "/public/v1/auth/verify-email",
    "/public/v1/auth/resend-verification",
    "/public/v1/auth/forgot-password",
    "/public/v1/auth/verify-reset-code",
    "/public/v1/auth/reset-password",
    "/public/v1/auth/resend-reset-code",
    REFRESH_PATH,
];

/// Whether `path` targets an allow-listed endpoint.
///
/// Query string and fragment are ignored. A path matches an entry exactly
/// or extends it at a `/` boundary.
pub fn is_public_path(path: &str) -> bool {
    let path = path.split(|c: char| c == '?' || c == '#').next().unwrap_or_default();
    let path = path.trim_end_matches('/');
    let path = path.strip_prefix('/').unwrap_or(path);

    PUBLIC_AUTH_PATHS.iter().any(|entry| {
        let entry = &entry[1..];
        match path.strip_prefix(entry) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    })
}
