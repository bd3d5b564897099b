//! # Credential Record and Stores
//!
//! The credential record is the only mutable state shared between
//! in-flight requests. Both tokens are mandatory fields of
//! [`CredentialRecord`], so a half-authenticated state cannot be
//! represented: a store either holds a full record or nothing.
//!
//! Stores hand out snapshots. Every write replaces the record under a
//! single lock, so a request attaching headers never observes a
//! half-updated record.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroizing;

/// Short-lived bearer credential.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(Zeroizing<String>);

/// Long-lived credential used only to obtain a new access token.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshToken(Zeroizing<String>);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Zeroizing::new(token.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `Authorization` header value for this token, marked sensitive so it
    /// is redacted from debug output.
    pub fn header_value(&self) -> Result<HeaderValue, CredentialStoreError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.as_str()))
            .map_err(|_| CredentialStoreError::InvalidToken)?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl RefreshToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Zeroizing::new(token.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccessToken").field(&"[REDACTED]").finish()
    }
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RefreshToken").field(&"[REDACTED]").finish()
    }
}

impl Serialize for AccessToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AccessToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

impl Serialize for RefreshToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RefreshToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Cached profile of the signed-in user. Display-only; the client never
/// reads it for request decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Persisted credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

impl CredentialRecord {
    pub fn new(
        access_token: AccessToken,
        refresh_token: RefreshToken,
        user: Option<UserProfile>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            user,
        }
    }

    /// A record with an empty token is not a valid session.
    pub fn is_complete(&self) -> bool {
        !self.access_token.as_str().is_empty() && !self.refresh_token.as_str().is_empty()
    }
}

/// Errors from credential persistence.
#[derive(Debug, thiserror::Error)]
pub enum CredentialStoreError {
    #[error("credential file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode credentials: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("access token contains characters not allowed in an HTTP header")]
    InvalidToken,
}

/// Persistent store for the credential record.
///
/// Reads are snapshots. Writes must be atomic with respect to concurrent
/// reads: a reader sees either the old record or the new one.
pub trait CredentialStore: Send + Sync {
    /// Snapshot of the current record, if a complete one exists.
    fn load(&self) -> Option<CredentialRecord>;

    /// Replace the record (login, registration).
    fn store_auth_data(&self, record: CredentialRecord) -> Result<(), CredentialStoreError>;

    /// Destroy the record (refresh failure, logout).
    fn clear_auth_data(&self) -> Result<(), CredentialStoreError>;

    /// Atomically swap the access token in place, keeping the refresh token
    /// and user unless replacements are given.
    ///
    /// Applies only while the stored refresh token is still `expected`.
    /// Returns `false` when the record is gone or belongs to another session.
    fn update_access_token(
        &self,
        expected: &RefreshToken,
        access_token: AccessToken,
        refresh_token: Option<RefreshToken>,
        user: Option<UserProfile>,
    ) -> Result<bool, CredentialStoreError>;

    fn access_token(&self) -> Option<AccessToken> {
        self.load().map(|r| r.access_token)
    }

    fn refresh_token(&self) -> Option<RefreshToken> {
        self.load().map(|r| r.refresh_token)
    }

    fn user(&self) -> Option<UserProfile> {
        self.load().and_then(|r| r.user)
    }
}

fn apply_update(
    slot: &mut Option<CredentialRecord>,
    expected: &RefreshToken,
    access_token: AccessToken,
    refresh_token: Option<RefreshToken>,
    user: Option<UserProfile>,
) -> bool {
    let Some(record) = slot.as_mut().filter(|r| r.refresh_token == *expected) else {
        return false;
    };
    record.access_token = access_token;
    if let Some(refresh_token) = refresh_token {
        record.refresh_token = refresh_token;
    }
    if let Some(user) = user {
        record.user = Some(user);
    }
    true
}

/// Process-local store. Used by tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    record: RwLock<Option<CredentialRecord>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with a session.
    pub fn with_record(record: CredentialRecord) -> Self {
        Self {
            record: RwLock::new(Some(record).filter(CredentialRecord::is_complete)),
        }
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn load(&self) -> Option<CredentialRecord> {
        self.record.read().clone()
    }

    fn store_auth_data(&self, record: CredentialRecord) -> Result<(), CredentialStoreError> {
        *self.record.write() = Some(record).filter(CredentialRecord::is_complete);
        Ok(())
    }

    fn clear_auth_data(&self) -> Result<(), CredentialStoreError> {
        *self.record.write() = None;
        Ok(())
    }

    fn update_access_token(
        &self,
        expected: &RefreshToken,
        access_token: AccessToken,
        refresh_token: Option<RefreshToken>,
        user: Option<UserProfile>,
    ) -> Result<bool, CredentialStoreError> {
        Ok(apply_update(
            &mut self.record.write(),
            expected,
            access_token,
            refresh_token,
            user,
        ))
    }
}

/// JSON-file store. The file is the source of truth across process runs;
/// an in-memory copy serves reads.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    record: RwLock<Option<CredentialRecord>>,
}

impl FileCredentialStore {
    /// Open the store at `path`. A missing file means "signed out"; a
    /// malformed or partial file is ignored with a warning.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CredentialStoreError> {
        let path = path.into();
        let record = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<CredentialRecord>(&bytes) {
                Ok(record) if record.is_complete() => Some(record),
                Ok(_) => {
                    tracing::warn!(path = %path.display(), "ignoring incomplete credential record");
                    None
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable credential file");
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => return Err(CredentialStoreError::Io { path, source }),
        };
        Ok(Self {
            path,
            record: RwLock::new(record),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, record: Option<&CredentialRecord>) -> Result<(), CredentialStoreError> {
        let io_err = |source| CredentialStoreError::Io {
            path: self.path.clone(),
            source,
        };
        let Some(record) = record else {
            return match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(io_err(e)),
                _ => Ok(()),
            };
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let bytes = Zeroizing::new(serde_json::to_vec_pretty(record)?);
        let tmp = self.path.with_extension("tmp");
        let mut file = std::fs::File::create(&tmp).map_err(io_err)?;
        // Owner read/write only, set before any secret is written.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(io_err)?;
        }
        file.write_all(&bytes).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<CredentialRecord> {
        self.record.read().clone()
    }

    fn store_auth_data(&self, record: CredentialRecord) -> Result<(), CredentialStoreError> {
        let mut slot = self.record.write();
        *slot = Some(record).filter(CredentialRecord::is_complete);
        self.persist(slot.as_ref())
    }

    fn clear_auth_data(&self) -> Result<(), CredentialStoreError> {
        let mut slot = self.record.write();
        *slot = None;
        self.persist(None)
    }

    fn update_access_token(
        &self,
        expected: &RefreshToken,
        access_token: AccessToken,
        refresh_token: Option<RefreshToken>,
        user: Option<UserProfile>,
    ) -> Result<bool, CredentialStoreError> {
        let mut slot = self.record.write();
        if !apply_update(&mut slot, expected, access_token, refresh_token, user) {
            return Ok(false);
        }
        self.persist(slot.as_ref())?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(access: &str, refresh: &str) -> CredentialRecord {
        CredentialRecord::new(
            AccessToken::new(access),
            RefreshToken::new(refresh),
            Some(UserProfile {
                id: "u-1".into(),
                email: "merchant@example.com".into(),
                role: Some("merchant".into()),
                name: None,
            }),
        )
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let rendered = format!("{:?}", record("secret-access", "secret-refresh"));
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn header_value_is_bearer_and_sensitive() {
        let value = AccessToken::new("A1").header_value().unwrap();
        assert_eq!(value.to_str().unwrap(), "Bearer A1");
        assert!(value.is_sensitive());
        assert!(AccessToken::new("bad\ntoken").header_value().is_err());
    }

    #[test]
    fn update_keeps_refresh_token_and_user() {
        let store = InMemoryCredentialStore::with_record(record("A1", "R1"));
        assert!(store
            .update_access_token(&RefreshToken::new("R1"), AccessToken::new("A2"), None, None)
            .unwrap());

        let current = store.load().unwrap();
        assert_eq!(current.access_token.as_str(), "A2");
        assert_eq!(current.refresh_token.as_str(), "R1");
        assert_eq!(current.user.unwrap().email, "merchant@example.com");
    }

    #[test]
    fn update_without_record_is_a_no_op() {
        let store = InMemoryCredentialStore::new();
        assert!(!store
            .update_access_token(&RefreshToken::new("R1"), AccessToken::new("A2"), None, None)
            .unwrap());
        assert!(store.load().is_none());
    }

    #[test]
    fn incomplete_record_is_treated_as_signed_out() {
        let store = InMemoryCredentialStore::new();
        store.store_auth_data(record("A1", "")).unwrap();
        assert!(store.load().is_none());
        assert!(store.access_token().is_none());
    }

    #[test]
    fn file_store_round_trips_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session").join("credentials.json");

        let store = FileCredentialStore::open(&path).unwrap();
        assert!(store.load().is_none());
        store.store_auth_data(record("A1", "R1")).unwrap();
        store
            .update_access_token(&RefreshToken::new("R1"), AccessToken::new("A2"), None, None)
            .unwrap();

        let reopened = FileCredentialStore::open(&path).unwrap();
        let current = reopened.load().unwrap();
        assert_eq!(current.access_token.as_str(), "A2");
        assert_eq!(current.refresh_token.as_str(), "R1");

        reopened.clear_auth_data().unwrap();
        assert!(!path.exists());
        assert!(FileCredentialStore::open(&path).unwrap().load().is_none());
    }

    #[test]
    fn file_store_ignores_partial_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"accessToken":"A1"}"#).unwrap();
        assert!(FileCredentialStore::open(&path).unwrap().load().is_none());

        std::fs::write(&path, r#"{"accessToken":"A1","refreshToken":""}"#).unwrap();
        assert!(FileCredentialStore::open(&path).unwrap().load().is_none());
    }

    #[test]
    fn update_from_another_session_is_rejected() {
        let store = InMemoryCredentialStore::with_record(record("B1", "S1"));
        assert!(!store
            .update_access_token(&RefreshToken::new("R1"), AccessToken::new("A2"), None, None)
            .unwrap());

        let current = store.load().unwrap();
        assert_eq!(current.access_token.as_str(), "B1");
        assert_eq!(current.refresh_token.as_str(), "S1");
    }

    #[cfg(unix)]
    #[test]
    fn file_store_is_private_to_owner() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        // A world-readable leftover from an interrupted write.
        std::fs::write(path.with_extension("tmp"), "{}").unwrap();
        std::fs::set_permissions(
            path.with_extension("tmp"),
            std::fs::Permissions::from_mode(0o644),
        )
        .unwrap();

        let store = FileCredentialStore::open(&path).unwrap();
        store.store_auth_data(record("A1", "R1")).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0, "credential file mode is {mode:o}");

        store
            .update_access_token(&RefreshToken::new("R1"), AccessToken::new("A2"), None, None)
            .unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0, "credential file mode is {mode:o}");
    }
}
