//! # Token Refresh Coordination
//!
//! Several requests can be in flight with the same access token when it
//! expires. They must share one refresh call and replay with its single
//! result, so the coordinator keeps one pending slot:
//!
//! - empty: no refresh running; the first 401 starts one.
//! - occupied: every later 401 awaits the same shared outcome.
//!
//! A started refresh runs as its own tokio task. Its bookkeeping (store
//! update or teardown, slot release) completes even when every caller that
//! was waiting on it has been dropped.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::credentials::{AccessToken, CredentialStore, RefreshToken, UserProfile};
use crate::error::{RefreshError, UnauthorizedReason};
use crate::navigation::Navigator;

type RefreshOutcome = Result<AccessToken, RefreshError>;
type PendingRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Refresh endpoint success body. `refreshToken` is only present when the
/// backend rotates it; `user` may be omitted.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: AccessToken,
    #[serde(default)]
    refresh_token: Option<RefreshToken>,
    #[serde(default)]
    user: Option<UserProfile>,
}

#[derive(Default)]
struct PendingSlot {
    next_generation: u64,
    current: Option<(u64, PendingRefresh)>,
}

/// What a 401 handler should do next.
enum Next {
    Await(PendingRefresh),
    Replay(AccessToken),
    SignedOut,
}

pub(crate) struct RefreshCoordinator {
    http: reqwest::Client,
    refresh_url: String,
    store: Arc<dyn CredentialStore>,
    navigator: Arc<dyn Navigator>,
    pending: Mutex<PendingSlot>,
}

impl RefreshCoordinator {
    pub(crate) fn new(
        http: reqwest::Client,
        refresh_url: String,
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            http,
            refresh_url,
            store,
            navigator,
            pending: Mutex::new(PendingSlot::default()),
        }
    }

    /// Obtain an access token to replay a request that was rejected while
    /// carrying `rejected`.
    ///
    /// On failure the session has already been torn down.
    pub(crate) async fn recover(
        self: &Arc<Self>,
        rejected: Option<&AccessToken>,
    ) -> Result<AccessToken, UnauthorizedReason> {
        let next = {
            let mut slot = self.pending.lock();
            if let Some((_, refresh)) = &slot.current {
                tracing::debug!("joining in-flight token refresh");
                Next::Await(refresh.clone())
            } else {
                match self.store.load() {
                    // A refresh settled after this request was sent.
                    Some(record) if rejected != Some(&record.access_token) => {
                        Next::Replay(record.access_token)
                    }
                    Some(record) => Next::Await(self.start(&mut slot, record.refresh_token)),
                    None => Next::SignedOut,
                }
            }
        };

        match next {
            Next::Await(refresh) => refresh.await.map_err(UnauthorizedReason::from),
            Next::Replay(token) => {
                tracing::debug!("access token already rotated; replaying without refresh");
                Ok(token)
            }
            Next::SignedOut => {
                tracing::warn!("no refresh token stored; ending session");
                self.end_session();
                Err(UnauthorizedReason::MissingRefreshToken)
            }
        }
    }

    /// Clear credentials, forget any pending refresh, and send the user
    /// to the login view.
    pub(crate) fn end_session(&self) {
        if let Err(e) = self.store.clear_auth_data() {
            tracing::error!(error = %e, "failed to clear credentials");
        }
        self.reset();
        self.navigator.redirect_to_login();
    }

    /// Forget any pending refresh. Waiters already holding it still get
    /// its outcome.
    pub(crate) fn reset(&self) {
        self.pending.lock().current = None;
    }

    fn start(self: &Arc<Self>, slot: &mut PendingSlot, refresh_token: RefreshToken) -> PendingRefresh {
        slot.next_generation += 1;
        let generation = slot.next_generation;
        tracing::info!(generation, "refreshing access token");

        let coordinator = Arc::clone(self);
        let task = tokio::spawn(async move {
            let _release = ReleaseSlot {
                coordinator: Arc::clone(&coordinator),
                generation,
            };
            let outcome = coordinator.exchange(&refresh_token).await;
            coordinator.settle(&refresh_token, outcome)
        });

        let refresh = async move {
            task.await
                .unwrap_or_else(|e| Err(RefreshError::Aborted(e.to_string())))
        }
        .boxed()
        .shared();
        slot.current = Some((generation, refresh.clone()));
        refresh
    }

    /// Call the refresh endpoint. Never carries an `Authorization` header.
    async fn exchange(&self, refresh_token: &RefreshToken) -> Result<RefreshResponse, RefreshError> {
        let resp = self
            .http
            .post(&self.refresh_url)
            .json(&RefreshRequest {
                refresh_token: refresh_token.as_str(),
            })
            .send()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: RefreshResponse = resp
            .json()
            .await
            .map_err(|e| RefreshError::Malformed(e.to_string()))?;
        if body.access_token.as_str().is_empty() {
            return Err(RefreshError::Malformed("empty accessToken".into()));
        }
        Ok(body)
    }

    /// Apply a refresh outcome to the credential store, provided the stored
    /// session is still the one `used` belongs to.
    fn settle(
        &self,
        used: &RefreshToken,
        outcome: Result<RefreshResponse, RefreshError>,
    ) -> RefreshOutcome {
        let resp = match outcome {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed; ending session");
                self.end_session();
                return Err(e);
            }
        };

        let rotated = resp
            .refresh_token
            .filter(|token| !token.as_str().is_empty());
        match self
            .store
            .update_access_token(used, resp.access_token.clone(), rotated, resp.user)
        {
            Ok(true) => {
                tracing::info!("access token refreshed");
                Ok(resp.access_token)
            }
            Ok(false) => {
                tracing::warn!("session ended or replaced during refresh; discarding new token");
                Err(RefreshError::CredentialsCleared)
            }
            Err(e) => {
                // The in-memory record is already updated.
                tracing::warn!(error = %e, "failed to persist refreshed access token");
                Ok(resp.access_token)
            }
        }
    }
}

/// Empties the pending slot when the refresh task finishes or unwinds,
/// unless a newer refresh has taken the slot since.
struct ReleaseSlot {
    coordinator: Arc<RefreshCoordinator>,
    generation: u64,
}

impl Drop for ReleaseSlot {
    fn drop(&mut self) {
        let mut slot = self.coordinator.pending.lock();
        if matches!(&slot.current, Some((generation, _)) if *generation == self.generation) {
            slot.current = None;
        }
    }
}
