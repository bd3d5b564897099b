//! Navigation collaborator.
//!
//! The client does not own any UI. On an unrecoverable authentication
//! failure it asks the embedder to send the user back to the login view
//! and moves on without waiting.

/// Receives "session is gone" notifications.
pub trait Navigator: Send + Sync {
    /// Fire-and-forget; must not block.
    fn redirect_to_login(&self);
}

impl<F> Navigator for F
where
    F: Fn() + Send + Sync,
{
    fn redirect_to_login(&self) {
        self()
    }
}

/// Navigator for headless embedders that surface the error themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn redirect_to_login(&self) {
        tracing::debug!("session ended; no navigator configured");
    }
}
