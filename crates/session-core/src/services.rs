//! Collaborator contracts the orchestrator drives.
//!
//! Everything outside the lifecycle core (the live session, its storage, the
//! UI, notifications and the host platform) is reached through these traits
//! and injected once through [`crate::Collaborators`].

use std::{collections::HashSet, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{PlatformError, SessionError},
    types::{AppState, Route, SessionIdentity, SessionNotice, UserIndicator},
    version::AppVersion,
};

/// The authenticated, running session.
///
/// Owned by the orchestrator. Other components only see it for the lifetime
/// of the session and drop their handles on teardown.
#[async_trait]
pub trait LiveSession: Send + Sync {
    /// Identity snapshot used to pre-fill soft logout.
    fn identity(&self) -> SessionIdentity;

    /// Start (or restart) the sync loop. Idempotent.
    fn start_sync(&self);

    /// Stop the sync loop, resolving once it has stopped.
    async fn stop_sync(&self);

    /// Invalidate the session server-side.
    async fn logout(&self) -> Result<(), SessionError>;

    /// Subscribe to auth errors and sync progress.
    fn subscribe(&self) -> broadcast::Receiver<SessionNotice>;

    /// Wait for membership of these rooms to settle once they appear in sync.
    fn await_room_memberships(&self, room_ids: HashSet<String>);

    /// Send a plain-text message.
    async fn send_text(&self, room_id: &str, body: &str) -> Result<(), SessionError>;

    fn set_send_queue_enabled(&self, enabled: bool);

    /// One-off migration of per-account media preview settings.
    async fn migrate_media_preview_config(&self) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Persistent session storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    fn has_stored_sessions(&self) -> bool;

    /// Resume the most recent stored session.
    async fn restore_session(&self) -> Result<Arc<dyn LiveSession>, SessionError>;

    /// Drop stored credentials and data for `user_id`.
    async fn forget_session(&self, user_id: &str) -> Result<(), SessionError>;

    /// Purge caches for `user_id`, keeping credentials.
    ///
    /// Called only after every handle on the live session was released.
    async fn clear_caches(&self, user_id: &str) -> Result<(), SessionError>;

    /// Remove every stored session.
    async fn reset_all(&self) -> Result<(), SessionError>;
}

/// Root UI flow.
///
/// `session_available` hands out the live session for the duration of the
/// session; implementations must release it by `session_torn_down`.
pub trait UiFlow: Send + Sync {
    fn show_splash(&self);
    /// Neutral placeholder while a cache clear runs.
    fn show_placeholder(&self);
    fn start_authentication(&self);
    /// Re-authentication for `identity`, keeping local data.
    fn start_soft_logout(&self, identity: SessionIdentity);
    fn show_app_lock_setup(&self);
    fn session_available(&self, session: &Arc<dyn LiveSession>, is_new_login: bool);
    fn stop_session_flow(&self);
    fn session_torn_down(&self);
    fn navigate(&self, route: &Route, animated: bool);
}

/// Toasts and progress overlays.
pub trait UserIndicators: Send + Sync {
    fn submit(&self, indicator: UserIndicator);
    fn retract(&self, id: &str);
}

/// Local and remote notification plumbing.
pub trait NotificationCenter: Send + Sync {
    fn unregister_remote_notifications(&self);
    fn remove_all_notifications(&self);
    fn show_local_notification(&self, title: &str, body: &str);
}

/// Application settings touched by the lifecycle.
pub trait SessionSettings: Send + Sync {
    fn last_version_launched(&self) -> Option<AppVersion>;
    fn set_last_version_launched(&self, version: AppVersion);
    /// Reset settings bound to the signed-out account.
    fn reset_session_scoped(&self);
    fn reset_all(&self);
}

/// App lock (PIN/biometrics) service.
pub trait AppLock: Send + Sync {
    /// Whether policy requires a lock before any session is shown.
    fn is_mandatory(&self) -> bool;
    fn is_configured(&self) -> bool;
    fn disable(&self);
}

/// Identifier of a granted background-execution allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackgroundTaskId(pub u64);

/// Invoked by the platform when a background allowance is about to expire.
///
/// Must not be called from inside `begin_background_task` itself.
pub type ExpirationHandler = Box<dyn FnOnce() + Send + 'static>;

/// Reports a periodic refresh as finished.
pub type RefreshCompletion = Box<dyn FnOnce(bool) + Send + 'static>;

/// Invoked by the platform each time a registered refresh task runs.
pub type RefreshLauncher = Arc<dyn Fn(RefreshTask) + Send + Sync + 'static>;

/// One run of a periodic refresh task.
pub struct RefreshTask {
    expiration: CancellationToken,
    completion: RefreshCompletion,
}

impl RefreshTask {
    /// `expiration` is cancelled when the platform revokes the run.
    pub fn new(
        expiration: CancellationToken,
        completion: impl FnOnce(bool) + Send + 'static,
    ) -> Self {
        Self {
            expiration,
            completion: Box::new(completion),
        }
    }

    pub fn into_parts(self) -> (CancellationToken, RefreshCompletion) {
        (self.expiration, self.completion)
    }
}

impl fmt::Debug for RefreshTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshTask")
            .field("expired", &self.expiration.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Host platform background execution.
pub trait BackgroundTaskPlatform: Send + Sync {
    fn app_state(&self) -> AppState;

    /// Ask for extra execution time. `None` when the platform refuses.
    fn begin_background_task(
        &self,
        name: &str,
        on_expire: ExpirationHandler,
    ) -> Option<BackgroundTaskId>;

    /// Release an allowance. Unknown ids are ignored.
    fn end_background_task(&self, id: BackgroundTaskId);

    fn register_refresh_task(
        &self,
        task_id: &str,
        launcher: RefreshLauncher,
    ) -> Result<(), PlatformError>;

    fn schedule_refresh_task(
        &self,
        task_id: &str,
        earliest_begin: Duration,
    ) -> Result<(), PlatformError>;
}
