//! Collaborators that only log what the orchestrator asks of them.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use session_core::{
    AppLock, LiveSession, NotificationCenter, Route, SessionIdentity, UiFlow, UserIndicator,
    UserIndicators,
};
use tokio::sync::watch;
use tracing::info;

/// What the root flow is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Splash,
    Placeholder,
    Authentication,
    SoftLogout,
    AppLockSetup,
    Session,
}

pub struct LoggingUi {
    screen: watch::Sender<Screen>,
}

impl LoggingUi {
    pub fn new() -> (Self, watch::Receiver<Screen>) {
        let (screen, rx) = watch::channel(Screen::Splash);
        (Self { screen }, rx)
    }

    fn show(&self, screen: Screen) {
        info!(screen = ?screen, "presenting");
        self.screen.send_replace(screen);
    }
}

impl UiFlow for LoggingUi {
    fn show_splash(&self) {
        self.show(Screen::Splash);
    }

    fn show_placeholder(&self) {
        self.show(Screen::Placeholder);
    }

    fn start_authentication(&self) {
        self.show(Screen::Authentication);
    }

    fn start_soft_logout(&self, identity: SessionIdentity) {
        info!(user_id = %identity.user_id, homeserver = %identity.homeserver, "soft logout");
        self.show(Screen::SoftLogout);
    }

    fn show_app_lock_setup(&self) {
        self.show(Screen::AppLockSetup);
    }

    fn session_available(&self, session: &Arc<dyn LiveSession>, is_new_login: bool) {
        let identity = session.identity();
        info!(
            user_id = %identity.user_id,
            device_id = identity.device_id.as_deref().unwrap_or("-"),
            is_new_login,
            "session available"
        );
        self.show(Screen::Session);
    }

    fn stop_session_flow(&self) {
        info!("session flow stopped");
    }

    fn session_torn_down(&self) {
        info!("session torn down");
    }

    fn navigate(&self, route: &Route, animated: bool) {
        info!(route = ?route, animated, "navigate");
    }
}

pub struct LoggingIndicators;

impl UserIndicators for LoggingIndicators {
    fn submit(&self, indicator: UserIndicator) {
        info!(id = %indicator.id, kind = ?indicator.kind, title = %indicator.title, "indicator shown");
    }

    fn retract(&self, id: &str) {
        info!(id, "indicator retracted");
    }
}

pub struct LoggingNotifications;

impl NotificationCenter for LoggingNotifications {
    fn unregister_remote_notifications(&self) {
        info!("unregistering remote notifications");
    }

    fn remove_all_notifications(&self) {
        info!("removing delivered notifications");
    }

    fn show_local_notification(&self, title: &str, body: &str) {
        info!(title, body, "local notification");
    }
}

/// App lock that is never configured; `mandatory` comes from the environment.
pub struct NoAppLock {
    mandatory: bool,
    disabled: AtomicBool,
}

impl NoAppLock {
    pub fn new(mandatory: bool) -> Self {
        Self {
            mandatory,
            disabled: AtomicBool::new(false),
        }
    }
}

impl AppLock for NoAppLock {
    fn is_mandatory(&self) -> bool {
        self.mandatory && !self.disabled.load(Ordering::SeqCst)
    }

    fn is_configured(&self) -> bool {
        false
    }

    fn disable(&self) {
        self.disabled.store(true, Ordering::SeqCst);
        info!("app lock disabled");
    }
}
