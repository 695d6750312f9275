//! Recording fakes for collaborator traits.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use crate::{
    error::{PlatformError, SessionError, SessionErrorCategory},
    services::{
        AppLock, BackgroundTaskId, BackgroundTaskPlatform, ExpirationHandler, LiveSession,
        NotificationCenter, RefreshLauncher, RefreshTask, SessionSettings, SessionStore, UiFlow,
        UserIndicators,
    },
    types::{AppState, Route, SessionIdentity, SessionNotice, UserIndicator},
    version::AppVersion,
};

/// Poll `condition` until it holds, failing the test after two seconds.
pub(crate) async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().expect("fake state lock poisoned")
}

pub(crate) struct FakeLiveSession {
    user_id: String,
    notices: broadcast::Sender<SessionNotice>,
    start_sync_calls: AtomicUsize,
    stop_sync_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    media_preview_migrations: AtomicUsize,
    fail_logout: AtomicBool,
    fail_sends: AtomicBool,
    fail_media_preview_migration: AtomicBool,
    stop_gate: watch::Sender<bool>,
    sent: Mutex<Vec<(String, String)>>,
    awaited_rooms: Mutex<Vec<HashSet<String>>>,
    send_queue_toggles: Mutex<Vec<bool>>,
    timeline: Mutex<Vec<&'static str>>,
}

impl FakeLiveSession {
    pub(crate) fn new(user_id: &str) -> Arc<Self> {
        let (notices, _) = broadcast::channel(32);
        let (stop_gate, _) = watch::channel(true);
        Arc::new(Self {
            user_id: user_id.to_owned(),
            notices,
            start_sync_calls: AtomicUsize::new(0),
            stop_sync_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            media_preview_migrations: AtomicUsize::new(0),
            fail_logout: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            fail_media_preview_migration: AtomicBool::new(false),
            stop_gate,
            sent: Mutex::new(Vec::new()),
            awaited_rooms: Mutex::new(Vec::new()),
            send_queue_toggles: Mutex::new(Vec::new()),
            timeline: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn emit(&self, notice: SessionNotice) {
        let _ = self.notices.send(notice);
    }

    pub(crate) fn fail_logout(&self) {
        self.fail_logout.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_media_preview_migration(&self) {
        self.fail_media_preview_migration
            .store(true, Ordering::SeqCst);
    }

    /// Make `stop_sync` wait until [`Self::release_stop_sync`].
    pub(crate) fn hold_stop_sync(&self) {
        self.stop_gate.send_replace(false);
    }

    pub(crate) fn release_stop_sync(&self) {
        self.stop_gate.send_replace(true);
    }

    pub(crate) fn start_sync_calls(&self) -> usize {
        self.start_sync_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn stop_sync_calls(&self) -> usize {
        self.stop_sync_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn media_preview_migrations(&self) -> usize {
        self.media_preview_migrations.load(Ordering::SeqCst)
    }

    pub(crate) fn sent_messages(&self) -> Vec<(String, String)> {
        locked(&self.sent).clone()
    }

    pub(crate) fn awaited_rooms(&self) -> Vec<HashSet<String>> {
        locked(&self.awaited_rooms).clone()
    }

    pub(crate) fn send_queue_toggles(&self) -> Vec<bool> {
        locked(&self.send_queue_toggles).clone()
    }

    pub(crate) fn timeline(&self) -> Vec<&'static str> {
        locked(&self.timeline).clone()
    }

    fn record(&self, step: &'static str) {
        locked(&self.timeline).push(step);
    }
}

#[async_trait]
impl LiveSession for FakeLiveSession {
    fn identity(&self) -> SessionIdentity {
        SessionIdentity {
            user_id: self.user_id.clone(),
            homeserver: "https://matrix.example.org".to_owned(),
            device_id: Some("FAKEDEVICE".to_owned()),
            display_name: None,
        }
    }

    fn start_sync(&self) {
        self.start_sync_calls.fetch_add(1, Ordering::SeqCst);
        self.record("start_sync");
    }

    async fn stop_sync(&self) {
        self.stop_sync_calls.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.stop_gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        self.record("stop_sync");
    }

    async fn logout(&self) -> Result<(), SessionError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(SessionError::new(
                SessionErrorCategory::Network,
                "logout_failed",
                "homeserver unreachable",
            ));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    fn await_room_memberships(&self, room_ids: HashSet<String>) {
        locked(&self.awaited_rooms).push(room_ids);
        self.record("await_rooms");
    }

    async fn send_text(&self, room_id: &str, body: &str) -> Result<(), SessionError> {
        self.record("send_text");
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SessionError::new(
                SessionErrorCategory::Network,
                "send_failed",
                "message could not be sent",
            ));
        }
        locked(&self.sent).push((room_id.to_owned(), body.to_owned()));
        Ok(())
    }

    fn set_send_queue_enabled(&self, enabled: bool) {
        locked(&self.send_queue_toggles).push(enabled);
    }

    async fn migrate_media_preview_config(&self) -> Result<(), SessionError> {
        self.media_preview_migrations.fetch_add(1, Ordering::SeqCst);
        if self.fail_media_preview_migration.load(Ordering::SeqCst) {
            return Err(SessionError::new(
                SessionErrorCategory::Network,
                "migration_failed",
                "media preview config unavailable",
            ));
        }
        Ok(())
    }
}

pub(crate) struct FakeSessionStore {
    restores: Mutex<VecDeque<Result<Arc<dyn LiveSession>, SessionError>>>,
    restore_gate: watch::Sender<bool>,
    restore_calls: AtomicUsize,
    reset_calls: AtomicUsize,
    forgotten: Mutex<Vec<String>>,
    cleared: Mutex<Vec<(String, bool)>>,
    released_before_clear: Mutex<Option<Weak<FakeLiveSession>>>,
}

impl FakeSessionStore {
    pub(crate) fn new() -> Arc<Self> {
        let (restore_gate, _) = watch::channel(true);
        Arc::new(Self {
            restores: Mutex::new(VecDeque::new()),
            restore_gate,
            restore_calls: AtomicUsize::new(0),
            reset_calls: AtomicUsize::new(0),
            forgotten: Mutex::new(Vec::new()),
            cleared: Mutex::new(Vec::new()),
            released_before_clear: Mutex::new(None),
        })
    }

    /// Make `restore_session` wait until [`Self::release_restore`].
    pub(crate) fn hold_restore(&self) {
        self.restore_gate.send_replace(false);
    }

    pub(crate) fn release_restore(&self) {
        self.restore_gate.send_replace(true);
    }

    /// Queue the outcome of the next `restore_session`.
    pub(crate) fn push_restore(&self, result: Result<Arc<FakeLiveSession>, SessionError>) {
        let result = result.map(|session| -> Arc<dyn LiveSession> { session });
        locked(&self.restores).push_back(result);
    }

    /// Record at `clear_caches` time whether `session` was already dropped.
    pub(crate) fn watch_release_of(&self, session: &Arc<FakeLiveSession>) {
        *locked(&self.released_before_clear) = Some(Arc::downgrade(session));
    }

    pub(crate) fn restore_calls(&self) -> usize {
        self.restore_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn reset_calls(&self) -> usize {
        self.reset_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn forgotten(&self) -> Vec<String> {
        locked(&self.forgotten).clone()
    }

    /// `(user_id, watched session released)` per cache clear.
    pub(crate) fn cleared(&self) -> Vec<(String, bool)> {
        locked(&self.cleared).clone()
    }
}

#[async_trait]
impl SessionStore for FakeSessionStore {
    fn has_stored_sessions(&self) -> bool {
        !locked(&self.restores).is_empty()
    }

    async fn restore_session(&self) -> Result<Arc<dyn LiveSession>, SessionError> {
        self.restore_calls.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.restore_gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        locked(&self.restores)
            .pop_front()
            .unwrap_or_else(|| Err(SessionError::missing_credentials()))
    }

    async fn forget_session(&self, user_id: &str) -> Result<(), SessionError> {
        locked(&self.forgotten).push(user_id.to_owned());
        Ok(())
    }

    async fn clear_caches(&self, user_id: &str) -> Result<(), SessionError> {
        let released = locked(&self.released_before_clear)
            .as_ref()
            .is_none_or(|weak| weak.upgrade().is_none());
        locked(&self.cleared).push((user_id.to_owned(), released));
        Ok(())
    }

    async fn reset_all(&self) -> Result<(), SessionError> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum UiCall {
    ShowSplash,
    ShowPlaceholder,
    StartAuthentication,
    StartSoftLogout { user_id: String },
    ShowAppLockSetup,
    SessionAvailable { user_id: String, is_new_login: bool },
    StopSessionFlow,
    SessionTornDown,
    Navigate { route: Route, animated: bool },
}

/// UI flow that records calls and never retains the session.
#[derive(Default)]
pub(crate) struct RecordingUi {
    calls: Mutex<Vec<UiCall>>,
}

impl RecordingUi {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn calls(&self) -> Vec<UiCall> {
        locked(&self.calls).clone()
    }

    fn push(&self, call: UiCall) {
        locked(&self.calls).push(call);
    }
}

impl UiFlow for RecordingUi {
    fn show_splash(&self) {
        self.push(UiCall::ShowSplash);
    }

    fn show_placeholder(&self) {
        self.push(UiCall::ShowPlaceholder);
    }

    fn start_authentication(&self) {
        self.push(UiCall::StartAuthentication);
    }

    fn start_soft_logout(&self, identity: SessionIdentity) {
        self.push(UiCall::StartSoftLogout {
            user_id: identity.user_id,
        });
    }

    fn show_app_lock_setup(&self) {
        self.push(UiCall::ShowAppLockSetup);
    }

    fn session_available(&self, session: &Arc<dyn LiveSession>, is_new_login: bool) {
        self.push(UiCall::SessionAvailable {
            user_id: session.identity().user_id,
            is_new_login,
        });
    }

    fn stop_session_flow(&self) {
        self.push(UiCall::StopSessionFlow);
    }

    fn session_torn_down(&self) {
        self.push(UiCall::SessionTornDown);
    }

    fn navigate(&self, route: &Route, animated: bool) {
        self.push(UiCall::Navigate {
            route: route.clone(),
            animated,
        });
    }
}

#[derive(Default)]
pub(crate) struct RecordingIndicators {
    submitted: Mutex<Vec<UserIndicator>>,
    retracted: Mutex<Vec<String>>,
}

impl RecordingIndicators {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn submitted(&self) -> Vec<UserIndicator> {
        locked(&self.submitted).clone()
    }

    pub(crate) fn retracted(&self) -> Vec<String> {
        locked(&self.retracted).clone()
    }
}

impl UserIndicators for RecordingIndicators {
    fn submit(&self, indicator: UserIndicator) {
        locked(&self.submitted).push(indicator);
    }

    fn retract(&self, id: &str) {
        locked(&self.retracted).push(id.to_owned());
    }
}

#[derive(Default)]
pub(crate) struct FakeNotifications {
    unregister_calls: AtomicUsize,
    remove_all_calls: AtomicUsize,
    local: Mutex<Vec<(String, String)>>,
}

impl FakeNotifications {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn unregister_calls(&self) -> usize {
        self.unregister_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn remove_all_calls(&self) -> usize {
        self.remove_all_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn local_notifications(&self) -> Vec<(String, String)> {
        locked(&self.local).clone()
    }
}

impl NotificationCenter for FakeNotifications {
    fn unregister_remote_notifications(&self) {
        self.unregister_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn remove_all_notifications(&self) {
        self.remove_all_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn show_local_notification(&self, title: &str, body: &str) {
        locked(&self.local).push((title.to_owned(), body.to_owned()));
    }
}

pub(crate) struct FakeSettings {
    last_version: Mutex<Option<AppVersion>>,
    session_scoped_resets: AtomicUsize,
    full_resets: AtomicUsize,
}

impl FakeSettings {
    pub(crate) fn new(last_version: Option<AppVersion>) -> Arc<Self> {
        Arc::new(Self {
            last_version: Mutex::new(last_version),
            session_scoped_resets: AtomicUsize::new(0),
            full_resets: AtomicUsize::new(0),
        })
    }

    pub(crate) fn session_scoped_resets(&self) -> usize {
        self.session_scoped_resets.load(Ordering::SeqCst)
    }

    pub(crate) fn full_resets(&self) -> usize {
        self.full_resets.load(Ordering::SeqCst)
    }
}

impl SessionSettings for FakeSettings {
    fn last_version_launched(&self) -> Option<AppVersion> {
        *locked(&self.last_version)
    }

    fn set_last_version_launched(&self, version: AppVersion) {
        *locked(&self.last_version) = Some(version);
    }

    fn reset_session_scoped(&self) {
        self.session_scoped_resets.fetch_add(1, Ordering::SeqCst);
    }

    fn reset_all(&self) {
        self.full_resets.fetch_add(1, Ordering::SeqCst);
        locked(&self.last_version).take();
    }
}

pub(crate) struct FakeAppLock {
    mandatory: bool,
    configured: bool,
    disable_calls: AtomicUsize,
}

impl FakeAppLock {
    pub(crate) fn new(mandatory: bool, configured: bool) -> Arc<Self> {
        Arc::new(Self {
            mandatory,
            configured,
            disable_calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn disable_calls(&self) -> usize {
        self.disable_calls.load(Ordering::SeqCst)
    }
}

impl AppLock for FakeAppLock {
    fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn disable(&self) {
        self.disable_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Platform double whose expirations and refresh runs are fired by the test.
pub(crate) struct FakePlatform {
    app_state: Mutex<AppState>,
    next_id: AtomicUsize,
    begun: AtomicUsize,
    ended: AtomicUsize,
    outstanding: Mutex<HashSet<BackgroundTaskId>>,
    expirations: Mutex<Vec<ExpirationHandler>>,
    launchers: Mutex<HashMap<String, RefreshLauncher>>,
    scheduled: AtomicUsize,
}

impl FakePlatform {
    pub(crate) fn new(app_state: AppState) -> Arc<Self> {
        Arc::new(Self {
            app_state: Mutex::new(app_state),
            next_id: AtomicUsize::new(1),
            begun: AtomicUsize::new(0),
            ended: AtomicUsize::new(0),
            outstanding: Mutex::new(HashSet::new()),
            expirations: Mutex::new(Vec::new()),
            launchers: Mutex::new(HashMap::new()),
            scheduled: AtomicUsize::new(0),
        })
    }

    pub(crate) fn set_app_state(&self, state: AppState) {
        *locked(&self.app_state) = state;
    }

    pub(crate) fn begun(&self) -> usize {
        self.begun.load(Ordering::SeqCst)
    }

    /// Every `end_background_task` call, including unknown ids.
    pub(crate) fn ended(&self) -> usize {
        self.ended.load(Ordering::SeqCst)
    }

    pub(crate) fn outstanding(&self) -> usize {
        locked(&self.outstanding).len()
    }

    pub(crate) fn scheduled_refreshes(&self) -> usize {
        self.scheduled.load(Ordering::SeqCst)
    }

    /// Fire every expiration handler handed out so far.
    pub(crate) fn expire_all(&self) {
        let handlers: Vec<_> = locked(&self.expirations).drain(..).collect();
        for handler in handlers {
            handler();
        }
    }

    /// Run the registered refresh launcher, if any.
    pub(crate) fn run_refresh(&self, task: RefreshTask) {
        let launcher = locked(&self.launchers).values().next().cloned();
        match launcher {
            Some(launcher) => launcher(task),
            None => panic!("no refresh launcher registered"),
        }
    }
}

impl BackgroundTaskPlatform for FakePlatform {
    fn app_state(&self) -> AppState {
        *locked(&self.app_state)
    }

    fn begin_background_task(
        &self,
        _name: &str,
        on_expire: ExpirationHandler,
    ) -> Option<BackgroundTaskId> {
        let id = BackgroundTaskId(self.next_id.fetch_add(1, Ordering::SeqCst) as u64);
        self.begun.fetch_add(1, Ordering::SeqCst);
        locked(&self.outstanding).insert(id);
        locked(&self.expirations).push(on_expire);
        Some(id)
    }

    fn end_background_task(&self, id: BackgroundTaskId) {
        self.ended.fetch_add(1, Ordering::SeqCst);
        locked(&self.outstanding).remove(&id);
    }

    fn register_refresh_task(
        &self,
        task_id: &str,
        launcher: RefreshLauncher,
    ) -> Result<(), PlatformError> {
        locked(&self.launchers).insert(task_id.to_owned(), launcher);
        Ok(())
    }

    fn schedule_refresh_task(
        &self,
        task_id: &str,
        _earliest_begin: Duration,
    ) -> Result<(), PlatformError> {
        if !locked(&self.launchers).contains_key(task_id) {
            return Err(PlatformError::RefreshTaskNotRegistered(task_id.to_owned()));
        }
        self.scheduled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
