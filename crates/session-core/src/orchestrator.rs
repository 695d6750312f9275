//! Session lifecycle orchestrator.
//!
//! A single tokio task owns the state machine, the live session and the
//! deferred intents. Public operations and the results of long-running work
//! (restore, logout, cache purge) all arrive as [`Trigger`]s on one queue, so
//! handlers never race each other and never block on I/O.

use std::{collections::HashSet, fmt, sync::Arc};

use tokio::{
    runtime::Handle,
    sync::{broadcast::error::RecvError, mpsc, watch},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    background::BackgroundSyncScheduler,
    channel::{EventStream, LifecycleChannelError, LifecycleChannels},
    config::OrchestratorConfig,
    deferred::DeferredIntents,
    error::SessionError,
    services::{
        AppLock, BackgroundTaskPlatform, LiveSession, NotificationCenter, SessionSettings,
        SessionStore, UiFlow, UserIndicators,
    },
    state_machine::{
        SessionEvent, SessionState, SessionStateMachine, Transition, report_unhandled_transition,
    },
    types::{
        AppState, IndicatorKind, InlineReply, LifecycleEvent, Route, SessionNotice, UserIndicator,
    },
    version::AppVersion,
};

/// Stores written before this version used an incompatible crypto store.
const CRYPTO_STORE_RESET_VERSION: AppVersion = AppVersion::new(1, 1, 0);
/// Restored sessions from before this version migrate their media preview settings.
const MEDIA_PREVIEW_MIGRATION_VERSION: AppVersion = AppVersion::new(1, 6, 0);

const LOADING_INDICATOR_ID: &str = "session-lifecycle-loading";
const RESTORE_FAILED_INDICATOR_ID: &str = "session-restore-failed";
const OFFLINE_INDICATOR_ID: &str = "session-offline";
const INLINE_REPLY_FAILED_TITLE: &str = "Message not sent";

/// Everything outside the lifecycle core, injected once at startup.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn SessionStore>,
    pub ui: Arc<dyn UiFlow>,
    pub indicators: Arc<dyn UserIndicators>,
    pub notifications: Arc<dyn NotificationCenter>,
    pub settings: Arc<dyn SessionSettings>,
    pub app_lock: Arc<dyn AppLock>,
    pub platform: Arc<dyn BackgroundTaskPlatform>,
}

/// Inputs of the orchestrator task.
pub(crate) enum Trigger {
    Start,
    SessionCreated(Arc<dyn LiveSession>),
    SignOut {
        is_soft: bool,
        disable_app_lock: bool,
    },
    ClearCache,
    AppLockSetupCompleted,
    SubmitRoute(Route),
    SubmitInlineReply(InlineReply),
    SubmitRoomsToAwait(HashSet<String>),
    ResignActive,
    BecomeActive,
    WillTerminate,
    Reachability {
        reachable: bool,
    },
    RestoreFinished(Result<Arc<dyn LiveSession>, SessionError>),
    AuthError {
        is_soft: bool,
    },
    SyncStoppedForSignOut,
    SignOutFinished,
    CacheCleared,
}

impl Trigger {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::SessionCreated(_) => "session_created",
            Self::SignOut { .. } => "sign_out",
            Self::ClearCache => "clear_cache",
            Self::AppLockSetupCompleted => "app_lock_setup_completed",
            Self::SubmitRoute(_) => "submit_route",
            Self::SubmitInlineReply(_) => "submit_inline_reply",
            Self::SubmitRoomsToAwait(_) => "submit_rooms_to_await",
            Self::ResignActive => "resign_active",
            Self::BecomeActive => "become_active",
            Self::WillTerminate => "will_terminate",
            Self::Reachability { .. } => "reachability",
            Self::RestoreFinished(_) => "restore_finished",
            Self::AuthError { .. } => "auth_error",
            Self::SyncStoppedForSignOut => "sync_stopped_for_sign_out",
            Self::SignOutFinished => "sign_out_finished",
            Self::CacheCleared => "cache_cleared",
        }
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Cloneable handle to a running orchestrator.
#[derive(Clone, Debug)]
pub struct OrchestratorHandle {
    channels: LifecycleChannels,
}

impl OrchestratorHandle {
    /// Decide between authentication, app-lock setup and restore. Valid once, from `Initial`.
    pub async fn start(&self) -> Result<(), LifecycleChannelError> {
        self.channels.send(Trigger::Start).await
    }

    /// A login or re-authentication produced a live session.
    pub async fn session_created(
        &self,
        session: Arc<dyn LiveSession>,
    ) -> Result<(), LifecycleChannelError> {
        self.channels.send(Trigger::SessionCreated(session)).await
    }

    pub async fn sign_out(
        &self,
        is_soft: bool,
        disable_app_lock: bool,
    ) -> Result<(), LifecycleChannelError> {
        self.channels
            .send(Trigger::SignOut {
                is_soft,
                disable_app_lock,
            })
            .await
    }

    pub async fn clear_cache(&self) -> Result<(), LifecycleChannelError> {
        self.channels.send(Trigger::ClearCache).await
    }

    pub async fn app_lock_setup_completed(&self) -> Result<(), LifecycleChannelError> {
        self.channels.send(Trigger::AppLockSetupCompleted).await
    }

    /// Navigate now when a session flow is running, otherwise defer.
    pub async fn submit_route(&self, route: Route) -> Result<(), LifecycleChannelError> {
        self.channels.send(Trigger::SubmitRoute(route)).await
    }

    pub async fn submit_inline_reply(
        &self,
        room_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<(), LifecycleChannelError> {
        self.channels
            .send(Trigger::SubmitInlineReply(InlineReply {
                room_id: room_id.into(),
                body: body.into(),
            }))
            .await
    }

    pub async fn submit_rooms_to_await(
        &self,
        room_ids: HashSet<String>,
    ) -> Result<(), LifecycleChannelError> {
        self.channels
            .send(Trigger::SubmitRoomsToAwait(room_ids))
            .await
    }

    pub async fn application_will_resign_active(&self) -> Result<(), LifecycleChannelError> {
        self.channels.send(Trigger::ResignActive).await
    }

    pub async fn application_did_become_active(&self) -> Result<(), LifecycleChannelError> {
        self.channels.send(Trigger::BecomeActive).await
    }

    pub async fn application_will_terminate(&self) -> Result<(), LifecycleChannelError> {
        self.channels.send(Trigger::WillTerminate).await
    }

    pub async fn network_reachability_changed(
        &self,
        reachable: bool,
    ) -> Result<(), LifecycleChannelError> {
        self.channels
            .send(Trigger::Reachability { reachable })
            .await
    }

    pub fn subscribe(&self) -> EventStream {
        self.channels.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.channels.state()
    }

    pub fn state_receiver(&self) -> watch::Receiver<SessionState> {
        self.channels.state_receiver()
    }
}

/// Spawn the orchestrator task on the current tokio runtime.
///
/// Launch migrations run before the first trigger is handled.
pub fn spawn_orchestrator(
    config: OrchestratorConfig,
    collaborators: Collaborators,
) -> OrchestratorHandle {
    let (channels, command_rx) = LifecycleChannels::new(config.command_buffer, config.event_buffer);
    let scheduler = BackgroundSyncScheduler::new(
        Arc::clone(&collaborators.platform),
        &config,
        Handle::current(),
    );
    scheduler.register();

    let orchestrator = Orchestrator {
        config,
        channels: channels.clone(),
        services: collaborators,
        scheduler,
        machine: SessionStateMachine::default(),
        deferred: DeferredIntents::new(),
        session: None,
        flow_active: false,
        pending_media_preview_migration: false,
        clearing_cache: false,
        cache_cleared_user: None,
        restore_in_flight: false,
        forget_pending_restore: false,
        reachable: true,
        notice_forwarder: None,
    };
    tokio::spawn(async move {
        orchestrator.run(command_rx).await;
    });

    OrchestratorHandle { channels }
}

struct Orchestrator {
    config: OrchestratorConfig,
    channels: LifecycleChannels,
    services: Collaborators,
    scheduler: BackgroundSyncScheduler,
    machine: SessionStateMachine,
    deferred: DeferredIntents,
    session: Option<Arc<dyn LiveSession>>,
    /// The UI flow was handed the current session and has not been stopped.
    flow_active: bool,
    pending_media_preview_migration: bool,
    clearing_cache: bool,
    /// Owner of the session a cache clear tore down, until the restart.
    cache_cleared_user: Option<String>,
    restore_in_flight: bool,
    /// A hard sign-out ran while a restore was in flight.
    forget_pending_restore: bool,
    reachable: bool,
    notice_forwarder: Option<CancellationToken>,
}

impl Orchestrator {
    async fn run(mut self, mut command_rx: mpsc::Receiver<Trigger>) {
        self.run_launch_migrations().await;

        while let Some(trigger) = command_rx.recv().await {
            debug!(trigger = trigger.kind(), state = ?self.machine.state(), "handling trigger");
            self.handle(trigger);
        }
        debug!("orchestrator stopped");
    }

    async fn run_launch_migrations(&mut self) {
        let current = self.config.app_version;
        let previous = self.services.settings.last_version_launched();

        match previous {
            None => {
                info!(%current, "first launch, wiping stored sessions and settings");
                if let Err(err) = self.services.store.reset_all().await {
                    warn!(error = %err, "failed wiping stored sessions");
                }
                self.services.settings.reset_all();
            }
            Some(previous) if previous < CRYPTO_STORE_RESET_VERSION => {
                info!(%previous, %current, "crypto store changed, wiping stored sessions");
                if let Err(err) = self.services.store.reset_all().await {
                    warn!(error = %err, "failed wiping stored sessions");
                }
            }
            Some(previous) => debug!(%previous, %current, "no launch migration needed"),
        }

        self.pending_media_preview_migration =
            previous.is_some_and(|previous| previous < MEDIA_PREVIEW_MIGRATION_VERSION);
        self.services.settings.set_last_version_launched(current);
    }

    fn handle(&mut self, trigger: Trigger) {
        match trigger {
            Trigger::Start => self.start(),
            Trigger::SessionCreated(session) => self.accept_session(session),
            Trigger::SignOut {
                is_soft,
                disable_app_lock,
            } => self.process(SessionEvent::SignOut {
                is_soft,
                disable_app_lock,
            }),
            Trigger::ClearCache => self.process(SessionEvent::ClearCache),
            Trigger::AppLockSetupCompleted => self.process(SessionEvent::AppLockSetupComplete),
            Trigger::SubmitRoute(route) => self.submit_route(route),
            Trigger::SubmitInlineReply(reply) => self.submit_inline_reply(reply),
            Trigger::SubmitRoomsToAwait(room_ids) => self.submit_rooms_to_await(room_ids),
            Trigger::ResignActive => self.scheduler.on_resign_active(),
            Trigger::BecomeActive => self.scheduler.on_become_active(),
            Trigger::WillTerminate => self.stop_sync_for_termination(),
            Trigger::Reachability { reachable } => self.reachability_changed(reachable),
            Trigger::RestoreFinished(result) => self.restore_finished(result),
            Trigger::AuthError { is_soft } => {
                warn!(is_soft, "session reported an authentication error");
                self.process(SessionEvent::SignOut {
                    is_soft,
                    disable_app_lock: false,
                });
            }
            Trigger::SyncStoppedForSignOut => self.sign_out_after_sync_stopped(),
            Trigger::SignOutFinished => self.complete_sign_out(),
            Trigger::CacheCleared => self.restart_after_cache_clear(),
        }
    }

    /// Feed `event` to the state machine and run the handler of the matched row.
    fn process(&mut self, event: SessionEvent) {
        let from = self.machine.state();
        let Some(row) = self.machine.process_or_report(event) else {
            self.channels
                .emit(LifecycleEvent::TransitionRejected { state: from, event });
            return;
        };

        let to = row.target();
        info!(from = ?from, event = ?event, to = ?to, "session transition");
        self.channels.publish_state(to);
        self.channels
            .emit(LifecycleEvent::StateChanged { from, event, to });
        self.dispatch(row);
    }

    fn dispatch(&mut self, row: Transition) {
        match row {
            Transition::StartAuthentication => self.services.ui.start_authentication(),
            Transition::StartAppLockSetup => self.services.ui.show_app_lock_setup(),
            Transition::RestoreSession => self.restore_session(),
            Transition::RestoreFailed => {
                self.services.indicators.submit(UserIndicator {
                    id: RESTORE_FAILED_INDICATOR_ID.to_owned(),
                    kind: IndicatorKind::Toast,
                    title: "Failed logging in".to_owned(),
                    persistent: false,
                });
                self.services.ui.start_authentication();
            }
            Transition::SignIn { is_new_login } => self.setup_live_session(is_new_login),
            Transition::BeginSignOut { is_soft, .. } => self.begin_sign_out(is_soft),
            Transition::IgnoreSignOut { is_soft, .. } => {
                debug!(is_soft, "sign out already in progress, ignoring");
            }
            Transition::CompleteSignOut { disable_app_lock } => {
                self.present_splash(false, disable_app_lock);
            }
            Transition::ShowSoftLogout { disable_app_lock } => {
                self.present_splash(true, disable_app_lock);
            }
            Transition::ClearCache => self.clear_cache(),
        }
    }

    fn start(&mut self) {
        let state = self.machine.state();
        if state != SessionState::Initial || self.clearing_cache {
            error!(state = ?state, clearing_cache = self.clearing_cache, "start requested twice, ignoring");
            return;
        }

        let event = if !self.services.store.has_stored_sessions() {
            SessionEvent::StartWithAuthentication
        } else if self.services.app_lock.is_mandatory() && !self.services.app_lock.is_configured() {
            SessionEvent::StartWithAppLockSetup
        } else {
            SessionEvent::StartWithExistingSession
        };
        self.process(event);
    }

    fn restore_session(&mut self) {
        self.services.ui.show_splash();

        let store = Arc::clone(&self.services.store);
        let tx = self.channels.command_sender();
        let migrate_media_preview = std::mem::take(&mut self.pending_media_preview_migration);
        self.restore_in_flight = true;
        tokio::spawn(async move {
            let result = store.restore_session().await;
            if migrate_media_preview
                && let Ok(session) = &result
                && let Err(err) = session.migrate_media_preview_config().await
            {
                warn!(error = %err, "media preview migration failed");
            }
            send_back(&tx, Trigger::RestoreFinished(result)).await;
        });
    }

    fn restore_finished(&mut self, result: Result<Arc<dyn LiveSession>, SessionError>) {
        self.restore_in_flight = false;
        let state = self.machine.state();
        let forget = std::mem::take(&mut self.forget_pending_restore)
            || matches!(state, SessionState::SigningOut { is_soft: false, .. });
        if state != SessionState::RestoringSession {
            warn!(state = ?state, "dropping stale restore result");
            if forget && let Ok(session) = result {
                self.forget_stale_session(session);
            }
            return;
        }

        match result {
            Ok(session) => {
                info!(user_id = %session.identity().user_id, "restored session");
                self.accept_session(session);
            }
            Err(err) => {
                warn!(error = %err, "failed restoring session");
                self.process(SessionEvent::FailedRestoringSession);
            }
        }
    }

    /// Log out and forget a session restored after a hard sign-out began.
    fn forget_stale_session(&self, session: Arc<dyn LiveSession>) {
        let user_id = session.identity().user_id;
        if self
            .session
            .as_ref()
            .is_some_and(|live| live.identity().user_id == user_id)
        {
            return;
        }

        let store = Arc::clone(&self.services.store);
        tokio::spawn(async move {
            if let Err(err) = session.logout().await {
                warn!(%user_id, error = %err, "server logout of stale session failed");
            }
            drop(session);
            if let Err(err) = store.forget_session(&user_id).await {
                warn!(%user_id, error = %err, "failed forgetting stale session");
            }
        });
    }

    fn accept_session(&mut self, session: Arc<dyn LiveSession>) {
        let from = self.machine.state();
        if let Err(err) = self.machine.validate(SessionEvent::CreatedUserSession) {
            report_unhandled_transition(err);
            self.channels.emit(LifecycleEvent::TransitionRejected {
                state: from,
                event: SessionEvent::CreatedUserSession,
            });
            return;
        }

        if let Some(previous) = self.session.replace(session) {
            debug!(user_id = %previous.identity().user_id, "replacing soft logged out session");
        }
        self.process(SessionEvent::CreatedUserSession);
    }

    fn setup_live_session(&mut self, is_new_login: bool) {
        let Some(session) = self.session.clone() else {
            error!("signed in without a live session");
            return;
        };

        self.scheduler.attach(&session);
        self.start_notice_forwarder(&session);
        session.start_sync();
        if !self.reachable {
            session.set_send_queue_enabled(false);
        }

        self.services.ui.session_available(&session, is_new_login);
        self.flow_active = true;

        let pending = self.deferred.drain();
        if let Some(room_ids) = pending.rooms_to_await {
            debug!(count = room_ids.len(), "forwarding deferred rooms to await");
            session.await_room_memberships(room_ids);
        }
        if let Some(route) = pending.route {
            self.deliver_route(route, false, true);
        }
        if let Some(reply) = pending.inline_reply {
            self.send_inline_reply(&session, reply);
        }
    }

    fn start_notice_forwarder(&mut self, session: &Arc<dyn LiveSession>) {
        self.stop_notice_forwarder();

        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let mut notices = session.subscribe();
        let tx = self.channels.command_sender();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    notice = notices.recv() => match notice {
                        Ok(SessionNotice::AuthError { is_soft }) => {
                            if tx.send(Trigger::AuthError { is_soft }).await.is_err() {
                                break;
                            }
                        }
                        Ok(SessionNotice::SyncUpdate) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "session notice forwarder lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });
        self.notice_forwarder = Some(cancel);
    }

    fn stop_notice_forwarder(&mut self) {
        if let Some(cancel) = self.notice_forwarder.take() {
            cancel.cancel();
        }
    }

    fn begin_sign_out(&mut self, is_soft: bool) {
        info!(is_soft, "signing out");
        self.show_loading_indicator();
        self.stop_notice_forwarder();
        self.scheduler.detach();

        let session = self.session.clone();
        if session.is_none() {
            warn!("sign out without a live session");
        }
        let tx = self.channels.command_sender();
        tokio::spawn(async move {
            if let Some(session) = session {
                session.stop_sync().await;
            }
            send_back(&tx, Trigger::SyncStoppedForSignOut).await;
        });
    }

    fn sign_out_after_sync_stopped(&mut self) {
        let SessionState::SigningOut { is_soft, .. } = self.machine.state() else {
            warn!(state = ?self.machine.state(), "sync stopped outside of sign out");
            return;
        };

        if std::mem::take(&mut self.flow_active) {
            self.services.ui.stop_session_flow();
        }

        if is_soft {
            self.process(SessionEvent::ShowSoftLogout);
            self.hide_loading_indicator();
            return;
        }

        self.services.notifications.unregister_remote_notifications();
        self.services.notifications.remove_all_notifications();

        if self.restore_in_flight {
            self.forget_pending_restore = true;
        }
        let session = self.session.clone();
        let user_id = match &session {
            Some(session) => Some(session.identity().user_id),
            None => self.cache_cleared_user.take(),
        };
        let store = Arc::clone(&self.services.store);
        let tx = self.channels.command_sender();
        tokio::spawn(async move {
            if let Some(session) = session {
                if let Err(err) = session.logout().await {
                    warn!(error = %err, "server logout failed, continuing local teardown");
                }
                drop(session);
            }
            if let Some(user_id) = user_id
                && let Err(err) = store.forget_session(&user_id).await
            {
                warn!(%user_id, error = %err, "failed forgetting stored session");
            }
            send_back(&tx, Trigger::SignOutFinished).await;
        });
    }

    fn complete_sign_out(&mut self) {
        self.tear_down_session();
        self.services.settings.reset_session_scoped();
        self.process(SessionEvent::CompletedSigningOut);
        self.hide_loading_indicator();
    }

    fn present_splash(&mut self, soft_logout: bool, disable_app_lock: bool) {
        match self.session.as_ref() {
            Some(session) if soft_logout => {
                self.services.ui.start_soft_logout(session.identity());
            }
            _ => self.services.ui.start_authentication(),
        }

        if disable_app_lock {
            let app_lock = Arc::clone(&self.services.app_lock);
            let delay = self.config.app_lock_disable_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                info!("disabling app lock after forced sign out");
                app_lock.disable();
            });
        }
    }

    fn clear_cache(&mut self) {
        info!("clearing session caches");
        self.clearing_cache = true;
        self.show_loading_indicator();
        self.services.ui.show_placeholder();
        self.stop_notice_forwarder();
        self.scheduler.detach();
        if std::mem::take(&mut self.flow_active) {
            self.services.ui.stop_session_flow();
        }
        let session = self.tear_down_session();
        self.cache_cleared_user = session.as_ref().map(|session| session.identity().user_id);

        let store = Arc::clone(&self.services.store);
        let settle = self.config.cache_clear_settle;
        let tx = self.channels.command_sender();
        tokio::spawn(async move {
            let user_id = match session {
                Some(session) => {
                    session.stop_sync().await;
                    Some(session.identity().user_id)
                }
                None => None,
            };

            tokio::time::sleep(settle).await;
            if let Some(user_id) = user_id
                && let Err(err) = store.clear_caches(&user_id).await
            {
                warn!(%user_id, error = %err, "failed clearing caches");
            }
            send_back(&tx, Trigger::CacheCleared).await;
        });
    }

    fn restart_after_cache_clear(&mut self) {
        self.clearing_cache = false;
        self.cache_cleared_user = None;
        let state = self.machine.state();
        if state == SessionState::Initial {
            self.process(SessionEvent::StartWithExistingSession);
        } else {
            warn!(state = ?state, "session left the cache clear, skipping restart");
        }
        self.hide_loading_indicator();
    }

    /// Drop the orchestrator's session handle and tell the UI to release its own.
    fn tear_down_session(&mut self) -> Option<Arc<dyn LiveSession>> {
        let session = self.session.take();
        if session.is_some() {
            self.services.ui.session_torn_down();
        }
        session
    }

    fn live_flow_session(&self) -> Option<Arc<dyn LiveSession>> {
        if self.flow_active && self.machine.state() == SessionState::SignedIn {
            self.session.clone()
        } else {
            None
        }
    }

    fn submit_route(&mut self, route: Route) {
        if self.live_flow_session().is_some() {
            let animated = self.services.platform.app_state() == AppState::Active;
            self.deliver_route(route, animated, false);
        } else {
            debug!(?route, "deferring route");
            self.deferred.store_route(route);
        }
    }

    fn submit_inline_reply(&mut self, reply: InlineReply) {
        match self.live_flow_session() {
            Some(session) => self.send_inline_reply(&session, reply),
            None => {
                debug!(room_id = %reply.room_id, "deferring inline reply");
                self.deferred.store_inline_reply(reply);
            }
        }
    }

    fn submit_rooms_to_await(&mut self, room_ids: HashSet<String>) {
        match self.live_flow_session() {
            Some(session) => session.await_room_memberships(room_ids),
            None => {
                debug!(count = room_ids.len(), "deferring rooms to await");
                self.deferred.store_rooms_to_await(room_ids);
            }
        }
    }

    fn deliver_route(&self, route: Route, animated: bool, deferred: bool) {
        debug!(?route, animated, deferred, "navigating");
        self.services.ui.navigate(&route, animated);
        self.channels
            .emit(LifecycleEvent::RouteDelivered { route, deferred });
    }

    fn send_inline_reply(&self, session: &Arc<dyn LiveSession>, reply: InlineReply) {
        let session = Arc::downgrade(session);
        let notifications = Arc::clone(&self.services.notifications);
        tokio::spawn(async move {
            let Some(session) = session.upgrade() else {
                warn!(room_id = %reply.room_id, "session gone before inline reply was sent");
                return;
            };
            if let Err(err) = session.send_text(&reply.room_id, &reply.body).await {
                warn!(room_id = %reply.room_id, error = %err, "inline reply failed");
                notifications.show_local_notification(INLINE_REPLY_FAILED_TITLE, &reply.body);
            }
        });
    }

    fn stop_sync_for_termination(&self) {
        if let Some(session) = self.session.clone() {
            info!("application terminating, stopping sync");
            tokio::spawn(async move {
                session.stop_sync().await;
            });
        }
    }

    fn reachability_changed(&mut self, reachable: bool) {
        if self.reachable == reachable {
            return;
        }
        self.reachable = reachable;
        info!(reachable, "network reachability changed");

        if reachable {
            self.services.indicators.retract(OFFLINE_INDICATOR_ID);
            if let Some(session) = &self.session {
                session.set_send_queue_enabled(true);
            }
        } else {
            self.services.indicators.submit(UserIndicator {
                id: OFFLINE_INDICATOR_ID.to_owned(),
                kind: IndicatorKind::Toast,
                title: "Offline".to_owned(),
                persistent: true,
            });
        }
    }

    fn show_loading_indicator(&self) {
        self.services.indicators.submit(UserIndicator {
            id: LOADING_INDICATOR_ID.to_owned(),
            kind: IndicatorKind::Modal,
            title: "Loading".to_owned(),
            persistent: true,
        });
    }

    fn hide_loading_indicator(&self) {
        self.services.indicators.retract(LOADING_INDICATOR_ID);
    }
}

async fn send_back(tx: &mpsc::Sender<Trigger>, trigger: Trigger) {
    let kind = trigger.kind();
    if tx.send(trigger).await.is_err() {
        debug!(trigger = kind, "orchestrator gone, dropping trigger");
    }
}
