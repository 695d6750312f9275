//! Keeps the sync loop alive for a bounded time after suspension and drives
//! periodic background refreshes.
//!
//! At most one platform background-task handle is outstanding at a time and
//! every acquired handle is released exactly once, by whichever of the
//! expiration handler or `on_become_active` takes it first.

use std::{
    sync::{
        Arc, Mutex, PoisonError, RwLock, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{runtime::Handle, sync::broadcast::error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::OrchestratorConfig,
    services::{
        BackgroundTaskId, BackgroundTaskPlatform, ExpirationHandler, LiveSession,
        RefreshCompletion, RefreshLauncher, RefreshTask,
    },
    types::{AppState, SessionNotice},
};

const BACKGROUND_TASK_NAME: &str = "session-sync";

/// Background sync scheduler shared between the orchestrator and platform callbacks.
#[derive(Clone)]
pub struct BackgroundSyncScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    platform: Arc<dyn BackgroundTaskPlatform>,
    refresh_task_id: String,
    refresh_earliest_begin: Duration,
    refresh_max_sync_updates: usize,
    refresh_time_budget: Duration,
    session: RwLock<Option<Weak<dyn LiveSession>>>,
    task: Mutex<Option<BackgroundTaskId>>,
    suspended: AtomicBool,
    runtime: Handle,
}

impl BackgroundSyncScheduler {
    pub fn new(
        platform: Arc<dyn BackgroundTaskPlatform>,
        config: &OrchestratorConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                platform,
                refresh_task_id: config.refresh_task_id.clone(),
                refresh_earliest_begin: config.refresh_earliest_begin,
                refresh_max_sync_updates: config.refresh_max_sync_updates,
                refresh_time_budget: config.refresh_time_budget,
                session: RwLock::new(None),
                task: Mutex::new(None),
                suspended: AtomicBool::new(false),
                runtime,
            }),
        }
    }

    /// Register the periodic refresh launcher with the platform.
    pub fn register(&self) {
        let weak = Arc::downgrade(&self.inner);
        let launcher: RefreshLauncher = Arc::new(move |task: RefreshTask| {
            if let Some(inner) = weak.upgrade() {
                inner.on_periodic_refresh(task);
            } else {
                let (_, complete) = task.into_parts();
                complete(true);
            }
        });

        match self
            .inner
            .platform
            .register_refresh_task(&self.inner.refresh_task_id, launcher)
        {
            Ok(()) => info!(task_id = %self.inner.refresh_task_id, "registered periodic refresh"),
            Err(err) => warn!(error = %err, "failed registering periodic refresh"),
        }
    }

    /// Borrow the live session for the duration of the session.
    pub fn attach(&self, session: &Arc<dyn LiveSession>) {
        *self
            .inner
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::downgrade(session));
    }

    /// Forget the live session and release any outstanding handle.
    pub fn detach(&self) {
        self.inner
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(id) = self.inner.take_task() {
            debug!(task = id.0, "releasing background task on detach");
            self.inner.platform.end_background_task(id);
        }
    }

    pub fn on_resign_active(&self) {
        let inner = &self.inner;
        if inner.platform.app_state() == AppState::Active {
            debug!("app is still active, skipping background task");
            return;
        }

        {
            let mut task = inner.task.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(id) = *task {
                debug!(task = id.0, "background task already outstanding");
                return;
            }

            let weak = Arc::downgrade(inner);
            let on_expire: ExpirationHandler = Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.expire();
                }
            });
            match inner
                .platform
                .begin_background_task(BACKGROUND_TASK_NAME, on_expire)
            {
                Some(id) => {
                    info!(task = id.0, "began background task");
                    *task = Some(id);
                }
                None => warn!("platform refused background task"),
            }
        }

        inner.suspended.store(true, Ordering::SeqCst);
        inner.schedule_refresh();
    }

    pub fn on_become_active(&self) {
        let inner = &self.inner;
        if let Some(id) = inner.take_task() {
            info!(task = id.0, "ending background task");
            inner.platform.end_background_task(id);
        }

        if inner.suspended.swap(false, Ordering::SeqCst)
            && let Some(session) = inner.session()
        {
            session.start_sync();
        }
    }

    pub fn has_outstanding_task(&self) -> bool {
        self.inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Inner {
    fn session(&self) -> Option<Arc<dyn LiveSession>> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }

    fn take_task(&self) -> Option<BackgroundTaskId> {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn schedule_refresh(&self) {
        match self
            .platform
            .schedule_refresh_task(&self.refresh_task_id, self.refresh_earliest_begin)
        {
            Ok(()) => debug!(
                earliest_begin_secs = self.refresh_earliest_begin.as_secs(),
                "scheduled periodic refresh"
            ),
            Err(err) => warn!(error = %err, "failed scheduling periodic refresh"),
        }
    }

    fn expire(self: Arc<Self>) {
        let Some(id) = self.take_task() else {
            debug!("background task already released");
            return;
        };
        info!(task = id.0, "background task expiring");

        let runtime = self.runtime.clone();
        runtime.spawn(async move {
            if self.suspended.load(Ordering::SeqCst)
                && let Some(session) = self.session()
            {
                session.stop_sync().await;
                // Foregrounded while stopping; `on_become_active` already restarted once.
                if !self.suspended.load(Ordering::SeqCst) {
                    session.start_sync();
                }
            }
            self.platform.end_background_task(id);
        });
    }

    fn on_periodic_refresh(self: Arc<Self>, task: RefreshTask) {
        info!("periodic refresh started");
        self.schedule_refresh();

        let (expiration, completion) = task.into_parts();
        let run = Arc::new(RefreshRun {
            claimed: AtomicBool::new(false),
            completion: Mutex::new(Some(completion)),
            done: CancellationToken::new(),
        });

        let Some(session) = self.session() else {
            debug!("no live session, finishing refresh immediately");
            run.claim_and_complete();
            return;
        };

        let mut notices = session.subscribe();
        session.start_sync();
        let weak_session = Arc::downgrade(&session);
        drop(session);

        {
            let inner = Arc::clone(&self);
            let run = Arc::clone(&run);
            let weak_session = weak_session.clone();
            let expiration = expiration.clone();
            self.runtime.spawn(async move {
                tokio::select! {
                    _ = run.done.cancelled() => {}
                    _ = expiration.cancelled() => {
                        info!("periodic refresh expired");
                        inner.finish_refresh(&run, &weak_session).await;
                    }
                }
            });
        }

        let budget = self.refresh_time_budget;
        let max_updates = self.refresh_max_sync_updates;
        let inner = Arc::clone(&self);
        self.runtime.spawn(async move {
            let mut updates = 0_usize;
            let deadline = tokio::time::sleep(budget);
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    _ = run.done.cancelled() => return,
                    notice = notices.recv() => match notice {
                        Ok(SessionNotice::SyncUpdate) => {
                            updates += 1;
                            if updates >= max_updates {
                                break;
                            }
                        }
                        Ok(SessionNotice::AuthError { .. }) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            updates = updates.saturating_add(skipped as usize);
                            if updates >= max_updates {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }

            info!(updates, "periodic refresh collected");
            inner.finish_refresh(&run, &weak_session).await;
        });
    }

    async fn finish_refresh(&self, run: &RefreshRun, session: &Weak<dyn LiveSession>) {
        if run.claimed.swap(true, Ordering::AcqRel) {
            debug!("periodic refresh already finished");
            return;
        }
        run.done.cancel();

        if self.platform.app_state() != AppState::Active
            && let Some(session) = session.upgrade()
        {
            session.stop_sync().await;
        }
        run.complete();
        info!("periodic refresh finished");
    }
}

struct RefreshRun {
    claimed: AtomicBool,
    completion: Mutex<Option<RefreshCompletion>>,
    done: CancellationToken,
}

impl RefreshRun {
    fn claim_and_complete(&self) {
        if !self.claimed.swap(true, Ordering::AcqRel) {
            self.done.cancel();
            self.complete();
        }
    }

    fn complete(&self) {
        let completion = self
            .completion
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(complete) = completion {
            complete(true);
        }
    }
}
