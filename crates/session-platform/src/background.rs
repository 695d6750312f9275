//! A [`BackgroundTaskPlatform`] backed by tokio timers.
//!
//! Desktop hosts have no OS-granted background allowances, so this platform
//! emulates them: a granted task expires after a grace period and registered
//! refresh tasks fire once their earliest begin time has passed while the app
//! is not active.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use session_core::{
    AppState, BackgroundTaskId, BackgroundTaskPlatform, ExpirationHandler, PlatformError,
    RefreshLauncher, RefreshTask,
};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InProcessPlatformSettings {
    /// Lifetime of a background task before its expiration handler runs.
    pub grace_period: Duration,
    /// Time a refresh run gets before its expiration token is cancelled.
    pub refresh_allowance: Duration,
}

impl Default for InProcessPlatformSettings {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(30),
            refresh_allowance: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct InProcessBackgroundPlatform {
    inner: Arc<Inner>,
}

struct Inner {
    runtime: Handle,
    settings: InProcessPlatformSettings,
    app_state: Mutex<AppState>,
    next_id: AtomicU64,
    shut_down: AtomicBool,
    tasks: Mutex<HashMap<BackgroundTaskId, CancellationToken>>,
    launchers: Mutex<HashMap<String, RefreshLauncher>>,
    scheduled: Mutex<HashMap<String, (u64, CancellationToken)>>,
}

impl InProcessBackgroundPlatform {
    pub fn new(runtime: Handle, settings: InProcessPlatformSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                runtime,
                settings,
                app_state: Mutex::new(AppState::Active),
                next_id: AtomicU64::new(1),
                shut_down: AtomicBool::new(false),
                tasks: Mutex::new(HashMap::new()),
                launchers: Mutex::new(HashMap::new()),
                scheduled: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Record a host lifecycle change.
    pub fn set_app_state(&self, state: AppState) {
        let previous = std::mem::replace(
            &mut *self
                .inner
                .app_state
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            state,
        );
        if previous != state {
            debug!(from = ?previous, to = ?state, "app state changed");
        }
    }

    pub fn outstanding_tasks(&self) -> usize {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Cancel every timer and refuse further background work.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        for (_, token) in self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
        {
            token.cancel();
        }
        for (_, (_, token)) in self
            .inner
            .scheduled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
        {
            token.cancel();
        }
        info!("background platform shut down");
    }
}

impl Inner {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn app_state(&self) -> AppState {
        *self.app_state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn launcher(&self, task_id: &str) -> Option<RefreshLauncher> {
        self.launchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .cloned()
    }

    fn clear_schedule(&self, task_id: &str, generation: u64) {
        let mut scheduled = self.scheduled.lock().unwrap_or_else(PoisonError::into_inner);
        if scheduled
            .get(task_id)
            .is_some_and(|(current, _)| *current == generation)
        {
            scheduled.remove(task_id);
        }
    }

    fn launch_refresh(&self, task_id: &str, launcher: RefreshLauncher) {
        let expiration = CancellationToken::new();
        let finished = CancellationToken::new();

        let allowance = self.settings.refresh_allowance;
        let timer_expiration = expiration.clone();
        let timer_finished = finished.clone();
        self.runtime.spawn(async move {
            tokio::select! {
                _ = timer_finished.cancelled() => {}
                _ = tokio::time::sleep(allowance) => {
                    warn!("refresh allowance exhausted");
                    timer_expiration.cancel();
                }
            }
        });

        let name = task_id.to_owned();
        let task = RefreshTask::new(expiration, move |success| {
            finished.cancel();
            info!(task_id = %name, success, "refresh run completed");
        });
        launcher(task);
    }
}

impl BackgroundTaskPlatform for InProcessBackgroundPlatform {
    fn app_state(&self) -> AppState {
        self.inner.app_state()
    }

    fn begin_background_task(
        &self,
        name: &str,
        on_expire: ExpirationHandler,
    ) -> Option<BackgroundTaskId> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            warn!(name, "refusing background task after shutdown");
            return None;
        }

        let id = BackgroundTaskId(self.inner.next_id());
        let token = CancellationToken::new();
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, token.clone());

        let grace = self.inner.settings.grace_period;
        let name = name.to_owned();
        self.inner.runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(grace) => {
                    info!(task = id.0, name = %name, "background task expiring");
                    on_expire();
                }
            }
        });
        debug!(task = id.0, grace_secs = grace.as_secs(), "granted background task");
        Some(id)
    }

    fn end_background_task(&self, id: BackgroundTaskId) {
        let token = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        match token {
            Some(token) => {
                token.cancel();
                debug!(task = id.0, "background task ended");
            }
            None => debug!(task = id.0, "ignoring unknown background task"),
        }
    }

    fn register_refresh_task(
        &self,
        task_id: &str,
        launcher: RefreshLauncher,
    ) -> Result<(), PlatformError> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(PlatformError::Rejected("platform is shut down".to_owned()));
        }
        self.inner
            .launchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id.to_owned(), launcher);
        Ok(())
    }

    fn schedule_refresh_task(
        &self,
        task_id: &str,
        earliest_begin: Duration,
    ) -> Result<(), PlatformError> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(PlatformError::Rejected("platform is shut down".to_owned()));
        }
        let Some(launcher) = self.inner.launcher(task_id) else {
            return Err(PlatformError::RefreshTaskNotRegistered(task_id.to_owned()));
        };

        let generation = self.inner.next_id();
        let token = CancellationToken::new();
        if let Some((_, previous)) = self
            .inner
            .scheduled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id.to_owned(), (generation, token.clone()))
        {
            previous.cancel();
        }

        let inner = Arc::clone(&self.inner);
        let task_id = task_id.to_owned();
        self.inner.runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(earliest_begin) => {}
            }
            inner.clear_schedule(&task_id, generation);

            if inner.app_state() == AppState::Active {
                debug!(task_id = %task_id, "app is active, skipping refresh run");
                return;
            }
            info!(task_id = %task_id, "launching refresh run");
            inner.launch_refresh(&task_id, launcher);
        });
        Ok(())
    }
}
