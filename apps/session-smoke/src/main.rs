mod collaborators;
mod settings;

use std::{env, path::PathBuf, process::ExitCode, sync::Arc};

use collaborators::{LoggingIndicators, LoggingNotifications, LoggingUi, NoAppLock, Screen};
use session_core::{
    Collaborators, LifecycleEvent, OrchestratorConfig, OrchestratorHandle, SessionStore, logging,
    spawn_orchestrator,
};
use session_matrix::{MatrixSessionStore, MatrixStoreConfig};
use session_platform::{InProcessBackgroundPlatform, InProcessPlatformSettings, SecretStore};
use settings::JsonFileSettings;
use tokio::{runtime::Handle, sync::broadcast::error::RecvError};
use tracing::{error, info, warn};

struct Credentials {
    homeserver: String,
    user: String,
    password: String,
}

impl Credentials {
    fn from_env() -> Option<Self> {
        Some(Self {
            homeserver: env::var("SESSION_HOMESERVER").ok()?,
            user: env::var("SESSION_USER").ok()?,
            password: env::var("SESSION_PASSWORD").ok()?,
        })
    }
}

#[cfg(feature = "os-keyring")]
fn secret_store() -> session_platform::OsKeyringSecretStore {
    session_platform::OsKeyringSecretStore
}

#[cfg(not(feature = "os-keyring"))]
fn secret_store() -> session_platform::InMemorySecretStore {
    session_platform::InMemorySecretStore::default()
}

fn spawn_event_logger(handle: &OrchestratorHandle) {
    let mut events = handle.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(LifecycleEvent::StateChanged { from, event, to }) => {
                    info!(from = ?from, event = ?event, to = ?to, "lifecycle transition");
                }
                Ok(LifecycleEvent::TransitionRejected { state, event }) => {
                    error!(state = ?state, event = ?event, "lifecycle transition rejected");
                }
                Ok(LifecycleEvent::RouteDelivered { route, deferred }) => {
                    info!(route = ?route, deferred, "route delivered");
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn log_in<S: SecretStore + 'static>(
    store: &MatrixSessionStore<S>,
    handle: &OrchestratorHandle,
    credentials: &Credentials,
) {
    match store
        .login_password(&credentials.homeserver, &credentials.user, &credentials.password)
        .await
    {
        Ok(session) => {
            if let Err(err) = handle.session_created(session).await {
                error!(error = %err, "orchestrator is gone");
            }
        }
        Err(err) => error!(code = %err.code, error = %err.message, "login failed"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let config = match OrchestratorConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    let data_dir = env::var("SESSION_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.session-smoke-store"));
    info!(data_dir = %data_dir.display(), version = %config.app_version, "starting session-smoke");

    let store = Arc::new(MatrixSessionStore::new(
        MatrixStoreConfig::new(data_dir.join("accounts")),
        secret_store(),
    ));
    let platform = Arc::new(InProcessBackgroundPlatform::new(
        Handle::current(),
        InProcessPlatformSettings::default(),
    ));
    let (ui, mut screens) = LoggingUi::new();
    let mandatory_app_lock = env::var("SESSION_APP_LOCK_MANDATORY").is_ok_and(|v| v == "1");

    let has_sessions = store.has_stored_sessions();
    let handle = spawn_orchestrator(
        config,
        Collaborators {
            store: store.clone(),
            ui: Arc::new(ui),
            indicators: Arc::new(LoggingIndicators),
            notifications: Arc::new(LoggingNotifications),
            settings: Arc::new(JsonFileSettings::load(data_dir.join("settings.json"))),
            app_lock: Arc::new(NoAppLock::new(mandatory_app_lock)),
            platform: platform.clone(),
        },
    );
    spawn_event_logger(&handle);

    if let Err(err) = handle.start().await {
        error!(error = %err, "orchestrator did not start");
        return ExitCode::FAILURE;
    }
    info!(has_sessions, "orchestrator started; press ctrl-c to exit");

    let mut credentials = Credentials::from_env();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(error = %err, "failed to listen for ctrl-c");
                }
                break;
            }
            changed = screens.changed() => {
                if changed.is_err() {
                    break;
                }
                let screen = *screens.borrow_and_update();
                match screen {
                    Screen::Authentication | Screen::SoftLogout => match credentials.take() {
                        Some(credentials) => log_in(&*store, &handle, &credentials).await,
                        None => info!("set SESSION_HOMESERVER, SESSION_USER and SESSION_PASSWORD to log in"),
                    },
                    Screen::AppLockSetup => {
                        info!("no app lock available, completing setup");
                        if let Err(err) = handle.app_lock_setup_completed().await {
                            error!(error = %err, "orchestrator is gone");
                            break;
                        }
                    }
                    Screen::Splash | Screen::Placeholder | Screen::Session => {}
                }
            }
        }
    }

    if let Err(err) = handle.application_will_terminate().await {
        warn!(error = %err, "orchestrator already stopped");
    }
    platform.shutdown();
    info!(final_state = ?handle.state(), "session-smoke exiting");
    ExitCode::SUCCESS
}
