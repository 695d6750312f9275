use std::{
    fs,
    io::ErrorKind,
    path::PathBuf,
    sync::{Mutex, PoisonError},
};

use serde::{Deserialize, Serialize};
use session_core::{AppVersion, SessionSettings};
use tracing::warn;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoredSettings {
    last_version_launched: Option<String>,
    #[serde(default)]
    session: serde_json::Map<String, serde_json::Value>,
}

/// Settings persisted as one JSON file. Write failures are logged.
pub struct JsonFileSettings {
    path: PathBuf,
    state: Mutex<StoredSettings>,
}

impl JsonFileSettings {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(path = %path.display(), error = %err, "ignoring unreadable settings");
                StoredSettings::default()
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => StoredSettings::default(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read settings");
                StoredSettings::default()
            }
        };
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut StoredSettings)) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut state);
        let result = serde_json::to_string_pretty(&*state)
            .map_err(|err| err.to_string())
            .and_then(|raw| {
                if let Some(parent) = self.path.parent() {
                    fs::create_dir_all(parent).map_err(|err| err.to_string())?;
                }
                fs::write(&self.path, raw).map_err(|err| err.to_string())
            });
        if let Err(err) = result {
            warn!(path = %self.path.display(), error = %err, "failed to persist settings");
        }
    }
}

impl SessionSettings for JsonFileSettings {
    fn last_version_launched(&self) -> Option<AppVersion> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let raw = state.last_version_launched.as_deref()?;
        match raw.parse::<AppVersion>() {
            Ok(version) => Some(version),
            Err(err) => {
                warn!(value = raw, error = %err, "ignoring malformed last launched version");
                None
            }
        }
    }

    fn set_last_version_launched(&self, version: AppVersion) {
        self.update(|state| state.last_version_launched = Some(version.to_string()));
    }

    fn reset_session_scoped(&self) {
        self.update(|state| state.session.clear());
    }

    fn reset_all(&self) {
        self.update(|state| *state = StoredSettings::default());
    }
}
