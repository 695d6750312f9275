use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use matrix_sdk::{Client, authentication::matrix::MatrixSession};
use session_core::{LiveSession, SessionError, SessionErrorCategory, SessionStore};
use session_platform::{
    RestorationToken, RestorationTokenStore, ScopedSecretStore, SecretStore,
};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::{MatrixLiveSession, map_client_build_error, map_io_error, map_matrix_error};

/// File name fragments of the caches purged by `clear_caches`. The crypto
/// store is kept so the device stays verified.
const CACHE_FILE_MARKERS: [&str; 2] = ["matrix-sdk-state", "matrix-sdk-event-cache"];

#[derive(Debug, Clone)]
pub struct MatrixStoreConfig {
    /// Parent of the per-account store directories.
    pub data_dir: PathBuf,
    /// Secret store service name for restoration tokens.
    pub keyring_service: String,
    pub device_display_name: String,
}

impl MatrixStoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            keyring_service: "io.session.lifecycle".to_owned(),
            device_display_name: "Session Lifecycle".to_owned(),
        }
    }
}

/// Restoration tokens in a [`SecretStore`], Matrix state in sqlite stores
/// under one directory per account.
pub struct MatrixSessionStore<S: SecretStore> {
    config: MatrixStoreConfig,
    tokens: RestorationTokenStore<S>,
}

impl<S: SecretStore> MatrixSessionStore<S> {
    pub fn new(config: MatrixStoreConfig, secrets: S) -> Self {
        let tokens = RestorationTokenStore::new(ScopedSecretStore::new(
            secrets,
            config.keyring_service.clone(),
        ));
        Self { config, tokens }
    }

    async fn build_client(
        homeserver: &str,
        session_dir: &Path,
        passphrase: Option<&str>,
    ) -> Result<Client, SessionError> {
        Client::builder()
            .homeserver_url(homeserver)
            .sqlite_store(session_dir, passphrase)
            .build()
            .await
            .map_err(map_client_build_error)
    }

    /// Password login that persists a restoration token for the new session.
    pub async fn login_password(
        &self,
        homeserver: &str,
        user: &str,
        password: &str,
    ) -> Result<Arc<dyn LiveSession>, SessionError> {
        let homeserver = Url::parse(homeserver).map_err(|err| {
            SessionError::new(
                SessionErrorCategory::Config,
                "invalid_homeserver",
                format!("invalid homeserver '{homeserver}': {err}"),
            )
        })?;

        let session_dir = self.config.data_dir.join(Uuid::new_v4().to_string());
        let passphrase = format!("session-store-{}", Uuid::new_v4());
        let client =
            Self::build_client(homeserver.as_str(), &session_dir, Some(&passphrase)).await?;

        client
            .matrix_auth()
            .login_username(user, password)
            .initial_device_display_name(&self.config.device_display_name)
            .send()
            .await
            .map_err(map_matrix_error)?;

        let session = client.matrix_auth().session().ok_or_else(|| {
            SessionError::new(
                SessionErrorCategory::Auth,
                "session_unavailable",
                "matrix session is unavailable after login",
            )
        })?;
        let encoded = serde_json::to_value(&session).map_err(|err| {
            SessionError::new(
                SessionErrorCategory::Serialization,
                "session_serialize_error",
                err.to_string(),
            )
        })?;

        let token = RestorationToken {
            user_id: session.meta.user_id.to_string(),
            homeserver: homeserver.to_string(),
            session_dir,
            passphrase: Some(passphrase),
            session: encoded,
        };
        self.tokens.save(&token)?;
        info!(user_id = %token.user_id, "logged in and stored restoration token");

        Ok(Arc::new(MatrixLiveSession::new(client)?))
    }

    async fn restore_from_token(
        &self,
        token: &RestorationToken,
    ) -> Result<Arc<dyn LiveSession>, SessionError> {
        let session: MatrixSession =
            serde_json::from_value(token.session.clone()).map_err(|err| {
                SessionError::new(
                    SessionErrorCategory::Serialization,
                    "session_deserialize_error",
                    err.to_string(),
                )
            })?;

        let client = Self::build_client(
            &token.homeserver,
            &token.session_dir,
            token.passphrase.as_deref(),
        )
        .await?;
        client
            .restore_session(session)
            .await
            .map_err(map_matrix_error)?;

        Ok(Arc::new(MatrixLiveSession::new(client)?))
    }

    async fn remove_session_dir(dir: &Path) -> Result<(), SessionError> {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(map_io_error("remove session directory", err)),
        }
    }

    async fn forget_token(&self, token: &RestorationToken) -> Result<(), SessionError> {
        Self::remove_session_dir(&token.session_dir).await?;
        self.tokens.remove(&token.user_id)?;
        Ok(())
    }
}

#[async_trait]
impl<S: SecretStore + 'static> SessionStore for MatrixSessionStore<S> {
    fn has_stored_sessions(&self) -> bool {
        self.tokens.has_tokens()
    }

    async fn restore_session(&self) -> Result<Arc<dyn LiveSession>, SessionError> {
        let Some(token) = self.tokens.most_recent()? else {
            return Err(SessionError::missing_credentials());
        };

        match self.restore_from_token(&token).await {
            Ok(session) => {
                info!(user_id = %token.user_id, "restored matrix session");
                Ok(session)
            }
            Err(err) => {
                warn!(user_id = %token.user_id, code = %err.code, "restore failed, forgetting session");
                if let Err(forget_err) = self.forget_token(&token).await {
                    warn!(error = %forget_err, "failed to forget unrestorable session");
                }
                Err(err)
            }
        }
    }

    async fn forget_session(&self, user_id: &str) -> Result<(), SessionError> {
        let token = self.tokens.load(user_id)?;
        self.forget_token(&token).await?;
        info!(user_id, "forgot stored session");
        Ok(())
    }

    async fn clear_caches(&self, user_id: &str) -> Result<(), SessionError> {
        let token = self.tokens.load(user_id)?;
        let mut entries = match tokio::fs::read_dir(&token.session_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(map_io_error("list session directory", err)),
        };

        let mut removed = 0_usize;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| map_io_error("list session directory", err))?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !CACHE_FILE_MARKERS.iter().any(|marker| name.contains(marker)) {
                continue;
            }
            tokio::fs::remove_file(entry.path())
                .await
                .map_err(|err| map_io_error("remove cache file", err))?;
            debug!(file = %name, "removed cache file");
            removed += 1;
        }
        info!(user_id, removed, "cleared session caches");
        Ok(())
    }

    async fn reset_all(&self) -> Result<(), SessionError> {
        for token in self.tokens.clear()? {
            if let Err(err) = Self::remove_session_dir(&token.session_dir).await {
                warn!(user_id = %token.user_id, error = %err, "failed to remove session directory");
            }
        }
        Ok(())
    }
}
