//! Persisted credentials needed to resume a session without logging in.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use session_core::{SessionError, SessionErrorCategory};
use thiserror::Error;
use tracing::{debug, warn};

use crate::secret_store::{ScopedSecretStore, SecretStore, SecretStoreError};

const INDEX_ACCOUNT: &str = "restoration-index";
const TOKEN_ACCOUNT_PREFIX: &str = "restoration-token";

/// Everything required to rebuild a client for `user_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestorationToken {
    pub user_id: String,
    pub homeserver: String,
    /// Directory holding the account's local stores.
    pub session_dir: PathBuf,
    /// Store encryption passphrase, absent for unencrypted stores.
    pub passphrase: Option<String>,
    /// Backend-specific session payload.
    pub session: serde_json::Value,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RestorationStoreError {
    #[error("restoration token storage failed: {0}")]
    Secret(#[from] SecretStoreError),
    #[error("restoration token for '{0}' is missing")]
    Missing(String),
}

impl From<RestorationStoreError> for SessionError {
    fn from(err: RestorationStoreError) -> Self {
        match err {
            RestorationStoreError::Secret(inner) => inner.into(),
            RestorationStoreError::Missing(user_id) => SessionError::new(
                SessionErrorCategory::Auth,
                "missing_credentials",
                format!("no restoration token stored for {user_id}"),
            ),
        }
    }
}

/// Keeps one token per account plus an index ordered by last use.
#[derive(Clone)]
pub struct RestorationTokenStore<S: SecretStore> {
    secrets: ScopedSecretStore<S>,
}

impl<S: SecretStore> RestorationTokenStore<S> {
    pub fn new(secrets: ScopedSecretStore<S>) -> Self {
        Self { secrets }
    }

    fn token_account(user_id: &str) -> String {
        format!("{TOKEN_ACCOUNT_PREFIX}:{user_id}")
    }

    /// Known accounts, least recently saved first.
    pub fn user_ids(&self) -> Result<Vec<String>, RestorationStoreError> {
        Ok(self.secrets.get_json(INDEX_ACCOUNT)?.unwrap_or_default())
    }

    /// Whether any account is indexed. Storage failures count as none.
    pub fn has_tokens(&self) -> bool {
        match self.user_ids() {
            Ok(ids) => !ids.is_empty(),
            Err(err) => {
                warn!(error = %err, "failed to read restoration index");
                false
            }
        }
    }

    pub fn load(&self, user_id: &str) -> Result<RestorationToken, RestorationStoreError> {
        self.secrets
            .get_json(&Self::token_account(user_id))?
            .ok_or_else(|| RestorationStoreError::Missing(user_id.to_owned()))
    }

    /// The most recently saved token, if any.
    pub fn most_recent(&self) -> Result<Option<RestorationToken>, RestorationStoreError> {
        match self.user_ids()?.last() {
            Some(user_id) => self.load(user_id).map(Some),
            None => Ok(None),
        }
    }

    /// Store `token` and mark its account as most recent.
    pub fn save(&self, token: &RestorationToken) -> Result<(), RestorationStoreError> {
        self.secrets
            .set_json(&Self::token_account(&token.user_id), token)?;

        let mut ids = self.user_ids()?;
        ids.retain(|id| id != &token.user_id);
        ids.push(token.user_id.clone());
        self.secrets.set_json(INDEX_ACCOUNT, &ids)?;
        debug!(user_id = %token.user_id, accounts = ids.len(), "saved restoration token");
        Ok(())
    }

    /// Forget one account. Missing accounts are not an error.
    pub fn remove(&self, user_id: &str) -> Result<(), RestorationStoreError> {
        self.secrets.delete(&Self::token_account(user_id))?;

        let mut ids = self.user_ids()?;
        let before = ids.len();
        ids.retain(|id| id != user_id);
        if ids.len() != before {
            self.secrets.set_json(INDEX_ACCOUNT, &ids)?;
        }
        Ok(())
    }

    /// Forget every account, returning the removed tokens.
    pub fn clear(&self) -> Result<Vec<RestorationToken>, RestorationStoreError> {
        let mut removed = Vec::new();
        for user_id in self.user_ids()? {
            match self.load(&user_id) {
                Ok(token) => removed.push(token),
                Err(RestorationStoreError::Missing(_)) => {}
                Err(err) => return Err(err),
            }
            self.secrets.delete(&Self::token_account(&user_id))?;
        }
        self.secrets.delete(INDEX_ACCOUNT)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::secret_store::InMemorySecretStore;

    fn store() -> RestorationTokenStore<InMemorySecretStore> {
        RestorationTokenStore::new(ScopedSecretStore::new(
            InMemorySecretStore::default(),
            "session-lifecycle",
        ))
    }

    fn token(user_id: &str) -> RestorationToken {
        RestorationToken {
            user_id: user_id.to_owned(),
            homeserver: "https://matrix.example.org".to_owned(),
            session_dir: PathBuf::from("/tmp/sessions").join(user_id),
            passphrase: Some("hunter2".to_owned()),
            session: json!({ "access_token": "abc", "device_id": "DEVICE" }),
        }
    }

    #[test]
    fn empty_store_has_no_tokens() {
        let store = store();
        assert!(!store.has_tokens());
        assert_eq!(store.most_recent().expect("read"), None);
    }

    #[test]
    fn most_recent_follows_last_save() {
        let store = store();
        store.save(&token("@alice:example.org")).expect("save alice");
        store.save(&token("@bob:example.org")).expect("save bob");
        store.save(&token("@alice:example.org")).expect("resave alice");

        assert_eq!(
            store.user_ids().expect("index"),
            vec!["@bob:example.org".to_owned(), "@alice:example.org".to_owned()]
        );
        let recent = store.most_recent().expect("read").expect("token present");
        assert_eq!(recent.user_id, "@alice:example.org");
        assert_eq!(recent.session["device_id"], "DEVICE");
    }

    #[test]
    fn remove_drops_account_from_index() {
        let store = store();
        store.save(&token("@alice:example.org")).expect("save");
        store.remove("@alice:example.org").expect("remove");
        store.remove("@alice:example.org").expect("second remove is fine");

        assert!(!store.has_tokens());
        assert_eq!(
            store.load("@alice:example.org"),
            Err(RestorationStoreError::Missing("@alice:example.org".to_owned()))
        );
    }

    #[test]
    fn clear_returns_removed_tokens() {
        let store = store();
        store.save(&token("@alice:example.org")).expect("save alice");
        store.save(&token("@bob:example.org")).expect("save bob");

        let removed = store.clear().expect("clear");
        assert_eq!(removed.len(), 2);
        assert!(!store.has_tokens());
    }

    #[test]
    fn missing_token_maps_to_missing_credentials() {
        let err = SessionError::from(RestorationStoreError::Missing("@a:b".to_owned()));
        assert_eq!(err.code, "missing_credentials");
        assert_eq!(err.category, SessionErrorCategory::Auth);
    }
}
