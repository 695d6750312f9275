use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use serde::{Serialize, de::DeserializeOwned};
use session_core::{SessionError, SessionErrorCategory};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecretStoreError {
    #[error("secret not found")]
    NotFound,
    #[error("secret store unavailable: {0}")]
    Unavailable(String),
    #[error("secret store backend failure: {0}")]
    Backend(String),
    #[error("secret is not valid JSON: {0}")]
    Malformed(String),
}

impl From<SecretStoreError> for SessionError {
    fn from(err: SecretStoreError) -> Self {
        let (category, code) = match &err {
            SecretStoreError::NotFound => (SessionErrorCategory::Auth, "secret_not_found"),
            SecretStoreError::Unavailable(_) => {
                (SessionErrorCategory::Storage, "secret_store_unavailable")
            }
            SecretStoreError::Backend(_) => (SessionErrorCategory::Storage, "secret_store_failure"),
            SecretStoreError::Malformed(_) => {
                (SessionErrorCategory::Serialization, "secret_malformed")
            }
        };
        SessionError::new(category, code, err.to_string())
    }
}

/// Credential storage keyed by `(service, account)`.
pub trait SecretStore: Send + Sync {
    fn set_secret(&self, service: &str, account: &str, secret: &str)
    -> Result<(), SecretStoreError>;

    fn get_secret(&self, service: &str, account: &str) -> Result<String, SecretStoreError>;

    fn delete_secret(&self, service: &str, account: &str) -> Result<(), SecretStoreError>;
}

impl<S: SecretStore + ?Sized> SecretStore for Arc<S> {
    fn set_secret(
        &self,
        service: &str,
        account: &str,
        secret: &str,
    ) -> Result<(), SecretStoreError> {
        (**self).set_secret(service, account, secret)
    }

    fn get_secret(&self, service: &str, account: &str) -> Result<String, SecretStoreError> {
        (**self).get_secret(service, account)
    }

    fn delete_secret(&self, service: &str, account: &str) -> Result<(), SecretStoreError> {
        (**self).delete_secret(service, account)
    }
}

/// Process-local store used by tests and the smoke binary without a keyring.
#[derive(Clone, Default)]
pub struct InMemorySecretStore {
    data: Arc<RwLock<HashMap<(String, String), String>>>,
}

impl InMemorySecretStore {
    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SecretStore for InMemorySecretStore {
    fn set_secret(
        &self,
        service: &str,
        account: &str,
        secret: &str,
    ) -> Result<(), SecretStoreError> {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((service.to_owned(), account.to_owned()), secret.to_owned());
        Ok(())
    }

    fn get_secret(&self, service: &str, account: &str) -> Result<String, SecretStoreError> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(service.to_owned(), account.to_owned()))
            .cloned()
            .ok_or(SecretStoreError::NotFound)
    }

    fn delete_secret(&self, service: &str, account: &str) -> Result<(), SecretStoreError> {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(service.to_owned(), account.to_owned()))
            .map(|_| ())
            .ok_or(SecretStoreError::NotFound)
    }
}

/// System keychain via `keyring`.
#[cfg(feature = "os-keyring")]
#[derive(Default, Clone, Copy)]
pub struct OsKeyringSecretStore;

#[cfg(feature = "os-keyring")]
impl OsKeyringSecretStore {
    fn entry(service: &str, account: &str) -> Result<keyring::Entry, SecretStoreError> {
        keyring::Entry::new(service, account).map_err(map_keyring_error)
    }
}

#[cfg(feature = "os-keyring")]
fn map_keyring_error(err: keyring::Error) -> SecretStoreError {
    match err {
        keyring::Error::NoEntry => SecretStoreError::NotFound,
        keyring::Error::NoStorageAccess(inner) => SecretStoreError::Unavailable(inner.to_string()),
        keyring::Error::PlatformFailure(inner) => SecretStoreError::Unavailable(inner.to_string()),
        other => SecretStoreError::Backend(other.to_string()),
    }
}

#[cfg(feature = "os-keyring")]
impl SecretStore for OsKeyringSecretStore {
    fn set_secret(
        &self,
        service: &str,
        account: &str,
        secret: &str,
    ) -> Result<(), SecretStoreError> {
        Self::entry(service, account)?
            .set_password(secret)
            .map_err(map_keyring_error)
    }

    fn get_secret(&self, service: &str, account: &str) -> Result<String, SecretStoreError> {
        Self::entry(service, account)?
            .get_password()
            .map_err(map_keyring_error)
    }

    fn delete_secret(&self, service: &str, account: &str) -> Result<(), SecretStoreError> {
        Self::entry(service, account)?
            .delete_credential()
            .map_err(map_keyring_error)
    }
}

/// A [`SecretStore`] pinned to one service name, with JSON helpers.
#[derive(Clone)]
pub struct ScopedSecretStore<S: SecretStore> {
    inner: S,
    service: String,
}

impl<S: SecretStore> ScopedSecretStore<S> {
    pub fn new(inner: S, service: impl Into<String>) -> Self {
        Self {
            inner,
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn set(&self, account: &str, secret: &str) -> Result<(), SecretStoreError> {
        self.inner.set_secret(&self.service, account, secret)
    }

    pub fn get(&self, account: &str) -> Result<String, SecretStoreError> {
        self.inner.get_secret(&self.service, account)
    }

    /// `Ok(None)` when the account has no secret.
    pub fn get_optional(&self, account: &str) -> Result<Option<String>, SecretStoreError> {
        match self.get(account) {
            Ok(secret) => Ok(Some(secret)),
            Err(SecretStoreError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Delete, treating a missing secret as success.
    pub fn delete(&self, account: &str) -> Result<(), SecretStoreError> {
        match self.inner.delete_secret(&self.service, account) {
            Ok(()) | Err(SecretStoreError::NotFound) => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub fn set_json<T: Serialize>(&self, account: &str, value: &T) -> Result<(), SecretStoreError> {
        let raw = serde_json::to_string(value)
            .map_err(|err| SecretStoreError::Malformed(err.to_string()))?;
        self.set(account, &raw)
    }

    pub fn get_json<T: DeserializeOwned>(&self, account: &str) -> Result<Option<T>, SecretStoreError> {
        let Some(raw) = self.get_optional(account)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| SecretStoreError::Malformed(err.to_string()))
    }
}
