//! Host-side collaborators for the session lifecycle: secret storage,
//! persisted restoration tokens and an in-process background task platform.

pub mod background;
pub mod restoration;
pub mod secret_store;

pub use background::{InProcessBackgroundPlatform, InProcessPlatformSettings};
pub use restoration::{RestorationStoreError, RestorationToken, RestorationTokenStore};
#[cfg(feature = "os-keyring")]
pub use secret_store::OsKeyringSecretStore;
pub use secret_store::{InMemorySecretStore, ScopedSecretStore, SecretStore, SecretStoreError};
