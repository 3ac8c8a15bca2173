//! macOS keychain-backed secret storage.

use async_trait::async_trait;
use keyring::Entry;

use super::{Secret, SecretStore, StoreError};

/// Keychain-backed secret store.
///
/// Each key becomes a generic password item whose service is the configured
/// service name and whose account is the key. The keychain has no atomic
/// replace, so writers that care about stale items delete before setting.
pub struct KeyringStore {
    service_name: String,
}

impl KeyringStore {
    /// Try to create a new keyring store.
    ///
    /// Returns an error if the keyring backend rejects the service name.
    pub fn try_new(service_name: &str) -> Result<Self, StoreError> {
        match Entry::new(service_name, "availability_check") {
            Ok(_) => Ok(Self {
                service_name: service_name.to_string(),
            }),
            Err(e) => Err(StoreError::Unavailable {
                message: format!("keyring backend not available: {}", e),
            }),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StoreError> {
        Entry::new(&self.service_name, key).map_err(|e| StoreError::BackendError {
            message: format!("failed to create keyring entry: {}", e),
        })
    }
}

impl std::fmt::Debug for KeyringStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringStore")
            .field("service_name", &self.service_name)
            .finish()
    }
}

#[async_trait]
impl SecretStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        match self.entry(key)?.get_password() {
            Ok(password) => Ok(Some(Secret::new(password))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(keyring::Error::NoStorageAccess(e)) => {
                tracing::debug!("keychain access denied: {}", e);
                Err(StoreError::AccessDenied {
                    key: key.to_string(),
                })
            }
            Err(e) => Err(StoreError::BackendError {
                message: format!("keyring error: {}", e),
            }),
        }
    }

    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
        self.entry(key)?
            .set_password(secret.expose())
            .map_err(|e| StoreError::BackendError {
                message: format!("failed to set keyring password: {}", e),
            })
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::BackendError {
                message: format!("failed to delete keyring entry: {}", e),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests avoid touching real keychain items; they only exercise
    // construction and lookups of keys that never exist.

    #[test]
    fn test_keyring_store_creation() {
        match KeyringStore::try_new("sessionforge-test") {
            Ok(store) => assert_eq!(store.service_name, "sessionforge-test"),
            Err(StoreError::Unavailable { .. }) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    #[tokio::test]
    async fn test_keyring_store_get_nonexistent() {
        let store = match KeyringStore::try_new("sessionforge-test-nonexist") {
            Ok(s) => s,
            Err(_) => return,
        };

        // Headless hosts may not have a keychain daemon at all.
        if let Ok(result) = store.get("nonexistent/key").await {
            assert!(result.is_none());
        }
    }
}
