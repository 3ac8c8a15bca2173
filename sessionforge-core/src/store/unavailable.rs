//! Placeholder store for platforms without a secure secret store.

use async_trait::async_trait;

use super::{Secret, SecretStore, StoreError};

/// Secure store that never holds anything.
///
/// Reads report "no entry", deletes succeed, and writes fail with
/// [`StoreError::Unavailable`].
#[derive(Debug, Clone)]
pub struct UnavailableStore {
    reason: String,
}

impl UnavailableStore {
    /// Create an unavailable store, remembering why it was selected.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl SecretStore for UnavailableStore {
    fn is_available(&self) -> bool {
        false
    }

    async fn get(&self, _key: &str) -> Result<Option<Secret>, StoreError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _secret: &Secret) -> Result<(), StoreError> {
        Err(StoreError::Unavailable {
            message: self.reason.clone(),
        })
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }
}
