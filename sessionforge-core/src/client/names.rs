//! User identifier to display name resolution.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use super::{ApiClient, Params};
use crate::cache::BoundedCache;

/// Default number of cached names.
pub const DEFAULT_NAME_CACHE_CAPACITY: usize = 1_000;

/// Default lifetime of a cached name.
pub const DEFAULT_NAME_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Resolves opaque user identifiers to display names through `users.info`,
/// consulting a [`BoundedCache`] before every lookup.
///
/// When a lookup fails the identifier itself is returned and, unless
/// disabled with [`without_failure_caching`](Self::without_failure_caching),
/// cached as the name so known-failing lookups are not repeated within the TTL.
pub struct NameResolver {
    client: Arc<ApiClient>,
    cache: Mutex<BoundedCache<String, String>>,
    cache_failures: bool,
}

impl NameResolver {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self::with_cache(client, DEFAULT_NAME_CACHE_CAPACITY, DEFAULT_NAME_CACHE_TTL)
    }

    pub fn with_cache(client: Arc<ApiClient>, capacity: usize, ttl: Duration) -> Self {
        Self {
            client,
            cache: Mutex::new(BoundedCache::new(capacity, ttl)),
            cache_failures: true,
        }
    }

    pub fn without_failure_caching(mut self) -> Self {
        self.cache_failures = false;
        self
    }

    /// Number of cached names.
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }

    /// Display name for `user_id`, falling back to the identifier itself.
    pub async fn display_name(&self, user_id: &str) -> String {
        let key = user_id.to_string();
        if let Some(name) = self.cache.lock().get(&key).cloned() {
            return name;
        }

        let mut params = Params::new();
        params.insert("user".to_string(), key.clone());

        match self.client.call_default("users.info", &params).await {
            Ok(body) => {
                let name = extract_display_name(&body).unwrap_or_else(|| key.clone());
                self.cache.lock().set(key, name.clone());
                name
            }
            Err(e) => {
                tracing::debug!(user_id, "Name lookup failed: {}", e);
                if self.cache_failures {
                    self.cache.lock().set(key.clone(), key.clone());
                }
                key
            }
        }
    }
}

fn extract_display_name(body: &Value) -> Option<String> {
    let user = body.get("user")?;
    let profile = user.get("profile");

    [
        profile.and_then(|p| p.get("display_name")),
        profile.and_then(|p| p.get("real_name")),
        user.get("real_name"),
        user.get("name"),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .map(str::trim)
    .find(|name| !name.is_empty())
    .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prefers_display_name() {
        let body = json!({
            "ok": true,
            "user": {"name": "jdoe", "real_name": "Jane Doe", "profile": {"display_name": "jane"}}
        });
        assert_eq!(extract_display_name(&body).as_deref(), Some("jane"));
    }

    #[test]
    fn test_skips_empty_display_name() {
        let body = json!({
            "ok": true,
            "user": {"name": "jdoe", "real_name": "Jane Doe", "profile": {"display_name": ""}}
        });
        assert_eq!(extract_display_name(&body).as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_missing_user() {
        assert!(extract_display_name(&json!({"ok": true})).is_none());
    }
}
