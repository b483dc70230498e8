//! Secure Session Storage
//!
//! Persists the delegated provider's tokens and user profile through the
//! platform [`SecureStore`] (Keychain, Secret Service, Keystore...).
//!
//! ## Security Features
//!
//! - Tokens are never logged or exposed in error messages
//! - Corrupted entries are erased on read
//! - Audit logging records only presence flags and expiry
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::{OAuthTokens, TokenStore};
//! use serde_json::json;
//! use std::sync::Arc;
//! # use bridge_traits::storage::SecureStore;
//! # async fn example(secure_store: Arc<dyn SecureStore>) -> core_auth::Result<()> {
//! let store = TokenStore::new(secure_store, "delegated");
//!
//! let tokens = OAuthTokens::new("access_token_value".to_string(), 3600);
//! store.store_session(&tokens, &json!({"sub": "auth0|123"})).await?;
//!
//! if let Some(session) = store.retrieve_session().await? {
//!     println!("Restored session for {}", session.user["sub"]);
//! }
//!
//! store.delete_session().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::OAuthTokens;
use bridge_traits::storage::SecureStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

const KEY_PREFIX: &str = "oauth_tokens";

/// Tokens plus the user profile they were issued for.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub tokens: OAuthTokens,
    pub user: Value,
}

/// Secure storage for one provider's OAuth session.
///
/// Entries are keyed `oauth_tokens:<namespace>`, so several providers can
/// share a single secure store.
#[derive(Clone)]
pub struct TokenStore {
    secure_store: Arc<dyn SecureStore>,
    key: String,
}

/// JSON layout written to the secure store.
#[derive(Serialize, Deserialize)]
struct SessionRecord {
    access_token: String,
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: i64,
    #[serde(default)]
    user: Value,
}

impl TokenStore {
    pub fn new(secure_store: Arc<dyn SecureStore>, namespace: &str) -> Self {
        let key = format!("{}:{}", KEY_PREFIX, namespace);
        debug!(key = %key, "Initializing TokenStore");
        Self { secure_store, key }
    }

    /// Storage key used for this namespace.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Store tokens and user, overwriting any previous session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SecureStorageUnavailable`] if the secure store
    /// rejects the write.
    pub async fn store_session(&self, tokens: &OAuthTokens, user: &Value) -> Result<()> {
        let record = SessionRecord {
            access_token: tokens.access_token.clone(),
            id_token: tokens.id_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_at: tokens.expires_at.timestamp(),
            user: user.clone(),
        };

        let json = serde_json::to_vec(&record).map_err(|e| {
            warn!(key = %self.key, error = %e, "Failed to serialize session");
            AuthError::from(e)
        })?;

        self.secure_store
            .set_secret(&self.key, &json)
            .await
            .map_err(|e| {
                warn!(key = %self.key, error = %e, "Failed to store session in secure storage");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!(
            key = %self.key,
            has_refresh_token = record.refresh_token.is_some(),
            has_id_token = record.id_token.is_some(),
            "Session stored securely"
        );

        Ok(())
    }

    /// Retrieve the stored session.
    ///
    /// Returns `Ok(None)` when nothing is stored. An entry that fails to
    /// decode is deleted and reported as [`AuthError::StorageError`].
    pub async fn retrieve_session(&self) -> Result<Option<StoredSession>> {
        let data = self.secure_store.get_secret(&self.key).await.map_err(|e| {
            warn!(key = %self.key, error = %e, "Failed to read session from secure storage");
            AuthError::SecureStorageUnavailable(e.to_string())
        })?;

        let Some(data) = data else {
            debug!(key = %self.key, "No session found in storage");
            return Ok(None);
        };

        let record: SessionRecord = match serde_json::from_slice(&data) {
            Ok(record) => record,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Stored session is corrupted, erasing");

                if let Err(delete_err) = self.secure_store.delete_secret(&self.key).await {
                    warn!(key = %self.key, error = %delete_err, "Failed to erase corrupted session");
                }

                return Err(AuthError::StorageError(format!(
                    "Stored session could not be decoded: {}",
                    e
                )));
            }
        };

        let expires_at = DateTime::<Utc>::from_timestamp(record.expires_at, 0).ok_or_else(|| {
            AuthError::StorageError("Stored session has an invalid expiry".to_string())
        })?;

        let tokens = OAuthTokens {
            access_token: record.access_token,
            id_token: record.id_token,
            refresh_token: record.refresh_token,
            expires_at,
        };

        info!(
            key = %self.key,
            expires_at = %tokens.expires_at,
            expired = tokens.is_expired(),
            "Session retrieved"
        );

        Ok(Some(StoredSession {
            tokens,
            user: record.user,
        }))
    }

    /// Erase the stored session. Succeeds when nothing is stored.
    pub async fn delete_session(&self) -> Result<()> {
        self.secure_store
            .delete_secret(&self.key)
            .await
            .map_err(|e| {
                warn!(key = %self.key, error = %e, "Failed to delete session from secure storage");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!(key = %self.key, "Session deleted");
        Ok(())
    }

    pub async fn has_session(&self) -> Result<bool> {
        self.secure_store
            .has_secret(&self.key)
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        data: Mutex<HashMap<String, Vec<u8>>>,
        fail_writes: bool,
    }

    #[async_trait]
    impl SecureStore for MemoryStore {
        async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
            if self.fail_writes {
                return Err(BridgeError::NotAvailable("keychain locked".to_string()));
            }
            self.data.lock().await.insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
            Ok(self.data.lock().await.get(key).cloned())
        }

        async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
            self.data.lock().await.remove(key);
            Ok(())
        }

        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(self.data.lock().await.keys().cloned().collect())
        }

        async fn clear_all(&self) -> BridgeResult<()> {
            self.data.lock().await.clear();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_store_and_retrieve_session() {
        let store = TokenStore::new(Arc::new(MemoryStore::default()), "delegated");
        assert_eq!(store.key(), "oauth_tokens:delegated");

        let mut tokens = OAuthTokens::new("access".to_string(), 3600);
        tokens.id_token = Some("id".to_string());
        store
            .store_session(&tokens, &json!({"sub": "auth0|1"}))
            .await
            .unwrap();

        assert!(store.has_session().await.unwrap());

        let session = store.retrieve_session().await.unwrap().unwrap();
        assert_eq!(session.tokens.access_token, "access");
        assert_eq!(session.tokens.id_token.as_deref(), Some("id"));
        assert_eq!(
            session.tokens.expires_at.timestamp(),
            tokens.expires_at.timestamp()
        );
        assert_eq!(session.user["sub"], "auth0|1");
    }

    #[tokio::test]
    async fn test_retrieve_missing_session() {
        let store = TokenStore::new(Arc::new(MemoryStore::default()), "delegated");
        assert!(store.retrieve_session().await.unwrap().is_none());
        // deleting nothing is fine
        store.delete_session().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupted_session_is_erased() {
        let backing = Arc::new(MemoryStore::default());
        backing
            .set_secret("oauth_tokens:delegated", b"{not json")
            .await
            .unwrap();

        let store = TokenStore::new(backing.clone(), "delegated");
        let result = store.retrieve_session().await;

        assert!(matches!(result, Err(AuthError::StorageError(_))));
        assert!(backing
            .get_secret("oauth_tokens:delegated")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_write_failure_maps_to_unavailable() {
        let backing = Arc::new(MemoryStore {
            fail_writes: true,
            ..MemoryStore::default()
        });
        let store = TokenStore::new(backing, "delegated");

        let tokens = OAuthTokens::new("access".to_string(), 3600);
        let result = store.store_session(&tokens, &Value::Null).await;
        assert!(matches!(
            result,
            Err(AuthError::SecureStorageUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_namespaces_do_not_collide() {
        let backing: Arc<MemoryStore> = Arc::new(MemoryStore::default());
        let a = TokenStore::new(backing.clone(), "a");
        let b = TokenStore::new(backing, "b");

        a.store_session(&OAuthTokens::new("a".to_string(), 3600), &Value::Null)
            .await
            .unwrap();

        assert!(a.has_session().await.unwrap());
        assert!(!b.has_session().await.unwrap());
    }
}
