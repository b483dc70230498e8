//! Local credential provider.
//!
//! Checks a username/password pair against the configured credentials and
//! remembers the signed-in user in the settings store, so a restart restores
//! the session.

use super::state::ProviderState;
use crate::error::Result;
use crate::types::AuthState;
use bridge_traits::storage::SettingsStore;
use core_runtime::config::LocalCredentials;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

/// Settings key holding the persisted user.
pub const SESSION_KEY: &str = "basic_auth_user";

const INVALID_CREDENTIALS: &str = "Invalid username or password";
const LOGIN_FAILED: &str = "Login failed";
const INIT_FAILED: &str = "Failed to initialize authentication";

#[derive(Serialize, Deserialize)]
struct PersistedUser {
    username: String,
}

pub struct LocalProvider {
    credentials: LocalCredentials,
    settings: Arc<dyn SettingsStore>,
    state: ProviderState,
}

impl LocalProvider {
    pub fn new(credentials: LocalCredentials, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            credentials,
            settings,
            state: ProviderState::new(),
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Restore a persisted user, if any.
    ///
    /// Storage or decoding failures are recorded in state; the call itself
    /// does not fail.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        self.state.update(|s| s.loading = true);

        match self.restore().await {
            Ok(Some(user)) => {
                info!(username = %user.username, "Restored local session");
                self.state.sign_in(json!({ "username": user.username }));
            }
            Ok(None) => self.state.finish(),
            Err(reason) => {
                warn!(error = %reason, "Failed to restore local session");
                self.state.fail(INIT_FAILED);
            }
        }

        Ok(())
    }

    async fn restore(&self) -> std::result::Result<Option<PersistedUser>, String> {
        let Some(raw) = self
            .settings
            .get_string(SESSION_KEY)
            .await
            .map_err(|e| e.to_string())?
        else {
            return Ok(None);
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| e.to_string())
    }

    /// Check the pair and sign in on a match.
    ///
    /// Returns `false` on mismatch or when the session cannot be persisted;
    /// the reason is left in state.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<bool> {
        self.state.begin();

        if username != self.credentials.username || password != self.credentials.password {
            warn!("Local login rejected");
            self.state.fail(INVALID_CREDENTIALS);
            return Ok(false);
        }

        let persisted = PersistedUser {
            username: username.to_string(),
        };
        let stored = match serde_json::to_string(&persisted) {
            Ok(raw) => self
                .settings
                .set_string(SESSION_KEY, &raw)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        if let Err(reason) = stored {
            warn!(error = %reason, "Failed to persist local session");
            self.state.fail(LOGIN_FAILED);
            return Ok(false);
        }

        info!("Local login succeeded");
        self.state.sign_in(json!({ "username": username }));
        Ok(true)
    }

    /// Clear state and forget the persisted user.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        self.state.sign_out();

        // Best effort: the in-memory session is already gone
        if let Err(e) = self.settings.delete(SESSION_KEY).await {
            warn!(error = %e, "Failed to remove persisted local session");
        }

        info!("Local logout complete");
        Ok(())
    }
}
