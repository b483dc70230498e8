//! Uniform contract over the identity providers.

use crate::error::Result;
use crate::providers::{BackendProvider, DelegatedProvider, LocalProvider};
use crate::types::{AuthState, LoginOptions, ProviderKind};
use tokio::sync::watch;
use tracing::debug;

/// A loaded provider behind one normalised contract.
///
/// - `authenticate` resolves to whether the attempt succeeded. The delegated
///   provider only starts a redirect, so it reports `true` whenever the
///   redirect was issued without a structural error.
/// - `Err` is reserved for structural failures; credential and network
///   problems land in [`AuthState::error`].
pub enum ProviderAdapter {
    Delegated(DelegatedProvider),
    Local(LocalProvider),
    Backend(BackendProvider),
}

impl ProviderAdapter {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderAdapter::Delegated(_) => ProviderKind::Delegated,
            ProviderAdapter::Local(_) => ProviderKind::Local,
            ProviderAdapter::Backend(_) => ProviderKind::Backend,
        }
    }

    /// Current state of the underlying provider.
    pub fn describe_state(&self) -> AuthState {
        match self {
            ProviderAdapter::Delegated(p) => p.state(),
            ProviderAdapter::Local(p) => p.state(),
            ProviderAdapter::Backend(p) => p.state(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        match self {
            ProviderAdapter::Delegated(p) => p.subscribe(),
            ProviderAdapter::Local(p) => p.subscribe(),
            ProviderAdapter::Backend(p) => p.subscribe(),
        }
    }

    pub async fn initialize(&self) -> Result<()> {
        match self {
            ProviderAdapter::Delegated(p) => p.initialize().await,
            ProviderAdapter::Local(p) => p.initialize().await,
            ProviderAdapter::Backend(p) => p.initialize().await,
        }
    }

    pub async fn authenticate(&self, options: &LoginOptions) -> Result<bool> {
        match self {
            ProviderAdapter::Delegated(p) => {
                p.login(options).await?;
                Ok(true)
            }
            ProviderAdapter::Local(p) => {
                match (options.get_str("username"), options.get_str("password")) {
                    (Some(username), Some(password)) => p.login(username, password).await,
                    _ => {
                        debug!("Local login skipped: username or password missing");
                        Ok(false)
                    }
                }
            }
            ProviderAdapter::Backend(p) => p.login(options).await,
        }
    }

    pub async fn deauthenticate(&self) -> Result<()> {
        match self {
            ProviderAdapter::Delegated(p) => p.logout().await,
            ProviderAdapter::Local(p) => p.logout().await,
            ProviderAdapter::Backend(p) => p.logout().await,
        }
    }

    pub fn as_delegated(&self) -> Option<&DelegatedProvider> {
        match self {
            ProviderAdapter::Delegated(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_backend(&self) -> Option<&BackendProvider> {
        match self {
            ProviderAdapter::Backend(p) => Some(p),
            _ => None,
        }
    }
}

impl std::fmt::Debug for ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("kind", &self.kind())
            .field("state", &self.describe_state())
            .finish()
    }
}
