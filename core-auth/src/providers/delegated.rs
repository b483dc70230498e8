//! Delegated OAuth provider.
//!
//! Login hands an authorization URL to the host through a
//! [`RedirectHandler`]; the host later feeds the callback's `code` and
//! `state` back through [`DelegatedProvider::complete_authorization`].

use super::state::ProviderState;
use crate::error::{AuthError, Result};
use crate::oauth::{OAuthFlowManager, PkceVerifier};
use crate::token_store::TokenStore;
use crate::types::{AuthState, LoginOptions};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{info, instrument, warn};

/// Parameters forwarded from [`LoginOptions`] to the authorization request.
const FORWARDED_PARAMS: &[&str] = &["screen_hint", "login_hint"];

/// Sends the user agent to an authorization or logout URL.
#[async_trait]
pub trait RedirectHandler: Send + Sync {
    async fn redirect(&self, url: &str) -> Result<()>;
}

/// Logs the URL for the host to pick up. Used when no handler is injected.
#[derive(Debug, Default, Clone)]
pub struct LogRedirectHandler;

#[async_trait]
impl RedirectHandler for LogRedirectHandler {
    async fn redirect(&self, url: &str) -> Result<()> {
        info!(url, "Open this URL to continue");
        Ok(())
    }
}

pub struct DelegatedProvider {
    flow: OAuthFlowManager,
    tokens: TokenStore,
    redirect: Arc<dyn RedirectHandler>,
    pending: Mutex<Option<PkceVerifier>>,
    state: ProviderState,
}

impl DelegatedProvider {
    pub fn new(
        flow: OAuthFlowManager,
        tokens: TokenStore,
        redirect: Arc<dyn RedirectHandler>,
    ) -> Self {
        Self {
            flow,
            tokens,
            redirect,
            pending: Mutex::new(None),
            state: ProviderState::new(),
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Restore a stored, unexpired session.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        self.state.update(|s| s.loading = true);

        match self.tokens.retrieve_session().await {
            Ok(Some(session)) if !session.tokens.is_expired() => {
                info!("Restored delegated session");
                self.state.sign_in(session.user);
            }
            Ok(Some(_)) => {
                info!("Stored delegated session expired");
                if let Err(e) = self.tokens.delete_session().await {
                    warn!(error = %e, "Failed to erase expired session");
                }
                self.state.finish();
            }
            Ok(None) => self.state.finish(),
            Err(e) => {
                warn!(error = %e, "Delegated session restore failed");
                self.state.fail(e.user_message());
            }
        }

        Ok(())
    }

    /// Start an authorization code flow.
    ///
    /// Resolves once the URL has been handed to the redirect handler; the
    /// session is established by [`complete_authorization`](Self::complete_authorization).
    #[instrument(skip(self, options))]
    pub async fn login(&self, options: &LoginOptions) -> Result<()> {
        self.state.begin();

        let extra: Vec<(&str, &str)> = FORWARDED_PARAMS
            .iter()
            .filter_map(|key| options.get_str(key).map(|value| (*key, value)))
            .collect();

        let (url, verifier) = match self.flow.build_auth_url(&extra) {
            Ok(built) => built,
            Err(e) => {
                warn!(error = %e, "Failed to build authorization URL");
                self.state.fail(e.user_message());
                return Err(e);
            }
        };
        *self.pending.lock().await = Some(verifier);

        if let Err(e) = self.redirect.redirect(&url).await {
            warn!(error = %e, "Redirect to authorization URL failed");
            self.pending.lock().await.take();
            self.state.fail(e.user_message());
            return Ok(());
        }

        self.state.finish();
        Ok(())
    }

    /// Finish the flow with the callback's `code` and `state`.
    ///
    /// # Errors
    ///
    /// Fails with [`AuthError::NoAuthorizationInProgress`] without a prior
    /// `login`, and with [`AuthError::StateMismatch`] on a forged callback.
    /// Every failure is also recorded in state.
    #[instrument(skip(self, code, state))]
    pub async fn complete_authorization(&self, code: &str, state: &str) -> Result<()> {
        self.state.begin();

        let result = self.exchange(code, state).await;
        match &result {
            Ok(user) => {
                info!("Delegated login completed");
                self.state.sign_in(user.clone());
            }
            Err(e) => {
                warn!(error = %e, "Delegated login failed");
                self.state.fail(e.user_message());
            }
        }
        result.map(|_| ())
    }

    async fn exchange(&self, code: &str, state: &str) -> Result<Value> {
        let verifier = self
            .pending
            .lock()
            .await
            .take()
            .ok_or(AuthError::NoAuthorizationInProgress)?;

        let tokens = self.flow.exchange_code(code, state, &verifier).await?;
        let user = self.flow.fetch_user_info(&tokens.access_token).await?;
        self.tokens.store_session(&tokens, &user).await?;
        Ok(user)
    }

    /// Drop the local session and send the user to the tenant logout page.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        self.state.sign_out();
        self.pending.lock().await.take();

        if let Err(e) = self.tokens.delete_session().await {
            warn!(error = %e, "Failed to erase delegated session");
            self.state.fail(e.user_message());
        }

        let url = self.flow.build_logout_url()?;
        if let Err(e) = self.redirect.redirect(&url).await {
            warn!(error = %e, "Redirect to logout URL failed");
            self.state.fail(e.user_message());
        }

        Ok(())
    }
}
