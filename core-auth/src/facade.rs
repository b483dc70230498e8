//! # Authentication Facade
//!
//! Single entry point the application talks to. It owns the selected
//! provider, the last login attempt timestamp and the adapter registry, and
//! derives one read-only [`AuthStateView`] from them.
//!
//! ## Lifecycle
//!
//! ```text
//! new ──> NoAdapter ──resolve──> Loading ──ok──> Ready
//!             ^                     │
//!             └───────failed────────┘
//! ```
//!
//! `set_provider` switches the selection before resolving, so the view
//! reports the new provider (loading) while its module loads. Switching back
//! to a provider used earlier reuses its cached adapter.
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::{AuthFacade, LoginOptions};
//! use core_runtime::config::{AuthConfig, HostBridges};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::from_env()?;
//! let bridges = HostBridges::builder().build().await?;
//! let facade = AuthFacade::new(config, bridges);
//!
//! facade.set_provider("local").await?;
//! facade.init_auth().await?;
//!
//! let ok = facade
//!     .login(LoginOptions::new().with("username", "admin").with("password", "password"))
//!     .await?;
//! assert_eq!(ok, facade.state().is_authenticated);
//! # Ok(())
//! # }
//! ```

use crate::adapter::ProviderAdapter;
use crate::error::{AuthError, Result};
use crate::registry::{AdapterRegistry, DefaultProviderLoader, ProviderLoader};
use crate::types::{AuthState, AuthStateView, FacadePhase, LoginOptions, ProviderKind};
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use core_runtime::config::{AuthConfig, HostBridges};
use core_runtime::events::{AuthEvent, EventBus};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};

/// Runtime-switchable authentication facade. Cloning shares the instance.
#[derive(Clone)]
pub struct AuthFacade {
    inner: Arc<FacadeInner>,
}

struct FacadeInner {
    registry: AdapterRegistry,
    selected: watch::Sender<ProviderKind>,
    last_login_attempt: watch::Sender<Option<DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
}

impl AuthFacade {
    /// Facade over the built-in providers, starting on the configured
    /// default provider.
    pub fn new(config: AuthConfig, bridges: HostBridges) -> Self {
        let default_provider = ProviderKind::from_config(config.default_provider.as_deref());
        let event_bus = EventBus::new(config.event_buffer_size);
        let clock = bridges.clock.clone();
        let loader = DefaultProviderLoader::new(config, bridges);

        Self::from_parts(default_provider, Arc::new(loader), clock, event_bus)
    }

    pub fn builder() -> AuthFacadeBuilder {
        AuthFacadeBuilder::default()
    }

    fn from_parts(
        default_provider: ProviderKind,
        loader: Arc<dyn ProviderLoader>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Self {
        let (selected, _) = watch::channel(default_provider);
        let (last_login_attempt, _) = watch::channel(None);

        debug!(provider = %default_provider, "Creating auth facade");

        Self {
            inner: Arc::new(FacadeInner {
                registry: AdapterRegistry::new(loader, event_bus.clone()),
                selected,
                last_login_attempt,
                clock,
                event_bus,
            }),
        }
    }

    /// Resolve the selected provider and let it restore any session.
    ///
    /// # Errors
    ///
    /// Fails only when the provider cannot be loaded. Restore problems are
    /// reported through [`AuthStateView::error`].
    #[instrument(skip(self), fields(provider = %self.current_provider()))]
    pub async fn init_auth(&self) -> Result<()> {
        let kind = self.current_provider();
        let adapter = self.inner.registry.resolve(kind).await?;

        adapter.initialize().await?;

        let state = adapter.describe_state();
        info!(
            provider = %kind,
            is_authenticated = state.is_authenticated,
            "Authentication initialized"
        );
        self.emit(AuthEvent::Initialized {
            provider: kind.to_string(),
            is_authenticated: state.is_authenticated,
        });
        self.report_error(kind, &state);

        Ok(())
    }

    /// Attempt a login with the selected provider.
    ///
    /// The attempt timestamp is recorded before the provider is resolved,
    /// so it is set even if the attempt fails. Resolves to `false` for
    /// rejected credentials; `Err` is reserved for providers that cannot be
    /// loaded.
    #[instrument(skip(self, options), fields(provider = %self.current_provider()))]
    pub async fn login(&self, options: LoginOptions) -> Result<bool> {
        let attempted_at = self.inner.clock.now();
        self.inner.last_login_attempt.send_replace(Some(attempted_at));

        let kind = self.current_provider();
        let adapter = self.inner.registry.resolve(kind).await?;
        let success = adapter.authenticate(&options).await?;

        info!(provider = %kind, success, "Login attempted");
        self.emit(AuthEvent::LoginAttempted {
            provider: kind.to_string(),
            success,
            attempted_at,
        });
        if !success {
            self.report_error(kind, &adapter.describe_state());
        }

        Ok(success)
    }

    /// Sign out of the selected provider.
    ///
    /// Clears the last login attempt first. Does nothing else when the
    /// selected provider was never loaded.
    #[instrument(skip(self), fields(provider = %self.current_provider()))]
    pub async fn logout(&self) -> Result<()> {
        self.inner.last_login_attempt.send_replace(None);

        let kind = self.current_provider();
        let Some(adapter) = self.inner.registry.cached(kind) else {
            debug!(provider = %kind, "Logout skipped: provider not loaded");
            return Ok(());
        };

        adapter.deauthenticate().await?;

        info!(provider = %kind, "Signed out");
        self.emit(AuthEvent::SignedOut {
            provider: kind.to_string(),
        });
        self.report_error(kind, &adapter.describe_state());

        Ok(())
    }

    /// Switch to the provider named `id` and load it.
    ///
    /// # Errors
    ///
    /// - [`AuthError::UnsupportedProvider`] for an unknown id; the selection
    ///   is left untouched.
    /// - The load error when the provider cannot be loaded; the selection
    ///   stays on the new provider with no adapter.
    pub async fn set_provider(&self, id: &str) -> Result<()> {
        let kind = id.parse::<ProviderKind>().map_err(|e| {
            warn!(provider = id, "Rejected unsupported provider");
            e
        })?;
        self.select_provider(kind).await
    }

    /// Typed variant of [`set_provider`](Self::set_provider).
    #[instrument(skip(self))]
    pub async fn select_provider(&self, kind: ProviderKind) -> Result<()> {
        let previous = self.current_provider();
        if previous == kind {
            debug!(provider = %kind, "Provider already selected");
            return Ok(());
        }

        self.inner.selected.send_replace(kind);
        info!(from = %previous, to = %kind, "Provider changed");
        self.emit(AuthEvent::ProviderChanged {
            from: previous.to_string(),
            to: kind.to_string(),
        });

        self.inner.registry.resolve(kind).await.map(|_| ())
    }

    /// Finish a delegated login with the callback's `code` and `state`.
    ///
    /// # Errors
    ///
    /// Fails when the delegated provider cannot be loaded, when no
    /// authorization is pending, or when `state` does not match.
    pub async fn complete_authorization(&self, code: &str, state: &str) -> Result<()> {
        let adapter = self.inner.registry.resolve(ProviderKind::Delegated).await?;
        let provider = adapter.as_delegated().ok_or_else(|| {
            AuthError::Other("Delegated slot holds another provider".to_string())
        })?;

        let result = provider.complete_authorization(code, state).await;
        if let Err(e) = &result {
            self.emit(AuthEvent::AuthError {
                provider: ProviderKind::Delegated.to_string(),
                message: e.user_message(),
            });
        }
        result
    }

    /// Derived view of the selected provider.
    ///
    /// `loading` is true while any provider module loads, or while the
    /// selected provider is busy.
    pub fn state(&self) -> AuthStateView {
        let provider = self.current_provider();
        let adapter_state = self
            .inner
            .registry
            .cached(provider)
            .map(|adapter| adapter.describe_state())
            .unwrap_or_default();

        AuthStateView {
            provider,
            is_authenticated: adapter_state.is_authenticated,
            user: adapter_state.user,
            loading: self.inner.registry.is_loading() || adapter_state.loading,
            error: adapter_state.error,
            last_login_attempt: *self.inner.last_login_attempt.borrow(),
        }
    }

    pub fn phase(&self) -> FacadePhase {
        let kind = self.current_provider();
        if self.inner.registry.is_loaded(kind) {
            FacadePhase::Ready
        } else if self.inner.registry.is_loading_kind(kind) {
            FacadePhase::Loading
        } else {
            FacadePhase::NoAdapter
        }
    }

    pub fn current_provider(&self) -> ProviderKind {
        *self.inner.selected.borrow()
    }

    pub fn last_login_attempt(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_login_attempt.borrow()
    }

    pub fn is_module_loading(&self) -> bool {
        self.inner.registry.is_loading()
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.inner.registry
    }

    /// The cached adapter of the selected provider, if loaded.
    pub fn current_adapter(&self) -> Option<Arc<ProviderAdapter>> {
        self.inner.registry.cached(self.current_provider())
    }

    /// Lifecycle events (provider switches, loads, logins).
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.event_bus.subscribe()
    }

    pub fn watch_provider(&self) -> watch::Receiver<ProviderKind> {
        self.inner.selected.subscribe()
    }

    /// Live state of the selected provider, loading it if needed.
    pub async fn watch_adapter_state(&self) -> Result<watch::Receiver<AuthState>> {
        let adapter = self
            .inner
            .registry
            .resolve(self.current_provider())
            .await?;
        Ok(adapter.subscribe())
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine
        let _ = self.inner.event_bus.emit(event);
    }

    fn report_error(&self, kind: ProviderKind, state: &AuthState) {
        if let Some(message) = &state.error {
            self.emit(AuthEvent::AuthError {
                provider: kind.to_string(),
                message: message.clone(),
            });
        }
    }
}

/// Builder for [`AuthFacade`] with an injected loader.
#[derive(Default)]
pub struct AuthFacadeBuilder {
    default_provider: Option<ProviderKind>,
    loader: Option<Arc<dyn ProviderLoader>>,
    clock: Option<Arc<dyn Clock>>,
    event_bus: Option<EventBus>,
}

impl AuthFacadeBuilder {
    pub fn default_provider(mut self, kind: ProviderKind) -> Self {
        self.default_provider = Some(kind);
        self
    }

    pub fn loader(mut self, loader: Arc<dyn ProviderLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] when no loader was supplied.
    pub fn build(self) -> Result<AuthFacade> {
        let loader = self
            .loader
            .ok_or_else(|| AuthError::Configuration("A provider loader is required".to_string()))?;

        Ok(AuthFacade::from_parts(
            self.default_provider.unwrap_or_default(),
            loader,
            self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            self.event_bus.unwrap_or_default(),
        ))
    }
}
