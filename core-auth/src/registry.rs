//! # Adapter Registry
//!
//! Lazily constructs provider adapters and caches them for the lifetime of
//! the facade.
//!
//! ## Loading rules
//!
//! - At most one load per provider is ever in flight. Concurrent resolves of
//!   the same provider await one shared future and receive the same
//!   `Arc<ProviderAdapter>`.
//! - A successful load is cached forever; later resolves never call the
//!   loader again.
//! - A failed load is handed to every waiter and then forgotten, so the next
//!   resolve retries.
//! - [`AdapterRegistry::is_loading`] is raised synchronously when a load is
//!   scheduled and drops when the last in-flight load settles.
//! - A load runs on a spawned task and settles even if every caller waiting
//!   on it is dropped.

use crate::adapter::ProviderAdapter;
use crate::error::{AuthError, Result};
use crate::oauth::{OAuthConfig, OAuthFlowManager};
use crate::providers::{
    BackendProvider, DelegatedProvider, LocalProvider, LogRedirectHandler, RedirectHandler,
    RestSessionBackend,
};
use crate::token_store::TokenStore;
use crate::types::ProviderKind;
use async_trait::async_trait;
use core_runtime::config::{AuthConfig, HostBridges};
use core_runtime::events::{AuthEvent, EventBus};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

type LoadFuture = Shared<BoxFuture<'static, Result<Arc<ProviderAdapter>>>>;

/// Builds the adapter for a provider on first use.
#[async_trait]
pub trait ProviderLoader: Send + Sync {
    async fn load(&self, kind: ProviderKind) -> Result<ProviderAdapter>;
}

/// Loader wiring each provider to the configuration and host bridges.
///
/// Provider settings are checked here, so a missing backend URL or tenant
/// domain surfaces as [`AuthError::ProviderLoad`] on first use of that
/// provider only.
pub struct DefaultProviderLoader {
    config: AuthConfig,
    bridges: HostBridges,
    redirect: Arc<dyn RedirectHandler>,
}

impl DefaultProviderLoader {
    pub fn new(config: AuthConfig, bridges: HostBridges) -> Self {
        Self {
            config,
            bridges,
            redirect: Arc::new(LogRedirectHandler),
        }
    }

    pub fn with_redirect_handler(mut self, redirect: Arc<dyn RedirectHandler>) -> Self {
        self.redirect = redirect;
        self
    }
}

#[async_trait]
impl ProviderLoader for DefaultProviderLoader {
    async fn load(&self, kind: ProviderKind) -> Result<ProviderAdapter> {
        match kind {
            ProviderKind::Local => Ok(ProviderAdapter::Local(LocalProvider::new(
                self.config.local.clone(),
                self.bridges.settings_store.clone(),
            ))),
            ProviderKind::Backend => {
                let backend = &self.config.backend;
                let (Some(url), Some(anon_key)) = (
                    backend.url.as_deref().filter(|_| backend.is_configured()),
                    backend.anon_key.as_deref(),
                ) else {
                    return Err(AuthError::provider_load(
                        kind.as_str(),
                        "SUPABASE_URL and SUPABASE_ANON_KEY must both be set",
                    ));
                };

                let http = self
                    .bridges
                    .require_http(kind.as_str())
                    .map_err(|e| AuthError::provider_load(kind.as_str(), e.to_string()))?;

                let session_backend = RestSessionBackend::new(
                    url,
                    anon_key,
                    http,
                    self.bridges.secure_store.clone(),
                );
                Ok(ProviderAdapter::Backend(BackendProvider::new(Arc::new(
                    session_backend,
                ))))
            }
            ProviderKind::Delegated => {
                let oauth = OAuthConfig::from_tenant(&self.config.delegated)?;
                let http = self
                    .bridges
                    .require_http(kind.as_str())
                    .map_err(|e| AuthError::provider_load(kind.as_str(), e.to_string()))?;

                Ok(ProviderAdapter::Delegated(DelegatedProvider::new(
                    OAuthFlowManager::new(oauth, http),
                    TokenStore::new(self.bridges.secure_store.clone(), kind.as_str()),
                    self.redirect.clone(),
                )))
            }
        }
    }
}

/// Cache of loaded provider adapters. Cloning shares the cache.
#[derive(Clone)]
pub struct AdapterRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    loader: Arc<dyn ProviderLoader>,
    ready: [OnceLock<Arc<ProviderAdapter>>; 3],
    pending: Mutex<HashMap<ProviderKind, LoadFuture>>,
    in_flight: AtomicUsize,
    in_flight_by_kind: [AtomicUsize; 3],
    load_counts: [AtomicUsize; 3],
    event_bus: EventBus,
}

/// Keeps the loading counters raised while a load future is alive.
struct LoadGuard {
    inner: Arc<RegistryInner>,
    kind: ProviderKind,
}

impl LoadGuard {
    fn new(inner: Arc<RegistryInner>, kind: ProviderKind) -> Self {
        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        inner.in_flight_by_kind[kind.index()].fetch_add(1, Ordering::SeqCst);
        Self { inner, kind }
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        self.inner.in_flight_by_kind[self.kind.index()].fetch_sub(1, Ordering::SeqCst);
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AdapterRegistry {
    pub fn new(loader: Arc<dyn ProviderLoader>, event_bus: EventBus) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                loader,
                ready: Default::default(),
                pending: Mutex::new(HashMap::new()),
                in_flight: AtomicUsize::new(0),
                in_flight_by_kind: Default::default(),
                load_counts: Default::default(),
                event_bus,
            }),
        }
    }

    /// Return the cached adapter, loading it on first use.
    ///
    /// # Errors
    ///
    /// Returns the loader's error. Every caller that joined the failed load
    /// receives the same error, and nothing is cached.
    #[instrument(skip(self), fields(provider = %kind))]
    pub async fn resolve(&self, kind: ProviderKind) -> Result<Arc<ProviderAdapter>> {
        if let Some(adapter) = self.cached(kind) {
            return Ok(adapter);
        }

        let load = {
            let mut pending = self.inner.pending.lock().await;

            // A load may have finished while we waited for the lock
            if let Some(adapter) = self.cached(kind) {
                return Ok(adapter);
            }

            match pending.get(&kind) {
                Some(load) => {
                    debug!("Joining in-flight provider load");
                    load.clone()
                }
                None => {
                    let load = self.start_load(kind);
                    pending.insert(kind, load.clone());
                    load
                }
            }
        };

        load.await
    }

    /// Parse a provider identifier and resolve it.
    ///
    /// An unknown identifier fails with [`AuthError::UnsupportedProvider`]
    /// and touches nothing.
    pub async fn resolve_by_name(&self, name: &str) -> Result<Arc<ProviderAdapter>> {
        let kind: ProviderKind = name.parse()?;
        self.resolve(kind).await
    }

    fn start_load(&self, kind: ProviderKind) -> LoadFuture {
        let guard = LoadGuard::new(self.inner.clone(), kind);
        self.inner.load_counts[kind.index()].fetch_add(1, Ordering::SeqCst);
        let _ = self.inner.event_bus.emit(AuthEvent::ProviderLoading {
            provider: kind.to_string(),
        });
        info!(provider = %kind, "Loading provider");

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            let result = inner.loader.load(kind).await;

            match result {
                Ok(adapter) => {
                    let adapter = inner.ready[kind.index()]
                        .get_or_init(|| Arc::new(adapter))
                        .clone();
                    inner.pending.lock().await.remove(&kind);
                    let _ = inner.event_bus.emit(AuthEvent::ProviderLoaded {
                        provider: kind.to_string(),
                    });
                    info!(provider = %kind, "Provider loaded");
                    Ok(adapter)
                }
                Err(e) => {
                    inner.pending.lock().await.remove(&kind);
                    let _ = inner.event_bus.emit(AuthEvent::ProviderLoadFailed {
                        provider: kind.to_string(),
                        message: e.to_string(),
                    });
                    warn!(provider = %kind, error = %e, "Provider load failed");
                    Err(e)
                }
            }
        });

        // Detached so the load settles even when every waiter is dropped
        let inner = self.inner.clone();
        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    inner.pending.lock().await.remove(&kind);
                    warn!(provider = %kind, error = %e, "Provider load task aborted");
                    Err(AuthError::provider_load(
                        kind.as_str(),
                        format!("load task aborted: {}", e),
                    ))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// The cached adapter, without loading.
    pub fn cached(&self, kind: ProviderKind) -> Option<Arc<ProviderAdapter>> {
        self.inner.ready[kind.index()].get().cloned()
    }

    pub fn is_loaded(&self, kind: ProviderKind) -> bool {
        self.inner.ready[kind.index()].get().is_some()
    }

    /// Any provider load is in flight.
    pub fn is_loading(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn is_loading_kind(&self, kind: ProviderKind) -> bool {
        self.inner.in_flight_by_kind[kind.index()].load(Ordering::SeqCst) > 0
    }

    /// Number of loads started for `kind`, including failed ones.
    pub fn load_count(&self, kind: ProviderKind) -> usize {
        self.inner.load_counts[kind.index()].load(Ordering::SeqCst)
    }

    /// Providers with a cached adapter, in slot order.
    pub fn loaded_providers(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.is_loaded(*kind))
            .collect()
    }
}
