//! Shared fixtures for the core-auth integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::storage::{SecureStore, SettingsStore};
use bridge_traits::time::Clock;
use chrono::{DateTime, Duration, TimeZone, Utc};
use core_auth::oauth::{OAuthConfig, OAuthFlowManager};
use core_auth::providers::{
    BackendProvider, BackendSession, DelegatedProvider, LocalProvider, RedirectHandler,
    SessionBackend, SessionChange,
};
use core_auth::{AuthError, ProviderAdapter, ProviderKind, ProviderLoader, TokenStore};
use core_runtime::config::{DelegatedConfig, LocalCredentials};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Notify};

pub const BACKEND_EMAIL: &str = "user@example.com";
pub const BACKEND_PASSWORD: &str = "secret";

#[derive(Default)]
pub struct MemorySecureStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
        self.data.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        Ok(self.data.lock().unwrap().keys().cloned().collect())
    }

    async fn clear_all(&self) -> BridgeResult<()> {
        self.data.lock().unwrap().clear();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySettingsStore {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        Ok(self.values.lock().unwrap().keys().cloned().collect())
    }

    async fn clear_all(&self) -> BridgeResult<()> {
        self.values.lock().unwrap().clear();
        Ok(())
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn at_noon() -> Self {
        Self(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// HTTP client for tests that must not touch the network.
pub struct OfflineHttp;

#[async_trait]
impl HttpClient for OfflineHttp {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        Err(BridgeError::NotAvailable(format!(
            "offline test client: {}",
            request.url
        )))
    }
}

#[derive(Default)]
pub struct RecordingRedirect {
    pub urls: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl RecordingRedirect {
    pub fn last(&self) -> Option<String> {
        self.urls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl RedirectHandler for RecordingRedirect {
    async fn redirect(&self, url: &str) -> core_auth::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuthError::Other("browser unavailable".to_string()));
        }
        self.urls.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// In-memory backend accepting one email/password pair.
pub struct FakeSessionBackend {
    pub session: Mutex<Option<BackendSession>>,
    pub sign_out_error: Mutex<Option<AuthError>>,
    pub subscriptions: AtomicUsize,
    pub changes: broadcast::Sender<SessionChange>,
}

impl Default for FakeSessionBackend {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(8);
        Self {
            session: Mutex::new(None),
            sign_out_error: Mutex::new(None),
            subscriptions: AtomicUsize::new(0),
            changes,
        }
    }
}

pub fn backend_session(email: &str) -> BackendSession {
    BackendSession {
        access_token: "access".to_string(),
        refresh_token: Some("refresh".to_string()),
        expires_at: Utc::now() + Duration::hours(1),
        user: json!({ "email": email }),
    }
}

#[async_trait]
impl SessionBackend for FakeSessionBackend {
    async fn get_session(&self) -> core_auth::Result<Option<BackendSession>> {
        Ok(self.session.lock().unwrap().clone())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> core_auth::Result<BackendSession> {
        if email != BACKEND_EMAIL || password != BACKEND_PASSWORD {
            return Err(AuthError::AuthenticationFailed {
                provider: "backend".to_string(),
                reason: "Invalid login credentials".to_string(),
            });
        }
        let session = backend_session(email);
        *self.session.lock().unwrap() = Some(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> core_auth::Result<()> {
        if let Some(err) = self.sign_out_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.session.lock().unwrap().take();
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        self.changes.subscribe()
    }
}

pub fn delegated_tenant() -> DelegatedConfig {
    DelegatedConfig {
        domain: Some("tenant.example.com".to_string()),
        client_id: Some("client-123".to_string()),
        ..DelegatedConfig::default()
    }
}

/// Loader over in-memory bridges, with knobs for slow and failing loads.
pub struct TestLoader {
    pub settings: Arc<MemorySettingsStore>,
    pub secure: Arc<MemorySecureStore>,
    pub backend: Arc<FakeSessionBackend>,
    pub redirect: Arc<RecordingRedirect>,
    pub http: Arc<dyn HttpClient>,
    pub calls: AtomicUsize,
    failures_remaining: AtomicUsize,
    delay: Option<std::time::Duration>,
    gate: Option<Arc<Notify>>,
}

impl TestLoader {
    pub fn new() -> Self {
        Self {
            settings: Arc::new(MemorySettingsStore::default()),
            secure: Arc::new(MemorySecureStore::default()),
            backend: Arc::new(FakeSessionBackend::default()),
            redirect: Arc::new(RecordingRedirect::default()),
            http: Arc::new(OfflineHttp),
            calls: AtomicUsize::new(0),
            failures_remaining: AtomicUsize::new(0),
            delay: None,
            gate: None,
        }
    }

    pub fn failing(self, times: usize) -> Self {
        self.failures_remaining.store(times, Ordering::SeqCst);
        self
    }

    pub fn delayed(mut self, millis: u64) -> Self {
        self.delay = Some(std::time::Duration::from_millis(millis));
        self
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_http(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = http;
        self
    }
}

#[async_trait]
impl ProviderLoader for TestLoader {
    async fn load(&self, kind: ProviderKind) -> core_auth::Result<ProviderAdapter> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(AuthError::provider_load(kind.as_str(), "module unavailable"));
        }

        let adapter = match kind {
            ProviderKind::Local => ProviderAdapter::Local(LocalProvider::new(
                LocalCredentials::default(),
                self.settings.clone(),
            )),
            ProviderKind::Backend => {
                ProviderAdapter::Backend(BackendProvider::new(self.backend.clone()))
            }
            ProviderKind::Delegated => {
                let config = OAuthConfig::from_tenant(&delegated_tenant())?;
                ProviderAdapter::Delegated(DelegatedProvider::new(
                    OAuthFlowManager::new(config, self.http.clone()),
                    TokenStore::new(self.secure.clone(), "delegated"),
                    self.redirect.clone(),
                ))
            }
        };
        Ok(adapter)
    }
}
