//! Hosted backend session provider.
//!
//! Email/password sign-in against a backend-as-a-service auth API. The wire
//! protocol lives behind [`SessionBackend`]; [`RestSessionBackend`] speaks the
//! GoTrue-style REST endpoints (`/auth/v1/token`, `/auth/v1/user`,
//! `/auth/v1/logout`) through the host's [`HttpClient`].

use super::state::ProviderState;
use crate::error::{AuthError, Result};
use crate::types::{AuthState, LoginOptions};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::storage::SecureStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};

/// Secure store key for the persisted session.
pub const SESSION_KEY: &str = "backend_session";

const CREDENTIALS_REQUIRED: &str = "Email and password are required";
const NO_USER_RETURNED: &str = "Sign in returned no user";
const CHANGE_BUFFER: usize = 16;

/// Session issued by the backend.
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub user: Value,
}

impl BackendSession {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

impl fmt::Debug for BackendSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSession")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Session change pushed by the backend outside of an explicit call.
#[derive(Debug, Clone)]
pub enum SessionChange {
    SignedIn(BackendSession),
    SignedOut,
}

/// Backend session API.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Current session, if one is persisted and still valid.
    async fn get_session(&self) -> Result<Option<BackendSession>>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<BackendSession>;

    async fn sign_out(&self) -> Result<()>;

    /// Stream of session changes the caller did not initiate, such as a
    /// session revoked server-side.
    fn subscribe(&self) -> broadcast::Receiver<SessionChange>;
}

/// REST implementation of [`SessionBackend`].
pub struct RestSessionBackend {
    base_url: String,
    anon_key: String,
    http_client: Arc<dyn HttpClient>,
    secure_store: Arc<dyn SecureStore>,
    changes: broadcast::Sender<SessionChange>,
}

#[derive(Deserialize)]
struct GrantResponse {
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[serde(default)]
    user: Value,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl RestSessionBackend {
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        http_client: Arc<dyn HttpClient>,
        secure_store: Arc<dyn SecureStore>,
    ) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            http_client,
            secure_store,
            changes,
        }
    }

    fn request(&self, method: HttpMethod, path: &str) -> HttpRequest {
        HttpRequest::new(method, format!("{}{}", self.base_url, path))
            .header("apikey", self.anon_key.clone())
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))
    }

    async fn load_stored(&self) -> Result<Option<BackendSession>> {
        let data = self
            .secure_store
            .get_secret(SESSION_KEY)
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))?;

        let Some(data) = data else {
            return Ok(None);
        };

        match serde_json::from_slice(&data) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(error = %e, "Stored backend session is corrupted, erasing");
                self.forget().await;
                Err(AuthError::StorageError(format!(
                    "Stored session could not be decoded: {}",
                    e
                )))
            }
        }
    }

    async fn persist(&self, session: &BackendSession) -> Result<()> {
        let json = serde_json::to_vec(session)?;
        self.secure_store
            .set_secret(SESSION_KEY, &json)
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))
    }

    async fn forget(&self) {
        if let Err(e) = self.secure_store.delete_secret(SESSION_KEY).await {
            warn!(error = %e, "Failed to erase backend session");
        }
    }

    fn failure(response: &HttpResponse, fallback: &str) -> AuthError {
        let body: ErrorBody = response.json().unwrap_or_default();
        let reason = body
            .error_description
            .or(body.msg)
            .or(body.message)
            .or(body.error)
            .unwrap_or_else(|| format!("{} (status {})", fallback, response.status));
        AuthError::AuthenticationFailed {
            provider: "backend".to_string(),
            reason,
        }
    }
}

#[async_trait]
impl SessionBackend for RestSessionBackend {
    #[instrument(skip(self))]
    async fn get_session(&self) -> Result<Option<BackendSession>> {
        let Some(session) = self.load_stored().await? else {
            debug!("No stored backend session");
            return Ok(None);
        };

        if session.is_expired() {
            info!("Stored backend session expired");
            self.forget().await;
            return Ok(None);
        }

        let response = self
            .send(
                self.request(HttpMethod::Get, "/auth/v1/user")
                    .bearer_token(session.access_token.clone()),
            )
            .await?;

        if matches!(response.status, 401 | 403) {
            info!(status = response.status, "Backend session revoked");
            self.forget().await;
            let _ = self.changes.send(SessionChange::SignedOut);
            return Ok(None);
        }

        if !response.is_success() {
            return Err(Self::failure(&response, "Session check failed"));
        }

        let user: Value = response.json().map_err(|e| {
            AuthError::Serialization(format!("Failed to parse user response: {}", e))
        })?;

        Ok(Some(BackendSession { user, ..session }))
    }

    #[instrument(skip(self, email, password))]
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<BackendSession> {
        let request = self
            .request(HttpMethod::Post, "/auth/v1/token?grant_type=password")
            .json(&json!({ "email": email, "password": password }))
            .map_err(|e| AuthError::Serialization(e.to_string()))?;

        let response = self.send(request).await?;

        if !response.is_success() {
            warn!(status = response.status, "Backend sign-in rejected");
            return Err(Self::failure(&response, "Sign in failed"));
        }

        let grant: GrantResponse = response.json().map_err(|e| {
            AuthError::Serialization(format!("Failed to parse token response: {}", e))
        })?;

        let session = BackendSession {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at: Utc::now() + Duration::seconds(grant.expires_in),
            user: grant.user,
        };

        self.persist(&session).await?;
        info!(expires_at = %session.expires_at, "Backend session established");
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<()> {
        let stored = self.load_stored().await.unwrap_or(None);
        self.forget().await;

        let Some(session) = stored else {
            return Ok(());
        };

        let response = self
            .send(
                self.request(HttpMethod::Post, "/auth/v1/logout")
                    .bearer_token(session.access_token),
            )
            .await?;

        // Already invalid server-side
        if response.is_success() || matches!(response.status, 401 | 404) {
            info!("Backend session signed out");
            return Ok(());
        }

        Err(Self::failure(&response, "Sign out failed"))
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }
}

/// Provider driving a [`SessionBackend`].
pub struct BackendProvider {
    backend: Arc<dyn SessionBackend>,
    state: ProviderState,
    listener_registered: AtomicBool,
}

impl BackendProvider {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            backend,
            state: ProviderState::new(),
            listener_registered: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn listener_registered(&self) -> bool {
        self.listener_registered.load(Ordering::SeqCst)
    }

    /// Restore the current session and start following session changes.
    ///
    /// The change listener is registered on the first call only.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        self.state.update(|s| s.loading = true);

        match self.backend.get_session().await {
            Ok(Some(session)) => {
                info!("Restored backend session");
                self.state.sign_in(session.user);
            }
            Ok(None) => self.state.finish(),
            Err(e) => {
                warn!(error = %e, "Backend session restore failed");
                self.state.fail(e.user_message());
            }
        }

        if !self.listener_registered.swap(true, Ordering::SeqCst) {
            debug!("Registering backend session listener");
            spawn_listener(self.state.clone(), self.backend.subscribe());
        }

        Ok(())
    }

    /// Sign in with `email` and `password` from `options`.
    #[instrument(skip(self, options))]
    pub async fn login(&self, options: &LoginOptions) -> Result<bool> {
        self.state.begin();

        let (Some(email), Some(password)) = (options.get_str("email"), options.get_str("password"))
        else {
            self.state.fail(CREDENTIALS_REQUIRED);
            return Ok(false);
        };

        match self.backend.sign_in_with_password(email, password).await {
            Ok(session) if !session.user.is_null() => {
                self.state.sign_in(session.user);
                Ok(true)
            }
            Ok(_) => {
                warn!("Backend sign in succeeded without a user");
                self.state.fail(NO_USER_RETURNED);
                Ok(false)
            }
            Err(e) => {
                warn!(error = %e, "Backend login failed");
                self.state.fail(e.user_message());
                Ok(false)
            }
        }
    }

    /// Sign out. A backend failure is recorded in state and leaves the
    /// session as it was.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        match self.backend.sign_out().await {
            Ok(()) => self.state.update(|s| {
                s.is_authenticated = false;
                s.user = None;
            }),
            Err(e) => {
                warn!(error = %e, "Backend logout failed");
                let message = e.user_message();
                self.state.update(|s| s.error = Some(message));
            }
        }
        Ok(())
    }
}

fn spawn_listener(state: ProviderState, mut changes: broadcast::Receiver<SessionChange>) {
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(SessionChange::SignedIn(session)) => state.update(|s| {
                    s.is_authenticated = true;
                    s.user = Some(session.user);
                }),
                Ok(SessionChange::SignedOut) => state.update(|s| {
                    s.is_authenticated = false;
                    s.user = None;
                }),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Backend session listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Backend session listener stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use mockall::mock;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    mock! {
        pub Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        data: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl SecureStore for MemoryStore {
        async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
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

    fn rest(http: MockHttp, store: Arc<MemoryStore>) -> RestSessionBackend {
        RestSessionBackend::new("https://project.example.co/", "anon-key", Arc::new(http), store)
    }

    fn stored_session(expires_at: DateTime<Utc>) -> Vec<u8> {
        serde_json::to_vec(&BackendSession {
            access_token: "at".to_string(),
            refresh_token: None,
            expires_at,
            user: json!({"email": "old@example.com"}),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_sign_in_posts_password_grant_and_persists() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| {
                req.url == "https://project.example.co/auth/v1/token?grant_type=password"
                    && req.method == HttpMethod::Post
                    && req.headers.get("apikey").map(String::as_str) == Some("anon-key")
            })
            .times(1)
            .returning(|_| {
                Ok(HttpResponse::new(
                    200,
                    r#"{"access_token":"at","refresh_token":"rt","expires_in":3600,"user":{"email":"a@b.co"}}"#,
                ))
            });

        let store = Arc::new(MemoryStore::default());
        let backend = rest(http, store.clone());

        let session = backend
            .sign_in_with_password("a@b.co", "secret")
            .await
            .unwrap();

        assert_eq!(session.user["email"], "a@b.co");
        assert!(store.get_secret(SESSION_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sign_in_reports_backend_message() {
        let mut http = MockHttp::new();
        http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse::new(
                400,
                r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
            ))
        });

        let backend = rest(http, Arc::new(MemoryStore::default()));
        let err = backend
            .sign_in_with_password("a@b.co", "wrong")
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), "Invalid login credentials");
    }

    #[tokio::test]
    async fn test_get_session_without_stored_session_skips_network() {
        let mut http = MockHttp::new();
        http.expect_execute().never();

        let backend = rest(http, Arc::new(MemoryStore::default()));
        assert!(backend.get_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_session_refreshes_user() {
        let store = Arc::new(MemoryStore::default());
        store
            .set_secret(SESSION_KEY, &stored_session(Utc::now() + Duration::hours(1)))
            .await
            .unwrap();

        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| {
                req.url.ends_with("/auth/v1/user")
                    && req.headers.get("Authorization").map(String::as_str) == Some("Bearer at")
            })
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, r#"{"email":"new@example.com"}"#)));

        let session = rest(http, store).get_session().await.unwrap().unwrap();
        assert_eq!(session.user["email"], "new@example.com");
    }

    #[tokio::test]
    async fn test_get_session_revoked_announces_sign_out() {
        let store = Arc::new(MemoryStore::default());
        store
            .set_secret(SESSION_KEY, &stored_session(Utc::now() + Duration::hours(1)))
            .await
            .unwrap();

        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(401, "{}")));

        let backend = rest(http, store.clone());
        let mut changes = backend.subscribe();

        assert!(backend.get_session().await.unwrap().is_none());
        assert!(matches!(changes.try_recv(), Ok(SessionChange::SignedOut)));
        assert!(store.get_secret(SESSION_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_session_expired_is_dropped() {
        let store = Arc::new(MemoryStore::default());
        store
            .set_secret(SESSION_KEY, &stored_session(Utc::now() - Duration::minutes(1)))
            .await
            .unwrap();

        let mut http = MockHttp::new();
        http.expect_execute().never();

        assert!(rest(http, store.clone()).get_session().await.unwrap().is_none());
        assert!(store.get_secret(SESSION_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_network_error_still_forgets_session() {
        let store = Arc::new(MemoryStore::default());
        store
            .set_secret(SESSION_KEY, &stored_session(Utc::now() + Duration::hours(1)))
            .await
            .unwrap();

        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Err(BridgeError::OperationFailed("offline".to_string())));

        let result = rest(http, store.clone()).sign_out().await;
        assert!(matches!(result, Err(AuthError::NetworkError(_))));
        assert!(store.get_secret(SESSION_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_provider_login_requires_email_and_password() {
        let mut http = MockHttp::new();
        http.expect_execute().never();
        let provider = BackendProvider::new(Arc::new(rest(http, Arc::new(MemoryStore::default()))));

        let options = LoginOptions::new().with("email", "a@b.co");
        assert!(!provider.login(&options).await.unwrap());
        assert_eq!(
            provider.state().error.as_deref(),
            Some("Email and password are required")
        );
        assert!(!provider.state().loading);
    }

    #[tokio::test]
    async fn test_provider_login_without_user_records_error() {
        let mut http = MockHttp::new();
        http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse::new(
                200,
                r#"{"access_token":"at","expires_in":3600,"user":null}"#,
            ))
        });
        let provider = BackendProvider::new(Arc::new(rest(http, Arc::new(MemoryStore::default()))));

        let options = LoginOptions::new()
            .with("email", "a@b.co")
            .with("password", "secret");
        assert!(!provider.login(&options).await.unwrap());

        let state = provider.state();
        assert!(!state.is_authenticated);
        assert!(!state.loading);
        assert_eq!(state.error.as_deref(), Some("Sign in returned no user"));
    }

    #[tokio::test]
    async fn test_provider_session_change_updates_state() {
        let mut http = MockHttp::new();
        http.expect_execute().never();
        let backend = Arc::new(rest(http, Arc::new(MemoryStore::default())));
        let provider = BackendProvider::new(backend.clone());

        provider.initialize().await.unwrap();
        assert!(provider.listener_registered());

        let mut state_rx = provider.subscribe();
        backend
            .changes
            .send(SessionChange::SignedIn(BackendSession {
                access_token: "at".to_string(),
                refresh_token: None,
                expires_at: Utc::now() + Duration::hours(1),
                user: json!({"email": "a@b.co"}),
            }))
            .unwrap();

        state_rx.changed().await.unwrap();
        let state = state_rx.borrow_and_update().clone();
        assert!(state.is_authenticated);
        assert_eq!(state.user, Some(json!({"email": "a@b.co"})));
    }
}
