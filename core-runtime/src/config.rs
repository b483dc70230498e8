//! # Authentication Configuration
//!
//! Read-only configuration for the authentication facade and its providers.
//!
//! ## Overview
//!
//! [`AuthConfig`] carries the default provider id plus the per-provider
//! settings (local credential pair, backend endpoint and key, delegated OAuth
//! tenant). It is built either with [`AuthConfig::builder`] or loaded from the
//! process environment with [`AuthConfig::from_env`]. Missing provider
//! settings are not an error here: a provider whose settings are incomplete
//! fails when it is first loaded, so an application configured for one
//! provider never pays for the others.
//!
//! ## Environment Variables
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `DEFAULT_AUTH_PROVIDER` | default provider id | delegated |
//! | `BASIC_AUTH_USERNAME` / `BASIC_AUTH_PASSWORD` | local credential pair | `admin` / `password` |
//! | `SUPABASE_URL` / `SUPABASE_ANON_KEY` | backend endpoint and key | unset |
//! | `AUTH0_DOMAIN` / `AUTH0_CLIENT_ID` | delegated tenant | unset |
//! | `AUTH0_CLIENT_SECRET` / `AUTH0_AUDIENCE` | delegated extras | unset |
//! | `AUTH0_REDIRECT_URI` | delegated callback | `http://localhost:8080/callback` |
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::AuthConfig;
//!
//! let config = AuthConfig::builder()
//!     .default_provider("local")
//!     .local_credentials("admin", "s3cret")
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.default_provider.as_deref(), Some("local"));
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{Clock, HttpClient, SecureStore, SettingsStore, SystemClock};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use url::Url;

pub const ENV_DEFAULT_PROVIDER: &str = "DEFAULT_AUTH_PROVIDER";
pub const ENV_BASIC_USERNAME: &str = "BASIC_AUTH_USERNAME";
pub const ENV_BASIC_PASSWORD: &str = "BASIC_AUTH_PASSWORD";
pub const ENV_BACKEND_URL: &str = "SUPABASE_URL";
pub const ENV_BACKEND_ANON_KEY: &str = "SUPABASE_ANON_KEY";
pub const ENV_DELEGATED_DOMAIN: &str = "AUTH0_DOMAIN";
pub const ENV_DELEGATED_CLIENT_ID: &str = "AUTH0_CLIENT_ID";
pub const ENV_DELEGATED_CLIENT_SECRET: &str = "AUTH0_CLIENT_SECRET";
pub const ENV_DELEGATED_REDIRECT_URI: &str = "AUTH0_REDIRECT_URI";
pub const ENV_DELEGATED_AUDIENCE: &str = "AUTH0_AUDIENCE";

pub const DEFAULT_LOCAL_USERNAME: &str = "admin";
pub const DEFAULT_LOCAL_PASSWORD: &str = "password";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/callback";

/// Credential pair checked by the local provider.
#[derive(Clone, PartialEq, Eq)]
pub struct LocalCredentials {
    pub username: String,
    pub password: String,
}

impl Default for LocalCredentials {
    fn default() -> Self {
        Self {
            username: DEFAULT_LOCAL_USERNAME.to_string(),
            password: DEFAULT_LOCAL_PASSWORD.to_string(),
        }
    }
}

impl fmt::Debug for LocalCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Hosted backend endpoint.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BackendConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
}

impl BackendConfig {
    /// Both the URL and the key are present and non-empty.
    pub fn is_configured(&self) -> bool {
        non_empty(&self.url) && non_empty(&self.anon_key)
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("anon_key", &self.anon_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Delegated OAuth/OIDC tenant.
#[derive(Clone, PartialEq, Eq)]
pub struct DelegatedConfig {
    /// Tenant domain, e.g. `tenant.eu.auth0.com` (no scheme)
    pub domain: Option<String>,
    pub client_id: Option<String>,
    /// Only needed for confidential clients
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub audience: Option<String>,
    pub scopes: Vec<String>,
}

impl Default for DelegatedConfig {
    fn default() -> Self {
        Self {
            domain: None,
            client_id: None,
            client_secret: None,
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            audience: None,
            scopes: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
            ],
        }
    }
}

impl DelegatedConfig {
    /// Domain and client id are present and non-empty.
    pub fn is_configured(&self) -> bool {
        non_empty(&self.domain) && non_empty(&self.client_id)
    }
}

impl fmt::Debug for DelegatedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedConfig")
            .field("domain", &self.domain)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("audience", &self.audience)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Configuration for the authentication facade.
///
/// Use [`AuthConfig::builder`] or [`AuthConfig::from_env`] to construct it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Raw default provider id; parsed (with fallback) by the facade
    pub default_provider: Option<String>,
    pub local: LocalCredentials,
    pub backend: BackendConfig,
    pub delegated: DelegatedConfig,
    /// Capacity of the auth event bus
    pub event_buffer_size: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            default_provider: None,
            local: LocalCredentials::default(),
            backend: BackendConfig::default(),
            delegated: DelegatedConfig::default(),
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl AuthConfig {
    /// Creates a new builder for constructing an `AuthConfig`.
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }

    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a present value is malformed (for
    /// example a backend URL that does not parse).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    ///
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut builder = Self::builder();

        if let Some(provider) = get(ENV_DEFAULT_PROVIDER) {
            builder = builder.default_provider(provider);
        }

        let local = LocalCredentials::default();
        builder = builder.local_credentials(
            get(ENV_BASIC_USERNAME).unwrap_or(local.username),
            get(ENV_BASIC_PASSWORD).unwrap_or(local.password),
        );

        builder.backend = BackendConfig {
            url: get(ENV_BACKEND_URL),
            anon_key: get(ENV_BACKEND_ANON_KEY),
        };

        let delegated = DelegatedConfig {
            domain: get(ENV_DELEGATED_DOMAIN),
            client_id: get(ENV_DELEGATED_CLIENT_ID),
            client_secret: get(ENV_DELEGATED_CLIENT_SECRET),
            redirect_uri: get(ENV_DELEGATED_REDIRECT_URI)
                .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
            audience: get(ENV_DELEGATED_AUDIENCE),
            ..DelegatedConfig::default()
        };
        builder.delegated = delegated;

        let config = builder.build()?;
        debug!(
            default_provider = ?config.default_provider,
            backend_configured = config.backend.is_configured(),
            delegated_configured = config.delegated.is_configured(),
            "Loaded auth configuration"
        );
        Ok(config)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Event buffer size is > 0
    /// - Local username is not empty
    /// - Backend URL, when present, is an absolute http(s) URL
    /// - Delegated redirect URI is an absolute URL
    /// - Delegated domain, when present, carries no scheme
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.local.username.trim().is_empty() {
            return Err(Error::Config(
                "Local provider username cannot be empty".to_string(),
            ));
        }

        if let Some(url) = self.backend.url.as_deref() {
            let parsed = Url::parse(url)
                .map_err(|e| Error::Config(format!("Invalid backend URL '{}': {}", url, e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::Config(format!(
                    "Backend URL must use http or https, got '{}'",
                    parsed.scheme()
                )));
            }
        }

        Url::parse(&self.delegated.redirect_uri).map_err(|e| {
            Error::Config(format!(
                "Invalid redirect URI '{}': {}",
                self.delegated.redirect_uri, e
            ))
        })?;

        if let Some(domain) = self.delegated.domain.as_deref() {
            if domain.contains("://") {
                return Err(Error::Config(format!(
                    "Delegated domain must be a bare host, got '{}'",
                    domain
                )));
            }
        }

        Ok(())
    }
}

/// Builder for constructing [`AuthConfig`] instances.
#[derive(Default)]
pub struct AuthConfigBuilder {
    default_provider: Option<String>,
    local: Option<LocalCredentials>,
    backend: BackendConfig,
    delegated: DelegatedConfig,
    event_buffer_size: Option<usize>,
}

impl AuthConfigBuilder {
    /// Sets the provider id selected at startup.
    pub fn default_provider(mut self, provider: impl Into<String>) -> Self {
        self.default_provider = Some(provider.into());
        self
    }

    /// Sets the credential pair accepted by the local provider.
    pub fn local_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.local = Some(LocalCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Sets the hosted backend endpoint and its public key.
    pub fn backend(mut self, url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        self.backend = BackendConfig {
            url: Some(url.into()),
            anon_key: Some(anon_key.into()),
        };
        self
    }

    /// Sets the delegated tenant domain and client id.
    pub fn delegated(mut self, domain: impl Into<String>, client_id: impl Into<String>) -> Self {
        self.delegated.domain = Some(domain.into());
        self.delegated.client_id = Some(client_id.into());
        self
    }

    pub fn delegated_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.delegated.client_secret = Some(secret.into());
        self
    }

    pub fn delegated_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.delegated.redirect_uri = uri.into();
        self
    }

    pub fn delegated_audience(mut self, audience: impl Into<String>) -> Self {
        self.delegated.audience = Some(audience.into());
        self
    }

    pub fn delegated_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.delegated.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if validation fails.
    pub fn build(self) -> Result<AuthConfig> {
        let config = AuthConfig {
            default_provider: self.default_provider,
            local: self.local.unwrap_or_default(),
            backend: self.backend,
            delegated: self.delegated,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Platform bridges the providers run on.
///
/// `SecureStore` and `SettingsStore` are required. `HttpClient` is only
/// needed by the network-backed providers, so its absence surfaces when
/// such a provider is loaded. The clock defaults to [`SystemClock`].
///
/// With the `desktop-shims` feature, missing stores and HTTP client fall back
/// to the `bridge-desktop` implementations.
#[derive(Clone)]
pub struct HostBridges {
    pub http_client: Option<Arc<dyn HttpClient>>,
    pub secure_store: Arc<dyn SecureStore>,
    pub settings_store: Arc<dyn SettingsStore>,
    pub clock: Arc<dyn Clock>,
}

impl fmt::Debug for HostBridges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBridges")
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field("secure_store", &"SecureStore { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field("clock", &"Clock { ... }")
            .finish()
    }
}

impl HostBridges {
    pub fn builder() -> HostBridgesBuilder {
        HostBridgesBuilder::default()
    }

    /// The HTTP client, or a `CapabilityMissing` error naming `required_by`.
    pub fn require_http(&self, required_by: &str) -> Result<Arc<dyn HttpClient>> {
        self.http_client.clone().ok_or_else(|| Error::CapabilityMissing {
            capability: "HttpClient".to_string(),
            message: format!(
                "HttpClient implementation is required by the {} provider. \
                 Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Otherwise inject a platform HTTP client.",
                required_by
            ),
        })
    }
}

/// Builder for [`HostBridges`].
#[derive(Default)]
pub struct HostBridgesBuilder {
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    clock: Option<Arc<dyn Clock>>,
}

impl HostBridgesBuilder {
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the bridge set, filling platform defaults where available.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapabilityMissing`] when a required store is absent
    /// and no default exists for this build.
    pub async fn build(self) -> Result<HostBridges> {
        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store().await?,
        };

        let http_client = match self.http_client {
            Some(client) => Some(client),
            None => provide_default_http_client()?,
        };

        Ok(HostBridges {
            http_client,
            secure_store,
            settings_store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Ok(Arc::new(bridge_desktop::KeyringSecureStore::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(Error::CapabilityMissing {
        capability: "SecureStore".to_string(),
        message: "SecureStore implementation is required for session persistence. \
                 Desktop: enable the 'desktop-shims' feature to use KeyringSecureStore. \
                 Mobile: inject platform-native secure storage (Keychain/Keystore)."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
async fn provide_default_settings_store() -> Result<Arc<dyn SettingsStore>> {
    let store = bridge_desktop::SqliteSettingsStore::open_default()
        .await
        .map_err(|e| {
            Error::Internal(format!("Failed to initialize default SettingsStore: {}", e))
        })?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "desktop-shims"))]
async fn provide_default_settings_store() -> Result<Arc<dyn SettingsStore>> {
    Err(Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "SettingsStore implementation is required for local sessions. \
                 Desktop: enable the 'desktop-shims' feature to use SqliteSettingsStore. \
                 Web: inject a localStorage-based settings store."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Option<Arc<dyn HttpClient>>> {
    let client = bridge_desktop::ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to initialize HttpClient: {}", e)))?;
    Ok(Some(Arc::new(client)))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Option<Arc<dyn HttpClient>>> {
    Ok(None)
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}
