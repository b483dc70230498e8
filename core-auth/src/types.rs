use crate::error::AuthError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Supported identity providers.
///
/// The set is closed: every provider the facade can switch to is a variant
/// here, and string identifiers are parsed into it at the boundary.
///
/// # Examples
///
/// ```
/// use core_auth::ProviderKind;
///
/// assert_eq!("local".parse::<ProviderKind>().unwrap(), ProviderKind::Local);
/// assert_eq!("auth0".parse::<ProviderKind>().unwrap(), ProviderKind::Delegated);
/// assert!("okta".parse::<ProviderKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Hosted OAuth/OIDC login (authorization code + PKCE)
    #[default]
    Delegated,
    /// Fixed credential pair checked in-process
    Local,
    /// Hosted backend-as-a-service session API
    Backend,
}

impl ProviderKind {
    /// All providers, in slot order.
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Delegated,
        ProviderKind::Local,
        ProviderKind::Backend,
    ];

    /// Canonical identifier used in configuration, logs and events.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Delegated => "delegated",
            ProviderKind::Local => "local",
            ProviderKind::Backend => "backend",
        }
    }

    /// Human-readable display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Delegated => "Delegated OAuth",
            ProviderKind::Local => "Local Credentials",
            ProviderKind::Backend => "Backend Session",
        }
    }

    /// Parse an identifier, accepting the vendor aliases.
    ///
    /// ```
    /// use core_auth::ProviderKind;
    ///
    /// assert_eq!(ProviderKind::parse("Basic"), Some(ProviderKind::Local));
    /// assert_eq!(ProviderKind::parse("supabase"), Some(ProviderKind::Backend));
    /// assert_eq!(ProviderKind::parse("invalid"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "delegated" | "auth0" | "oauth" => Some(ProviderKind::Delegated),
            "local" | "basic" => Some(ProviderKind::Local),
            "backend" | "supabase" => Some(ProviderKind::Backend),
            _ => None,
        }
    }

    /// Resolve the configured default, falling back to [`ProviderKind::Delegated`]
    /// when unset or unrecognised.
    pub fn from_config(value: Option<&str>) -> Self {
        match value {
            None => ProviderKind::default(),
            Some(raw) => Self::parse(raw).unwrap_or_else(|| {
                warn!(
                    configured = raw,
                    fallback = ProviderKind::default().as_str(),
                    "Unrecognised default provider, falling back"
                );
                ProviderKind::default()
            }),
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            ProviderKind::Delegated => 0,
            ProviderKind::Local => 1,
            ProviderKind::Backend => 2,
        }
    }
}

impl FromStr for ProviderKind {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| AuthError::UnsupportedProvider(s.to_string()))
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live authentication state owned by one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthState {
    pub is_authenticated: bool,
    /// Provider-specific user record
    pub user: Option<Value>,
    pub loading: bool,
    pub error: Option<String>,
}

impl AuthState {
    pub fn signed_in(user: Value) -> Self {
        Self {
            is_authenticated: true,
            user: Some(user),
            loading: false,
            error: None,
        }
    }
}

/// Opaque credential record passed to `login`.
///
/// Each provider reads the fields it understands: `username`/`password`
/// (local), `email`/`password` (backend), `screen_hint`/`login_hint`
/// (delegated). Missing or non-string fields read as absent.
///
/// ```
/// use core_auth::LoginOptions;
///
/// let options = LoginOptions::new()
///     .with("username", "admin")
///     .with("password", "password");
///
/// assert_eq!(options.get_str("username"), Some("admin"));
/// assert_eq!(options.get_str("email"), None);
/// ```
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoginOptions(Map<String, Value>);

impl LoginOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Non-empty string field, if present.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Value> for LoginOptions {
    /// Anything but a JSON object becomes an empty record.
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

// Never print credential values
impl fmt::Debug for LoginOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// Read-only projection of the active provider's state, as seen by callers
/// of the facade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthStateView {
    pub provider: ProviderKind,
    pub is_authenticated: bool,
    pub user: Option<Value>,
    /// A provider module is loading, or the active provider is busy
    pub loading: bool,
    pub error: Option<String>,
    pub last_login_attempt: Option<DateTime<Utc>>,
}

/// Where the facade is with respect to its selected provider.
///
/// ```text
/// NoAdapter --resolve--> Loading --ok--> Ready
///     ^                     |
///     +-------failed--------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FacadePhase {
    /// No adapter is cached for the selected provider
    NoAdapter,
    /// The selected provider's module is being loaded
    Loading,
    /// The selected provider's adapter is cached
    Ready,
}

/// OAuth 2.0 token set returned by the delegated provider.
///
/// # Security
///
/// Tokens should be stored securely and never logged. The `Debug`
/// implementation redacts them.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    /// When the access token expires (UTC)
    pub expires_at: DateTime<Utc>,
}

impl OAuthTokens {
    /// Create a new token set expiring `expires_in` seconds from now.
    pub fn new(access_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            id_token: None,
            refresh_token: None,
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
        }
    }

    /// Expired, or expiring within five minutes.
    pub fn is_expired(&self) -> bool {
        self.is_expired_with_buffer(300)
    }

    pub fn is_expired_with_buffer(&self, buffer_seconds: i64) -> bool {
        Utc::now() >= self.expires_at - chrono::Duration::seconds(buffer_seconds)
    }
}

impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
