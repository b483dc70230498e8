use thiserror::Error;

/// Errors surfaced by the authentication facade, the registry and the
/// identity providers.
///
/// Only structural failures (unknown provider, provider that cannot be
/// loaded, broken configuration) reach callers of the facade as `Err`.
/// Domain failures such as wrong credentials are recorded in the provider's
/// [`AuthState::error`](crate::AuthState) and `login` resolves to `false`.
///
/// The type is `Clone` so that one failed lazy load can be handed to every
/// caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Failed to load provider {provider}: {reason}")]
    ProviderLoad { provider: String, reason: String },

    #[error("Provider {provider} authentication failed: {reason}")]
    AuthenticationFailed { provider: String, reason: String },

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    /// OAuth callback state does not match the pending authorization
    #[error("Authorization state mismatch")]
    StateMismatch { expected: String, actual: String },

    #[error("No authorization in progress")]
    NoAuthorizationInProgress,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

impl AuthError {
    pub fn provider_load(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        AuthError::ProviderLoad {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Message suitable for a provider's `error` field.
    ///
    /// Authentication failures report the backend's own reason without the
    /// provider prefix.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::AuthenticationFailed { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }
}

impl From<core_runtime::Error> for AuthError {
    fn from(err: core_runtime::Error) -> Self {
        AuthError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
