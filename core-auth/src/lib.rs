//! # Authentication Module
//!
//! Runtime-switchable authentication facade over pluggable identity
//! providers.
//!
//! ## Overview
//!
//! The application talks to one [`AuthFacade`]. It selects a provider by id,
//! loads that provider's adapter lazily through the [`AdapterRegistry`], and
//! exposes a single [`AuthStateView`] regardless of which provider is active.
//!
//! ## Providers
//!
//! - **delegated**: hosted OAuth/OIDC login, authorization code + PKCE
//! - **local**: one configured username/password pair
//! - **backend**: hosted backend-as-a-service email/password sessions
//!
//! ## Features
//!
//! - Lazy, single-flight provider loading with permanent caching
//! - Retry after a failed load
//! - Session restore through platform secure and settings stores
//! - Auth lifecycle events on the shared [`EventBus`](core_runtime::EventBus)

pub mod adapter;
pub mod error;
pub mod facade;
pub mod oauth;
pub mod providers;
pub mod registry;
pub mod token_store;
pub mod types;

pub use adapter::ProviderAdapter;
pub use error::{AuthError, Result};
pub use facade::{AuthFacade, AuthFacadeBuilder};
pub use oauth::{OAuthConfig, OAuthFlowManager, PkceVerifier};
pub use providers::{RedirectHandler, SessionBackend, SessionChange};
pub use registry::{AdapterRegistry, DefaultProviderLoader, ProviderLoader};
pub use token_store::{StoredSession, TokenStore};
pub use types::{
    AuthState, AuthStateView, FacadePhase, LoginOptions, OAuthTokens, ProviderKind,
};
