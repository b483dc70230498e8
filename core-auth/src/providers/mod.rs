//! Identity provider implementations.
//!
//! Each provider owns its [`AuthState`](crate::AuthState) in a
//! [`ProviderState`] cell and exposes `initialize`, `login` and `logout`
//! with provider-specific signatures. [`ProviderAdapter`](crate::ProviderAdapter)
//! normalises them behind one contract.

pub mod backend;
pub mod delegated;
pub mod local;
mod state;

pub use backend::{BackendProvider, BackendSession, RestSessionBackend, SessionBackend, SessionChange};
pub use delegated::{DelegatedProvider, LogRedirectHandler, RedirectHandler};
pub use local::LocalProvider;
pub use state::ProviderState;
