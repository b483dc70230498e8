//! Switchboard umbrella crate.
//!
//! Re-exports the public API of the workspace crates so host applications
//! can depend on `switchboard` alone. The `desktop-shims` feature (on by
//! default) wires the desktop bridges (keyring, SQLite settings, reqwest)
//! in as defaults for [`HostBridges`](runtime::HostBridges).

pub use bridge_traits as bridges;
pub use core_auth as auth;
pub use core_runtime as runtime;

pub use core_auth::{
    AuthError, AuthFacade, AuthState, AuthStateView, FacadePhase, LoginOptions, ProviderKind,
};
pub use core_runtime::{AuthConfig, AuthEvent, HostBridges};
