//! # Host Bridge Traits
//!
//! Narrow I/O contracts consumed by the authentication core.
//!
//! ## Overview
//!
//! The facade and its identity providers never touch the network, the OS
//! keychain or local settings directly. Each capability is a trait here and
//! is implemented once per platform (see `bridge-desktop`).
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP used by the delegated and backend providers
//!
//! ### Security & Storage
//! - [`SecureStore`](storage::SecureStore) - Token and session persistence (Keychain/Keystore)
//! - [`SettingsStore`](storage::SettingsStore) - Plain key-value storage (localStorage equivalent)
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Callers in the
//! core map it into their own error taxonomy at the call site.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! behind `Arc` across async tasks.

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{SecureStore, SettingsStore};
pub use time::{Clock, LogLevel, SystemClock};
