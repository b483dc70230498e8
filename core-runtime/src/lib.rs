//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the authentication core:
//! - Logging and tracing infrastructure
//! - Configuration management (provider settings and platform bridges)
//! - Event bus for authentication lifecycle events
//!
//! ## Overview
//!
//! Nothing in this crate knows how a provider authenticates. It holds the
//! read-only inputs (configuration, bridges) and the outputs (events, logs)
//! shared by `core-auth` and the host application.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{AuthConfig, HostBridges};
pub use error::{Error, Result};
pub use events::{AuthEvent, EventBus, EventStream};
