//! # Event Bus System
//!
//! Broadcasts authentication lifecycle events using `tokio::sync::broadcast`,
//! so UI layers and diagnostics can observe the facade without polling it.
//!
//! ## Overview
//!
//! - **AuthEvent**: Strongly-typed lifecycle events (provider switches, lazy
//!   loads, login attempts, sign-outs)
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     emit      ┌───────────┐     subscribe    ┌────────────┐
//! │ Auth Facade ├──────────────>│           ├─────────────────>│ Subscriber │
//! └─────────────┘               │ EventBus  │                  └────────────┘
//! ┌─────────────┐     emit      │ (broadcast│     subscribe    ┌────────────┐
//! │  Registry   ├──────────────>│  channel) ├─────────────────>│ Subscriber │
//! └─────────────┘               └───────────┘                  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(AuthEvent::ProviderLoaded {
//!         provider: "local".to_string(),
//!     })
//!     .ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event.provider(), "local");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Emitting with no subscribers returns an error that publishers ignore.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Authentication Events
// ============================================================================

/// Events emitted by the authentication facade and its registry.
///
/// Provider identifiers are carried in their canonical string form
/// (`"delegated"`, `"local"`, `"backend"`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// The selected provider changed.
    ProviderChanged {
        /// Previously selected provider.
        from: String,
        /// Newly selected provider.
        to: String,
    },
    /// A lazy provider load started.
    ProviderLoading { provider: String },
    /// A provider finished loading and is cached.
    ProviderLoaded { provider: String },
    /// A provider failed to load; a later resolve retries.
    ProviderLoadFailed { provider: String, message: String },
    /// `init_auth` completed for a provider.
    Initialized {
        provider: String,
        is_authenticated: bool,
    },
    /// A login attempt finished.
    LoginAttempted {
        provider: String,
        success: bool,
        attempted_at: DateTime<Utc>,
    },
    /// The user signed out of a provider.
    SignedOut { provider: String },
    /// A provider reported an error in its state.
    AuthError { provider: String, message: String },
}

impl AuthEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            AuthEvent::ProviderChanged { .. } => "Selected provider changed",
            AuthEvent::ProviderLoading { .. } => "Loading provider",
            AuthEvent::ProviderLoaded { .. } => "Provider loaded",
            AuthEvent::ProviderLoadFailed { .. } => "Provider failed to load",
            AuthEvent::Initialized { .. } => "Authentication initialized",
            AuthEvent::LoginAttempted { .. } => "Login attempted",
            AuthEvent::SignedOut { .. } => "Signed out",
            AuthEvent::AuthError { .. } => "Authentication error",
        }
    }

    /// Provider the event concerns. For a switch this is the new selection.
    pub fn provider(&self) -> &str {
        match self {
            AuthEvent::ProviderChanged { to, .. } => to,
            AuthEvent::ProviderLoading { provider }
            | AuthEvent::ProviderLoaded { provider }
            | AuthEvent::ProviderLoadFailed { provider, .. }
            | AuthEvent::Initialized { provider, .. }
            | AuthEvent::LoginAttempted { provider, .. }
            | AuthEvent::SignedOut { provider }
            | AuthEvent::AuthError { provider, .. } => provider,
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            AuthEvent::ProviderLoadFailed { .. } | AuthEvent::AuthError { .. } => {
                EventSeverity::Error
            }
            AuthEvent::LoginAttempted { success: false, .. } => EventSeverity::Warning,
            AuthEvent::LoginAttempted { success: true, .. }
            | AuthEvent::SignedOut { .. }
            | AuthEvent::ProviderChanged { .. } => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus. Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AuthEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: AuthEvent) -> Result<usize, SendError<AuthEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<AuthEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&AuthEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{AuthEvent, EventBus, EventStream, EventSeverity};
///
/// let event_bus = EventBus::new(100);
/// let errors_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| event.severity() >= EventSeverity::Error);
/// ```
pub struct EventStream {
    receiver: Receiver<AuthEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<AuthEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&AuthEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Only events about `provider` will be returned.
    pub fn for_provider(self, provider: impl Into<String>) -> Self {
        let provider = provider.into();
        self.filter(move |event| event.provider() == provider)
    }

    fn matches(&self, event: &AuthEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<AuthEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<AuthEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.matches(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
