use crate::types::AuthState;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

/// Observable [`AuthState`] cell shared by a provider and its listeners.
///
/// Reads never block and never fail; writers publish through
/// `watch::Sender::send_modify`, so subscribers see every committed change.
#[derive(Clone)]
pub struct ProviderState {
    tx: Arc<watch::Sender<AuthState>>,
}

impl ProviderState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    pub fn update(&self, f: impl FnOnce(&mut AuthState)) {
        self.tx.send_modify(f);
    }

    /// Mark an operation in flight and clear the previous error.
    pub fn begin(&self) {
        self.update(|s| {
            s.loading = true;
            s.error = None;
        });
    }

    pub fn sign_in(&self, user: Value) {
        self.tx.send_replace(AuthState::signed_in(user));
    }

    pub fn sign_out(&self) {
        self.tx.send_replace(AuthState::default());
    }

    /// Record a failure and end the operation.
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| {
            s.loading = false;
            s.error = Some(message);
        });
    }

    pub fn finish(&self) {
        self.update(|s| s.loading = false);
    }
}

impl Default for ProviderState {
    fn default() -> Self {
        Self::new()
    }
}
