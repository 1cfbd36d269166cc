//! Auth-state change subscription.
//!
//! Consumers subscribe and pull state changes from a watch channel instead of
//! registering callbacks; the channel always holds the latest state, so a
//! late subscriber observes the current identity immediately.

use tokio::sync::watch;
use uuid::Uuid;

use repsync_core::Identity;

/// The client's current identity attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthState {
    pub identity: Identity,
    pub device_id: Uuid,
}

impl AuthState {
    pub fn anonymous(user_id: Uuid, device_id: Uuid) -> Self {
        Self {
            identity: Identity::Anonymous(user_id),
            device_id,
        }
    }

    pub fn authenticated(user_id: Uuid, device_id: Uuid) -> Self {
        Self {
            identity: Identity::Authenticated(user_id),
            device_id,
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.identity.user_id()
    }
}

/// Publisher side of the auth-state stream.
pub struct AuthStateChannel {
    tx: watch::Sender<AuthState>,
}

impl AuthStateChannel {
    pub fn new(initial: AuthState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// A receiver that yields the current state and every later change.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> AuthState {
        *self.tx.borrow()
    }

    pub fn publish(&self, state: AuthState) {
        tracing::info!(
            user_id = %state.user_id(),
            authenticated = state.identity.is_authenticated(),
            "auth state changed"
        );
        // send_replace updates the retained value even with no live
        // receivers, so future subscribers still see this state.
        self.tx.send_replace(state);
    }
}
