//! Identity attribution for requests and records.
//!
//! Credential handling lives outside the engine; what flows through here is
//! only the resolved identity a request should be attributed to.

use uuid::Uuid;

/// The identity a request is attributed to.
///
/// Anonymous identities are device-scoped user ids minted before sign-in;
/// the merge operation folds one into an authenticated identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Authenticated(Uuid),
    Anonymous(Uuid),
}

impl Identity {
    pub fn user_id(&self) -> Uuid {
        match self {
            Identity::Authenticated(id) | Identity::Anonymous(id) => *id,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::Authenticated(_))
    }
}
