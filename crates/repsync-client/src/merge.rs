//! Client-side half of the account merge.
//!
//! Order matters: the local queue is reattributed first so that anything
//! still staged syncs under the authenticated identity, then the server is
//! asked to fold the anonymous identity's logged events. Sequencing is
//! untouched throughout - only ownership changes.

use std::sync::Arc;

use uuid::Uuid;

use repsync_core::SyncResult;

use crate::auth::{AuthState, AuthStateChannel};
use crate::coordinator::SyncCoordinator;
use crate::queue::EventQueue;
use crate::transport::SyncTransport;

/// Summary of a completed merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Queue rows reattributed locally.
    pub queue_rows_rewritten: usize,
    /// Logged events reattributed server-side.
    pub merged_event_count: usize,
}

pub struct AccountMerge {
    queue: Arc<dyn EventQueue>,
    coordinator: Arc<SyncCoordinator>,
    transport: Arc<dyn SyncTransport>,
    auth: Arc<AuthStateChannel>,
}

impl AccountMerge {
    pub fn new(
        queue: Arc<dyn EventQueue>,
        coordinator: Arc<SyncCoordinator>,
        transport: Arc<dyn SyncTransport>,
        auth: Arc<AuthStateChannel>,
    ) -> Self {
        Self {
            queue,
            coordinator,
            transport,
            auth,
        }
    }

    /// Fold `anonymous_user_id` into `authenticated_user_id`.
    ///
    /// On success the anonymous identity is discarded: the auth channel
    /// publishes the authenticated state and nothing local refers to the old
    /// id any more.
    pub async fn merge(
        &self,
        device_id: Uuid,
        anonymous_user_id: Uuid,
        authenticated_user_id: Uuid,
    ) -> SyncResult<MergeOutcome> {
        let queue_rows_rewritten = self
            .queue
            .rewrite_user_id(anonymous_user_id, authenticated_user_id)
            .await?;
        self.queue.reset_failed(Some(authenticated_user_id)).await?;

        // Flush whatever is still staged under the new identity before the
        // server-side rewrite, so the log ends up wholly owned by it.
        let outcome = self
            .coordinator
            .sync(device_id, authenticated_user_id)
            .await?;
        tracing::info!(
            synced = outcome.synced,
            "pre-merge sync under authenticated identity"
        );

        let merged_event_count = self
            .transport
            .merge_user(authenticated_user_id, anonymous_user_id)
            .await?;

        self.auth.publish(AuthState::authenticated(
            authenticated_user_id,
            device_id,
        ));

        tracing::info!(
            %anonymous_user_id,
            %authenticated_user_id,
            merged_event_count,
            "account merge completed"
        );
        Ok(MergeOutcome {
            queue_rows_rewritten,
            merged_event_count,
        })
    }
}
