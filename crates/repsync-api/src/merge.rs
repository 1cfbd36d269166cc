//! Server-side half of the account merge.

use std::sync::Arc;

use uuid::Uuid;

use repsync_core::{SyncError, SyncResult};

use crate::projections::ProjectionRebuilder;
use crate::store::EventLog;

/// Folds an anonymous identity's logged events into an authenticated one and
/// refreshes that user's read models.
pub struct MergeService {
    log: Arc<dyn EventLog>,
    rebuilder: Arc<ProjectionRebuilder>,
}

impl MergeService {
    pub fn new(log: Arc<dyn EventLog>, rebuilder: Arc<ProjectionRebuilder>) -> Self {
        Self { log, rebuilder }
    }

    /// Reattribute every event owned by `anonymous_user_id` to
    /// `authenticated_user_id`, then rebuild the target's projections.
    ///
    /// Ordering survives untouched: only `user_id` changes, never
    /// `device_id` or `sequence_number`. Overlapping device sequences on the
    /// target surface as [`SyncError::MergeConflict`].
    pub async fn merge(
        &self,
        anonymous_user_id: Uuid,
        authenticated_user_id: Uuid,
    ) -> SyncResult<usize> {
        if anonymous_user_id == authenticated_user_id {
            return Err(SyncError::ValidationRejected {
                message: "cannot merge an identity into itself".to_string(),
            });
        }

        let merged = self
            .log
            .merge_user(anonymous_user_id, authenticated_user_id)
            .await?;

        self.rebuilder
            .rebuild(Some(authenticated_user_id))
            .await?;

        tracing::info!(
            %anonymous_user_id,
            %authenticated_user_id,
            merged,
            "merged anonymous identity"
        );
        Ok(merged)
    }
}
