use crate::error::{AppError, Result};
use crate::storage::FollowRepo;
use std::sync::Arc;
use uuid::Uuid;

/// Follow-graph-based authorization for first-time conversation creation.
///
/// Consulted once, before a conversation is created; existing conversations
/// are never re-checked. Once permitted, a pair stays permitted even if the
/// follow edge is later removed.
#[derive(Clone)]
pub struct PermissionGate {
    follows: Arc<dyn FollowRepo>,
}

impl PermissionGate {
    #[must_use]
    pub fn new(follows: Arc<dyn FollowRepo>) -> Self {
        Self { follows }
    }

    /// Allows messaging iff a follow edge exists in either direction.
    ///
    /// # Errors
    /// Returns `AppError::NotPermitted` with a human-readable reason when no
    /// edge exists, `AppError::Store` if the follow graph cannot be read.
    #[tracing::instrument(err(level = "debug"), skip(self), fields(actor = %actor, recipient = %recipient))]
    pub async fn can_message(&self, actor: Uuid, recipient: Uuid) -> Result<()> {
        if self.follows.edge_exists(actor, recipient).await? {
            Ok(())
        } else {
            Err(AppError::NotPermitted(
                "you can only message people you follow or who follow you".to_string(),
            ))
        }
    }
}

impl std::fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionGate").finish_non_exhaustive()
    }
}
