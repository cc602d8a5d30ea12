//! Durable write of a finished turn.

use async_trait::async_trait;
use uuid::Uuid;

use askdb_core::types::MessagePatch;
use askdb_storage::MessageRepository;

use crate::error::ChatError;

/// Store receiving the final state of a turn's assistant half.
#[async_trait]
pub trait TurnStore: Send + Sync {
    /// Write the non-empty parts of a turn into its pre-created assistant half.
    async fn finalize(&self, message_id: Uuid, patch: MessagePatch) -> Result<(), ChatError>;
}

#[async_trait]
impl TurnStore for MessageRepository {
    async fn finalize(&self, message_id: Uuid, patch: MessagePatch) -> Result<(), ChatError> {
        let repo = self.clone();
        let updated = tokio::task::spawn_blocking(move || repo.update_fields(message_id, &patch))
            .await
            .map_err(|e| ChatError::Persistence(e.to_string()))?
            .map_err(|e| ChatError::Persistence(e.to_string()))?;

        if updated {
            Ok(())
        } else {
            Err(ChatError::Persistence(format!(
                "assistant message {} no longer exists",
                message_id
            )))
        }
    }
}
