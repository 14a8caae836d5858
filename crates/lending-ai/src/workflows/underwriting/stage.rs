use async_trait::async_trait;

use super::domain::{StageOutput, ThreadId};
use super::state::ApplicationState;

/// Analysis seam for one workflow stage so the engine can be exercised with
/// test doubles. Implementations receive the full current state and return a
/// uniform output; they never mutate state or decide routing themselves.
#[async_trait]
pub trait StageCollaborator: Send + Sync {
    async fn execute(
        &self,
        thread_id: &ThreadId,
        state: &ApplicationState,
    ) -> Result<StageOutput, StageError>;
}

/// Collaborator failure, split by whether a retry can help.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StageError {
    #[error("transient stage failure: {0}")]
    Transient(String),
    #[error("fatal stage failure: {0}")]
    Fatal(String),
}

impl StageError {
    pub const fn is_transient(&self) -> bool {
        matches!(self, StageError::Transient(_))
    }
}
