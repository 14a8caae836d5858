use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::domain::ThreadId;
use super::state::ApplicationState;

/// Durable checkpoint storage keyed by thread id.
///
/// `save` is a compare-and-swap: the write commits only when the stored
/// version equals the attempted version minus one (or no record exists and
/// the attempted state is the initial version-zero snapshot). Implementations
/// must make that check and the write atomic.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, state: &ApplicationState) -> Result<(), CheckpointError>;

    async fn load(&self, thread_id: &ThreadId) -> Result<Option<ApplicationState>, CheckpointError>;

    /// Thread ids of non-terminal workflows not updated since `cutoff`, used
    /// by the recovery sweep after a process restart.
    async fn stalled_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<ThreadId>, CheckpointError>;
}

/// Error enumeration for checkpoint storage failures.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("version conflict: stored {stored}, attempted {attempted}")]
    VersionConflict { stored: u64, attempted: u64 },
    #[error("checkpoint store unavailable: {0}")]
    Unavailable(String),
}
