use pairsort_core::{CoreError, GroupId, ItemId};
use pairsort_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("corrupt state: ranked order references missing group {group_id} at index {index}")]
    CorruptState { group_id: String, index: i64 },

    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("unknown item: {0}")]
    UnknownItem(ItemId),
}

impl EngineError {
    pub(crate) fn corrupt(group_id: Option<GroupId>, index: i64) -> Self {
        EngineError::CorruptState {
            group_id: group_id.map_or_else(|| "<none>".to_string(), |g| g.to_string()),
            index,
        }
    }
}
