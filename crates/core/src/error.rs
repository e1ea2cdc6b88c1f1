use thiserror::Error;

use crate::ids::ItemId;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("duplicate item id: {0}")]
    DuplicateItem(ItemId),

    #[error("unknown item: {0}")]
    UnknownItem(ItemId),

    #[error("invalid data: {0}")]
    InvalidData(String),
}
