pub mod error;
pub mod field_value;
pub mod groups;
pub mod ids;
pub mod item;
pub mod session;
pub mod state;

pub use error::CoreError;
pub use field_value::FieldValue;
pub use groups::GroupRegistry;
pub use ids::*;
pub use item::{Item, ItemStore};
pub use session::PersistedSession;
pub use state::{Choice, DecisionTag, HistoryEntry, SearchBounds, Snapshot, SortState};
