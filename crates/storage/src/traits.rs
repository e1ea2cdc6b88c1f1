use pairsort_core::{PersistedSession, ids::*};

use crate::error::StorageError;

pub const DEFAULT_BACKUP_KEEP: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageConfig {
    /// Backups retained per session after `create_backup` prunes.
    pub backup_keep: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backup_keep: DEFAULT_BACKUP_KEEP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub size_bytes: usize,
    pub saved_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub backup_id: BackupId,
    pub session_id: SessionId,
    pub size_bytes: usize,
    pub created_at_ms: i64,
}

/// Key-value persistence for ranking sessions. The store never decides when
/// to save; callers do.
pub trait SessionStore {
    fn save_session(
        &mut self,
        session_id: SessionId,
        session: &PersistedSession,
    ) -> Result<(), StorageError>;

    fn load_session(&self, session_id: SessionId) -> Result<Option<PersistedSession>, StorageError>;

    /// Returns whether a session was actually deleted. Backups are kept.
    fn delete_session(&mut self, session_id: SessionId) -> Result<bool, StorageError>;

    fn has_session(&self, session_id: SessionId) -> Result<bool, StorageError>;

    fn session_info(&self, session_id: SessionId) -> Result<Option<SessionInfo>, StorageError>;

    fn list_sessions(&self) -> Result<Vec<SessionInfo>, StorageError>;

    /// Copy the currently saved blob aside. `None` if nothing is saved yet.
    fn create_backup(&mut self, session_id: SessionId) -> Result<Option<BackupId>, StorageError>;

    /// Newest first.
    fn list_backups(&self, session_id: SessionId) -> Result<Vec<BackupRecord>, StorageError>;

    fn load_backup(&self, backup_id: BackupId) -> Result<Option<PersistedSession>, StorageError>;

    /// Overwrite the live session with a backup's contents.
    fn restore_backup(&mut self, backup_id: BackupId) -> Result<SessionId, StorageError>;

    /// Delete all but the `keep` newest backups. Returns how many were removed.
    fn prune_backups(&mut self, session_id: SessionId, keep: usize) -> Result<usize, StorageError>;
}
