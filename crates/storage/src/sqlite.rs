use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, warn};

use pairsort_core::{PersistedSession, ids::*};

use crate::error::StorageError;
use crate::traits::{BackupRecord, SessionInfo, SessionStore, StorageConfig};

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

fn checksum(payload: &[u8]) -> [u8; 32] {
    *blake3::hash(payload).as_bytes()
}

/// Verify the stored checksum before decoding. A torn or hand-edited blob
/// surfaces as `ChecksumMismatch` rather than a confusing decode error.
fn decode(label: String, payload: Vec<u8>, stored: Vec<u8>) -> Result<PersistedSession, StorageError> {
    let stored = to_array::<32>(stored, "checksum")?;
    if checksum(&payload) != stored {
        warn!(blob = %label, "stored checksum does not match payload");
        return Err(StorageError::ChecksumMismatch(label));
    }
    Ok(PersistedSession::from_msgpack(&payload)?)
}

const NOW_MS: &str = "CAST(unixepoch('now','subsec') * 1000 AS INTEGER)";

pub struct SqliteStorage {
    conn: Connection,
    config: StorageConfig,
}

impl SqliteStorage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn,
            config: StorageConfig::default(),
        })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn,
            config: StorageConfig::default(),
        })
    }

    pub fn with_config(mut self, config: StorageConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn write_session_blob(
        &self,
        session_id: SessionId,
        payload: &[u8],
        sum: &[u8; 32],
    ) -> Result<(), StorageError> {
        self.conn.execute(
            &format!(
                "INSERT INTO sessions (session_id, payload, checksum) VALUES (?1, ?2, ?3)
                 ON CONFLICT (session_id) DO UPDATE SET
                    payload = excluded.payload,
                    checksum = excluded.checksum,
                    saved_at = {NOW_MS}"
            ),
            rusqlite::params![session_id.as_bytes().as_slice(), payload, sum.as_slice()],
        )?;
        Ok(())
    }
}

impl SessionStore for SqliteStorage {
    fn save_session(
        &mut self,
        session_id: SessionId,
        session: &PersistedSession,
    ) -> Result<(), StorageError> {
        let payload = session.to_msgpack()?;
        let sum = checksum(&payload);
        self.write_session_blob(session_id, &payload, &sum)?;
        debug!(%session_id, bytes = payload.len(), "session saved");
        Ok(())
    }

    fn load_session(&self, session_id: SessionId) -> Result<Option<PersistedSession>, StorageError> {
        let row: Option<(Vec<u8>, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT payload, checksum FROM sessions WHERE session_id = ?1",
                rusqlite::params![session_id.as_bytes().as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((payload, sum)) => {
                let session = decode(format!("session {session_id}"), payload, sum)?;
                debug!(%session_id, "session loaded");
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    fn delete_session(&mut self, session_id: SessionId) -> Result<bool, StorageError> {
        let deleted = self.conn.execute(
            "DELETE FROM sessions WHERE session_id = ?1",
            rusqlite::params![session_id.as_bytes().as_slice()],
        )?;
        if deleted > 0 {
            info!(%session_id, "saved session cleared");
        }
        Ok(deleted > 0)
    }

    fn has_session(&self, session_id: SessionId) -> Result<bool, StorageError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM sessions WHERE session_id = ?1",
                rusqlite::params![session_id.as_bytes().as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn session_info(&self, session_id: SessionId) -> Result<Option<SessionInfo>, StorageError> {
        let row: Option<(i64, i64)> = self
            .conn
            .query_row(
                "SELECT length(payload), saved_at FROM sessions WHERE session_id = ?1",
                rusqlite::params![session_id.as_bytes().as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.map(|(size, saved_at_ms)| SessionInfo {
            session_id,
            size_bytes: size as usize,
            saved_at_ms,
        }))
    }

    fn list_sessions(&self) -> Result<Vec<SessionInfo>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, length(payload), saved_at FROM sessions ORDER BY saved_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            let id_bytes: Vec<u8> = row.get(0)?;
            let size: i64 = row.get(1)?;
            let saved_at: i64 = row.get(2)?;
            Ok((id_bytes, size, saved_at))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (id_bytes, size, saved_at_ms) = row?;
            result.push(SessionInfo {
                session_id: SessionId::from_bytes(to_array::<16>(id_bytes, "session_id")?),
                size_bytes: size as usize,
                saved_at_ms,
            });
        }
        Ok(result)
    }

    fn create_backup(&mut self, session_id: SessionId) -> Result<Option<BackupId>, StorageError> {
        let row: Option<(Vec<u8>, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT payload, checksum FROM sessions WHERE session_id = ?1",
                rusqlite::params![session_id.as_bytes().as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((payload, sum)) = row else {
            return Ok(None);
        };

        let backup_id = BackupId::new();
        self.conn.execute(
            "INSERT INTO backups (backup_id, session_id, payload, checksum) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                backup_id.as_bytes().as_slice(),
                session_id.as_bytes().as_slice(),
                payload,
                sum,
            ],
        )?;
        info!(%session_id, %backup_id, "session backup created");

        let keep = self.config.backup_keep;
        self.prune_backups(session_id, keep)?;
        Ok(Some(backup_id))
    }

    fn list_backups(&self, session_id: SessionId) -> Result<Vec<BackupRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT backup_id, length(payload), created_at FROM backups
             WHERE session_id = ?1 ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map(rusqlite::params![session_id.as_bytes().as_slice()], |row| {
            let id_bytes: Vec<u8> = row.get(0)?;
            let size: i64 = row.get(1)?;
            let created_at: i64 = row.get(2)?;
            Ok((id_bytes, size, created_at))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (id_bytes, size, created_at_ms) = row?;
            result.push(BackupRecord {
                backup_id: BackupId::from_bytes(to_array::<16>(id_bytes, "backup_id")?),
                session_id,
                size_bytes: size as usize,
                created_at_ms,
            });
        }
        Ok(result)
    }

    fn load_backup(&self, backup_id: BackupId) -> Result<Option<PersistedSession>, StorageError> {
        let row: Option<(Vec<u8>, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT payload, checksum FROM backups WHERE backup_id = ?1",
                rusqlite::params![backup_id.as_bytes().as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        row.map(|(payload, sum)| decode(format!("backup {backup_id}"), payload, sum))
            .transpose()
    }

    fn restore_backup(&mut self, backup_id: BackupId) -> Result<SessionId, StorageError> {
        let row: Option<(Vec<u8>, Vec<u8>, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT session_id, payload, checksum FROM backups WHERE backup_id = ?1",
                rusqlite::params![backup_id.as_bytes().as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let (id_bytes, payload, sum) =
            row.ok_or_else(|| StorageError::NotFound(format!("backup {backup_id}")))?;
        let session_id = SessionId::from_bytes(to_array::<16>(id_bytes, "session_id")?);

        // Refuse to overwrite the live session with a blob that would not load.
        decode(format!("backup {backup_id}"), payload.clone(), sum.clone())?;
        let sum = to_array::<32>(sum, "checksum")?;
        self.write_session_blob(session_id, &payload, &sum)?;
        info!(%session_id, %backup_id, "session restored from backup");
        Ok(session_id)
    }

    fn prune_backups(&mut self, session_id: SessionId, keep: usize) -> Result<usize, StorageError> {
        let stale: Vec<BackupId> = self
            .list_backups(session_id)?
            .into_iter()
            .skip(keep)
            .map(|b| b.backup_id)
            .collect();
        for backup_id in &stale {
            self.conn.execute(
                "DELETE FROM backups WHERE backup_id = ?1",
                rusqlite::params![backup_id.as_bytes().as_slice()],
            )?;
        }
        if !stale.is_empty() {
            debug!(%session_id, removed = stale.len(), "old backups pruned");
        }
        Ok(stale.len())
    }
}
