use pairsort_core::{CoreError, GroupId, ItemId, PersistedSession, ids::SessionId};
use pairsort_engine::{Engine, EngineConfig, EngineError, RecoverySource, recover_session};
use pairsort_harness::{ScoreOracle, TestSession, temp_storage};
use pairsort_storage::{SessionStore, SqliteStorage, StorageConfig, StorageError};
use rand::{SeedableRng, rngs::StdRng};

/// Half-finished session with a removal and an annotation.
fn partial_session(seed: u64) -> Result<(TestSession, ScoreOracle), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let oracle = ScoreOracle::random(12, 4, &mut rng);
    let mut session = TestSession::new(12)?;
    session.answer_n(8, |c| oracle.judge(c))?;
    session.remove(11)?;
    session.engine.annotate(ItemId::new(3), "check pricing")?;
    Ok((session, oracle))
}

fn corrupt_live_payload(storage: &SqliteStorage) -> Result<(), Box<dyn std::error::Error>> {
    storage
        .conn()
        .execute_batch("UPDATE sessions SET payload = zeroblob(32)")?;
    Ok(())
}

/// A session that decodes cleanly but references a group that does not exist.
fn dangling_session(engine: &Engine) -> PersistedSession {
    let mut session = engine.to_session();
    session.state.ranked_order.push(GroupId::from_raw(9_999));
    session
}

// ============================================================================
// Save / Load Tests (4 tests)
// ============================================================================

#[test]
fn save_and_load_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let (mut session, oracle) = partial_session(1)?;
    let mut storage = SqliteStorage::open_in_memory()?;
    let id = SessionId::new();

    session.engine.save(&mut storage, id)?;
    let loaded = Engine::load(&storage, id, EngineConfig::default())?.ok_or("session missing")?;

    assert_eq!(loaded.to_session(), session.engine.to_session());
    assert_eq!(loaded.current_comparison()?, session.engine.current_comparison()?);
    assert_eq!(loaded.undo_depth(), session.engine.undo_depth());
    assert_eq!(loaded.annotation(ItemId::new(3)), Some("check pricing"));

    // Both copies finish the same way
    let mut resumed = TestSession::from_engine(loaded)?;
    resumed.run_with_oracle(&oracle)?;
    session.run_with_oracle(&oracle)?;
    assert_eq!(resumed.engine.materialize(true)?, session.engine.materialize(true)?);
    Ok(())
}

#[test]
fn undo_works_after_reload() -> Result<(), Box<dyn std::error::Error>> {
    let (session, _) = partial_session(2)?;
    let mut storage = SqliteStorage::open_in_memory()?;
    let id = SessionId::new();
    session.engine.save(&mut storage, id)?;

    let mut original = session.engine.clone();
    let mut loaded = Engine::load(&storage, id, EngineConfig::default())?.ok_or("session missing")?;
    while original.can_undo() {
        assert_eq!(loaded.undo()?, original.undo()?);
        assert_eq!(loaded.snapshot_state(), original.snapshot_state());
    }
    assert!(!loaded.can_undo());
    Ok(())
}

#[test]
fn session_bookkeeping() -> Result<(), Box<dyn std::error::Error>> {
    let (session, _) = partial_session(3)?;
    let mut storage = SqliteStorage::open_in_memory()?;
    let id = SessionId::new();
    let other = SessionId::new();

    assert!(!storage.has_session(id)?);
    assert!(Engine::load(&storage, id, EngineConfig::default())?.is_none());
    assert!(storage.session_info(id)?.is_none());

    session.engine.save(&mut storage, id)?;
    session.engine.save(&mut storage, other)?;
    assert!(storage.has_session(id)?);
    let info = storage.session_info(id)?.ok_or("info missing")?;
    assert_eq!(info.session_id, id);
    assert_eq!(info.size_bytes, session.engine.to_session().to_msgpack()?.len());
    assert_eq!(storage.list_sessions()?.len(), 2);

    assert!(storage.delete_session(id)?);
    assert!(!storage.delete_session(id)?);
    assert!(!storage.has_session(id)?);
    assert_eq!(storage.list_sessions()?.len(), 1);
    Ok(())
}

#[test]
fn reopen_on_disk_database() -> Result<(), Box<dyn std::error::Error>> {
    let (mut session, oracle) = partial_session(4)?;
    let (_dir, mut storage, path) = temp_storage()?;
    let id = SessionId::new();
    session.engine.save(&mut storage, id)?;
    drop(storage);

    let storage = SqliteStorage::open(&path)?;
    let loaded = Engine::load(&storage, id, EngineConfig::default())?.ok_or("session missing")?;
    let mut resumed = TestSession::from_engine(loaded)?;
    resumed.run_with_oracle(&oracle)?;
    session.run_with_oracle(&oracle)?;
    assert_eq!(resumed.ranked_sets(), session.ranked_sets());
    Ok(())
}

// ============================================================================
// Corruption Tests (4 tests)
// ============================================================================

#[test]
fn checksum_mismatch_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let (session, _) = partial_session(5)?;
    let mut storage = SqliteStorage::open_in_memory()?;
    let id = SessionId::new();
    session.engine.save(&mut storage, id)?;
    corrupt_live_payload(&storage)?;

    assert!(matches!(
        storage.load_session(id),
        Err(StorageError::ChecksumMismatch(_))
    ));
    assert!(matches!(
        Engine::load(&storage, id, EngineConfig::default()),
        Err(EngineError::Storage(StorageError::ChecksumMismatch(_)))
    ));
    Ok(())
}

#[test]
fn dangling_group_is_rejected_on_load() -> Result<(), Box<dyn std::error::Error>> {
    let (session, _) = partial_session(6)?;
    let mut storage = SqliteStorage::open_in_memory()?;
    let id = SessionId::new();
    storage.save_session(id, &dangling_session(&session.engine))?;

    match Engine::load(&storage, id, EngineConfig::default()) {
        Err(EngineError::CorruptState { group_id, .. }) => assert_eq!(group_id, "g9999"),
        other => panic!("expected CorruptState, got {other:?}"),
    }
    Ok(())
}

#[test]
fn inconsistent_registry_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let (session, _) = partial_session(7)?;
    let mut persisted = session.engine.to_session();
    // Claim the removed item still belongs to a group
    let (group_id, _) = persisted.groups.groups[0].clone();
    persisted.groups.item_to_group.push((ItemId::new(11), group_id));

    assert!(matches!(
        Engine::from_session(persisted, EngineConfig::default()),
        Err(EngineError::Core(CoreError::InvalidData(_)))
    ));
    Ok(())
}

#[test]
fn corrupt_history_entry_is_rejected_on_load() -> Result<(), Box<dyn std::error::Error>> {
    let (mut session, oracle) = partial_session(13)?;
    let mut storage = SqliteStorage::open_in_memory()?;
    let id = SessionId::new();

    session.engine.save(&mut storage, id)?;
    let good = session.engine.to_session();
    let good_backup = storage.create_backup(id)?.ok_or("backup not created")?;

    // Live state is fine; an old undo entry lists items that never existed
    session.answer_n(1, |c| oracle.judge(c))?;
    let mut persisted = session.engine.to_session();
    persisted.history[0].snapshot.removed = (100..110).map(ItemId::new).collect();
    storage.save_session(id, &persisted)?;

    assert!(matches!(
        Engine::load(&storage, id, EngineConfig::default()),
        Err(EngineError::Core(CoreError::InvalidData(_)))
    ));

    let (mut engine, source) =
        recover_session(&mut storage, id, EngineConfig::default())?.ok_or("nothing recovered")?;
    assert_eq!(source, RecoverySource::Backup(good_backup));
    assert_eq!(engine.to_session(), good);
    while engine.can_undo() {
        engine.undo()?;
        assert!(engine.estimate_progress().percent <= 100.0);
    }
    Ok(())
}

// ============================================================================
// Backup and Recovery Tests (5 tests)
// ============================================================================

#[test]
fn backups_are_listed_newest_first_and_pruned() -> Result<(), Box<dyn std::error::Error>> {
    let (mut session, oracle) = partial_session(8)?;
    let mut storage = SqliteStorage::open_in_memory()?.with_config(StorageConfig { backup_keep: 2 });
    let id = SessionId::new();

    assert!(storage.create_backup(id)?.is_none());

    let mut created = Vec::new();
    for _ in 0..4 {
        session.engine.save(&mut storage, id)?;
        created.push(storage.create_backup(id)?.ok_or("backup not created")?);
        session.answer_n(1, |c| oracle.judge(c))?;
    }

    let listed: Vec<_> = storage.list_backups(id)?.into_iter().map(|b| b.backup_id).collect();
    assert_eq!(listed, vec![created[3], created[2]]);

    assert_eq!(storage.prune_backups(id, 1)?, 1);
    assert_eq!(storage.list_backups(id)?.len(), 1);
    Ok(())
}

#[test]
fn restore_backup_overwrites_live_session() -> Result<(), Box<dyn std::error::Error>> {
    let (mut session, oracle) = partial_session(9)?;
    let mut storage = SqliteStorage::open_in_memory()?;
    let id = SessionId::new();

    session.engine.save(&mut storage, id)?;
    let checkpoint = session.engine.to_session();
    let backup_id = storage.create_backup(id)?.ok_or("backup not created")?;

    session.run_with_oracle(&oracle)?;
    session.engine.save(&mut storage, id)?;

    assert_eq!(storage.restore_backup(backup_id)?, id);
    assert_eq!(storage.load_session(id)?, Some(checkpoint));

    // Clearing the live session leaves backups in place
    storage.delete_session(id)?;
    assert_eq!(storage.list_backups(id)?.len(), 1);
    Ok(())
}

#[test]
fn recover_uses_live_session_when_valid() -> Result<(), Box<dyn std::error::Error>> {
    let (session, _) = partial_session(10)?;
    let mut storage = SqliteStorage::open_in_memory()?;
    let id = SessionId::new();

    assert!(recover_session(&mut storage, id, EngineConfig::default())?.is_none());

    session.engine.save(&mut storage, id)?;
    let (engine, source) =
        recover_session(&mut storage, id, EngineConfig::default())?.ok_or("nothing recovered")?;
    assert_eq!(source, RecoverySource::Live);
    assert_eq!(engine.to_session(), session.engine.to_session());
    Ok(())
}

#[test]
fn recover_falls_back_to_newest_valid_backup() -> Result<(), Box<dyn std::error::Error>> {
    let (mut session, oracle) = partial_session(11)?;
    let mut storage = SqliteStorage::open_in_memory()?;
    let id = SessionId::new();

    session.engine.save(&mut storage, id)?;
    let good = session.engine.to_session();
    let good_backup = storage.create_backup(id)?.ok_or("backup not created")?;

    // A newer backup that decodes but fails validation
    session.answer_n(1, |c| oracle.judge(c))?;
    storage.save_session(id, &dangling_session(&session.engine))?;
    storage.create_backup(id)?;

    // And a live copy with a broken checksum
    session.engine.save(&mut storage, id)?;
    corrupt_live_payload(&storage)?;

    let (engine, source) =
        recover_session(&mut storage, id, EngineConfig::default())?.ok_or("nothing recovered")?;
    assert_eq!(source, RecoverySource::Backup(good_backup));
    assert_eq!(engine.to_session(), good);

    // The recovered copy is live again
    assert_eq!(storage.load_session(id)?, Some(good));
    Ok(())
}

#[test]
fn recover_fails_when_no_backup_is_usable() -> Result<(), Box<dyn std::error::Error>> {
    let (session, _) = partial_session(12)?;
    let mut storage = SqliteStorage::open_in_memory()?;
    let id = SessionId::new();

    storage.save_session(id, &dangling_session(&session.engine))?;
    storage.create_backup(id)?;

    assert!(matches!(
        recover_session(&mut storage, id, EngineConfig::default()),
        Err(EngineError::CorruptState { .. })
    ));
    Ok(())
}
