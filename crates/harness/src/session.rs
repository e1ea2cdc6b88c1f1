use pairsort_core::{Choice, ItemId};
use pairsort_engine::{Comparison, Engine, EngineConfig, EngineError, Step};
use pairsort_storage::SqliteStorage;
use tempfile::TempDir;

use crate::ScoreOracle;

/// Drives an engine the way a presentation layer would: keep the last step,
/// answer comparisons, count them.
pub struct TestSession {
    pub engine: Engine,
    pub step: Step,
    pub comparisons: usize,
}

impl TestSession {
    /// Session over ids `0..count`, already advanced to the first step.
    pub fn new(count: u32) -> Result<Self, EngineError> {
        let ids: Vec<ItemId> = (0..count).map(ItemId::new).collect();
        Self::with_ids(&ids, EngineConfig::default())
    }

    pub fn with_ids(ids: &[ItemId], config: EngineConfig) -> Result<Self, EngineError> {
        let items = ids.iter().copied().map(pairsort_core::Item::bare).collect();
        Self::from_engine(Engine::with_items(items, config)?)
    }

    pub fn from_engine(mut engine: Engine) -> Result<Self, EngineError> {
        let step = engine.advance()?;
        Ok(Self {
            engine,
            step,
            comparisons: 0,
        })
    }

    pub fn pending(&self) -> Option<Comparison> {
        match self.step {
            Step::NeedsComparison(c) => Some(c),
            Step::Done => None,
        }
    }

    pub fn answer(&mut self, choice: Choice) -> Result<Step, EngineError> {
        self.step = self.engine.record_decision(choice)?;
        self.comparisons += 1;
        Ok(self.step)
    }

    pub fn remove(&mut self, item_id: u32) -> Result<Step, EngineError> {
        self.step = self.engine.remove(ItemId::new(item_id))?;
        Ok(self.step)
    }

    /// Restore, then pick up whatever comparison that makes necessary.
    pub fn restore(&mut self, item_id: u32) -> Result<Step, EngineError> {
        self.engine.restore(ItemId::new(item_id))?;
        self.step = self.engine.advance()?;
        Ok(self.step)
    }

    /// Answer up to `limit` comparisons with `decide`. Returns how many were
    /// answered.
    pub fn answer_n(
        &mut self,
        limit: usize,
        mut decide: impl FnMut(Comparison) -> Choice,
    ) -> Result<usize, EngineError> {
        let mut answered = 0;
        while answered < limit {
            let Some(comparison) = self.pending() else {
                break;
            };
            self.answer(decide(comparison))?;
            answered += 1;
        }
        Ok(answered)
    }

    pub fn run_with(&mut self, decide: impl FnMut(Comparison) -> Choice) -> Result<usize, EngineError> {
        self.answer_n(usize::MAX, decide)
    }

    pub fn run_with_oracle(&mut self, oracle: &ScoreOracle) -> Result<usize, EngineError> {
        self.run_with(|c| oracle.judge(c))
    }

    /// Ranked groups as member lists, most important first.
    pub fn ranked_members(&self) -> Vec<Vec<ItemId>> {
        let groups = self.engine.groups();
        self.engine
            .ranked_groups()
            .iter()
            .map(|g| groups.members(*g).map(<[ItemId]>::to_vec).unwrap_or_default())
            .collect()
    }

    /// Same as `ranked_members`, with each group sorted for order-insensitive
    /// comparison.
    pub fn ranked_sets(&self) -> Vec<Vec<ItemId>> {
        let mut groups = self.ranked_members();
        for group in &mut groups {
            group.sort();
        }
        groups
    }
}

/// On-disk store in a fresh temporary directory. Keep the `TempDir` alive
/// for as long as the store is used.
pub fn temp_storage() -> Result<(TempDir, SqliteStorage, String), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("sessions.db").to_string_lossy().into_owned();
    let storage = SqliteStorage::open(&path)?;
    Ok((dir, storage, path))
}
