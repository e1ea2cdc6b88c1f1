use serde::{Deserialize, Serialize};

use crate::materialize::RankStyle;

pub const DEFAULT_ESTIMATE_MIN_DECISIONS: usize = 3;
pub const DEFAULT_ESTIMATE_MIN_GROUPS: usize = 3;

/// Engine tuning. Every field has a default, so a partial config file
/// deserializes cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum undo depth. `None` keeps every entry.
    pub history_limit: Option<usize>,
    /// Style used by `Engine::materialize`.
    pub rank_style: RankStyle,
    pub estimate_min_decisions: usize,
    pub estimate_min_groups: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_limit: None,
            rank_style: RankStyle::default(),
            estimate_min_decisions: DEFAULT_ESTIMATE_MIN_DECISIONS,
            estimate_min_groups: DEFAULT_ESTIMATE_MIN_GROUPS,
        }
    }
}
